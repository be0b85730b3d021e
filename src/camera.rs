//! Fly camera, its controller and the perspective projection.
//!
//! Angles are in degrees. Yaw 0 and pitch 0 look down −Z; positive yaw turns
//! right and positive pitch looks down, matching the direction of mouse
//! motion. Movement is restricted to the horizontal plane.

use cgmath::{
    Deg, InnerSpace, Matrix4, Point3, Quaternion, Rad, Rotation3, Vector3, Zero, perspective,
};
use instant::Duration;
use winit::{
    event::{ElementState, KeyEvent, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Pitch never reaches ±90° so the look vector never lines up with world up.
pub const PITCH_LIMIT: f32 = 89.9;

/// Wraps an angle in degrees into `[0, 360)`.
///
/// `rem_euclid` alone rounds tiny negative angles up to exactly 360.
pub fn wrap_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

const LOCAL_FORWARD: Vector3<f32> = Vector3::new(0.0, 0.0, -1.0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    yaw: f32,
    pitch: f32,
}

impl Camera {
    pub fn new<V: Into<Point3<f32>>, Y: Into<Deg<f32>>, P: Into<Deg<f32>>>(
        position: V,
        yaw: Y,
        pitch: P,
    ) -> Self {
        let mut camera = Self {
            position: position.into(),
            yaw: 0.0,
            pitch: 0.0,
        };
        camera.turn(yaw.into().0, pitch.into().0);
        camera
    }

    pub fn yaw(&self) -> Deg<f32> {
        Deg(self.yaw)
    }

    pub fn pitch(&self) -> Deg<f32> {
        Deg(self.pitch)
    }

    /// Adds to yaw and pitch, wrapping yaw into `[0, 360)` and clamping pitch.
    pub fn turn(&mut self, yaw: f32, pitch: f32) {
        self.yaw = wrap_degrees(self.yaw + yaw);
        self.pitch = (self.pitch + pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    fn yaw_rotation(&self) -> Quaternion<f32> {
        Quaternion::from_angle_y(Deg(-self.yaw))
    }

    /// Unit vector the camera looks along.
    pub fn look(&self) -> Vector3<f32> {
        self.yaw_rotation() * Quaternion::from_angle_x(Deg(-self.pitch)) * LOCAL_FORWARD
    }

    /// Horizontal unit vector for forward movement.
    pub fn forward(&self) -> Vector3<f32> {
        self.yaw_rotation() * LOCAL_FORWARD
    }

    /// Horizontal unit vector pointing to the camera's right.
    pub fn right(&self) -> Vector3<f32> {
        Quaternion::from_angle_y(Deg(-90.0)) * self.forward()
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.position + self.look(), Vector3::unit_y())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// Input gathered between two frames.
///
/// Movement flags stay set while their key is held. Look deltas accumulate
/// and are consumed once per frame by [`CameraController::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    dx: f32,
    dy: f32,
}

impl InputState {
    pub fn add_look_delta(&mut self, dx: f64, dy: f64) {
        self.dx += dx as f32;
        self.dy += dy as f32;
    }

    pub fn look_delta(&self) -> (f32, f32) {
        (self.dx, self.dy)
    }

    pub fn take_look_delta(&mut self) -> (f32, f32) {
        let delta = (self.dx, self.dy);
        self.dx = 0.0;
        self.dy = 0.0;
        delta
    }

    /// Updates the movement flags for W/A/S/D and the arrow keys. Returns
    /// whether the key was one of them.
    pub fn process_key(&mut self, key: KeyCode, state: ElementState) -> bool {
        let pressed = state.is_pressed();
        match key {
            KeyCode::KeyW | KeyCode::ArrowUp => self.forward = pressed,
            KeyCode::KeyS | KeyCode::ArrowDown => self.back = pressed,
            KeyCode::KeyA | KeyCode::ArrowLeft => self.left = pressed,
            KeyCode::KeyD | KeyCode::ArrowRight => self.right = pressed,
            _ => return false,
        }
        true
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        ..
                    },
                ..
            } => self.process_key(*key, *state),
            // key releases are not delivered while unfocused
            WindowEvent::Focused(false) => {
                *self = Self::default();
                false
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraController {
    pub speed: f32,
    pub sensitivity: f32,
}

impl CameraController {
    pub fn new(speed: f32, sensitivity: f32) -> Self {
        Self { speed, sensitivity }
    }

    /// Movement direction for the given flags. Forward wins over back and
    /// right over left. The result is a unit vector or zero.
    pub fn direction(camera: &Camera, input: &InputState) -> Vector3<f32> {
        let forward = camera.forward();
        let right = camera.right();
        let mut direction = Vector3::zero();
        if input.forward {
            direction += forward;
        } else if input.back {
            direction -= forward;
        }
        if input.right {
            direction += right;
        } else if input.left {
            direction -= right;
        }
        if direction.magnitude2() > 0.0 {
            direction.normalize()
        } else {
            direction
        }
    }

    /// Applies the accumulated look delta and moves the camera for one frame.
    pub fn update(&self, camera: &mut Camera, input: &mut InputState, dt: Duration) {
        let (dx, dy) = input.take_look_delta();
        camera.turn(dx * self.sensitivity, dy * self.sensitivity);

        let step = Self::direction(camera, input) * self.speed * dt.as_secs_f32();
        camera.position.x += step.x;
        camera.position.z += step.z;
    }
}
