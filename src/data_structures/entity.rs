//! Scene entities: a transform, a behaviour that animates it and an optional
//! shared drawable.

use std::{cell::RefCell, fmt::Debug, rc::Rc};

use cgmath::{Deg, Matrix4, Quaternion, Rotation3, Vector3};
use instant::Duration;

use crate::{
    camera::wrap_degrees, data_structures::drawable::Drawable, device::GraphicsDevice,
    error::Result,
};

/// Position, orientation and size of an entity.
///
/// Rotation is kept as Euler angles in degrees and turned into a quaternion
/// on demand, X first, then Y, then Z in the rotated frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vector3<f32>,
    pub rotation: Vector3<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vector3::new(1.0, 1.0, 1.0),
            rotation: Vector3::new(0.0, 0.0, 0.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    pub fn at(translation: Vector3<f32>) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    pub fn with_rotation(mut self, degrees: Vector3<f32>) -> Self {
        self.rotation = degrees;
        self
    }

    pub fn with_scale(mut self, scale: Vector3<f32>) -> Self {
        self.scale = scale;
        self
    }

    pub fn quaternion(&self) -> Quaternion<f32> {
        Quaternion::from_angle_x(Deg(self.rotation.x))
            * Quaternion::from_angle_y(Deg(self.rotation.y))
            * Quaternion::from_angle_z(Deg(self.rotation.z))
    }

    /// Scale, then rotate, then translate.
    pub fn model_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.translation)
            * Matrix4::from(self.quaternion())
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

/// Per-frame logic of an entity.
///
/// Any `FnMut(&mut Transform, Duration)` closure is a behaviour as well.
pub trait Behavior {
    fn update(&mut self, transform: &mut Transform, dt: Duration);
}

impl<F: FnMut(&mut Transform, Duration)> Behavior for F {
    fn update(&mut self, transform: &mut Transform, dt: Duration) {
        self(transform, dt)
    }
}

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Static;

impl Behavior for Static {
    fn update(&mut self, _: &mut Transform, _: Duration) {}
}

/// Rotates continuously around each axis.
#[derive(Debug, Clone, Copy)]
pub struct Spin {
    pub degrees_per_second: Vector3<f32>,
}

impl Behavior for Spin {
    fn update(&mut self, transform: &mut Transform, dt: Duration) {
        let rotation = transform.rotation + self.degrees_per_second * dt.as_secs_f32();
        transform.rotation = rotation.map(wrap_degrees);
    }
}

/// Circles a centre point in the horizontal plane.
#[derive(Debug, Clone, Copy)]
pub struct Orbit {
    pub centre: Vector3<f32>,
    pub radius: f32,
    pub degrees_per_second: f32,
    pub height: f32,
    angle: f32,
}

impl Orbit {
    pub fn new(centre: Vector3<f32>, radius: f32, degrees_per_second: f32, height: f32) -> Self {
        Self {
            centre,
            radius,
            degrees_per_second,
            height,
            angle: 0.0,
        }
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }
}

impl Behavior for Orbit {
    fn update(&mut self, transform: &mut Transform, dt: Duration) {
        self.angle = wrap_degrees(self.angle + self.degrees_per_second * dt.as_secs_f32());
        let (sin, cos) = self.angle.to_radians().sin_cos();
        transform.translation =
            self.centre + Vector3::new(self.radius * cos, self.height, self.radius * sin);
    }
}

pub struct Entity {
    pub transform: Transform,
    drawable: Option<Rc<RefCell<Drawable>>>,
    behavior: Box<dyn Behavior>,
}

impl Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("transform", &self.transform)
            .field("drawable", &self.drawable.is_some())
            .finish_non_exhaustive()
    }
}

impl Entity {
    pub fn new(transform: Transform, behavior: impl Behavior + 'static) -> Self {
        Self {
            transform,
            drawable: None,
            behavior: Box::new(behavior),
        }
    }

    pub fn with_drawable(mut self, drawable: Rc<RefCell<Drawable>>) -> Self {
        self.drawable = Some(drawable);
        self
    }

    pub fn drawable(&self) -> Option<&Rc<RefCell<Drawable>>> {
        self.drawable.as_ref()
    }

    pub fn set_drawable(&mut self, drawable: Option<Rc<RefCell<Drawable>>>) {
        self.drawable = drawable;
    }

    pub fn update(&mut self, dt: Duration) {
        self.behavior.update(&mut self.transform, dt);
    }

    /// Draws the entity with its current transform. Entities without a
    /// drawable draw nothing.
    pub fn draw(
        &self,
        device: &mut dyn GraphicsDevice,
        view: &Matrix4<f32>,
        projection: &Matrix4<f32>,
    ) -> Result<()> {
        let Some(drawable) = &self.drawable else {
            return Ok(());
        };
        drawable
            .borrow()
            .draw(device, &self.transform.model_matrix(), view, projection)
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{InnerSpace, Vector4};

    use super::*;

    fn assert_close(a: Vector3<f32>, b: Vector3<f32>) {
        assert!((a - b).magnitude() < 1e-4, "{a:?} != {b:?}");
    }

    #[test]
    fn origin_maps_to_translation() {
        let translation = Vector3::new(3.0, -2.0, 7.5);
        for rx in [0.0, 45.0, 90.0, 180.0, 271.0] {
            for ry in [0.0, 30.0, 135.0, -60.0] {
                for rz in [0.0, 90.0, 359.0] {
                    for scale in [0.5, 1.0, 4.0] {
                        let transform = Transform::at(translation)
                            .with_rotation(Vector3::new(rx, ry, rz))
                            .with_scale(Vector3::new(scale, scale * 2.0, 1.0));
                        let origin = transform.model_matrix() * Vector4::new(0.0, 0.0, 0.0, 1.0);
                        assert_close(origin.truncate(), translation);
                    }
                }
            }
        }
    }

    #[test]
    fn quaternion_is_unit() {
        let transform = Transform::default().with_rotation(Vector3::new(12.0, 250.0, -33.0));
        assert!((transform.quaternion().magnitude() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn scale_applies_before_rotation() {
        let transform = Transform::at(Vector3::new(0.0, 0.0, 0.0))
            .with_rotation(Vector3::new(0.0, 0.0, 90.0))
            .with_scale(Vector3::new(2.0, 1.0, 1.0));
        let x = transform.model_matrix() * Vector4::new(1.0, 0.0, 0.0, 1.0);
        assert_close(x.truncate(), Vector3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn default_transform() {
        let transform = Transform::default();
        assert_eq!(transform.translation, Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(transform.scale, Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn spin_wraps_angles() {
        let mut transform = Transform::default();
        let mut spin = Spin {
            degrees_per_second: Vector3::new(90.0, 0.0, -90.0),
        };
        spin.update(&mut transform, Duration::from_secs(5));
        assert_close(transform.rotation, Vector3::new(90.0, 0.0, 270.0));
    }

    #[test]
    fn spin_and_orbit_never_reach_360() {
        let mut transform = Transform::default();
        let mut spin = Spin {
            degrees_per_second: Vector3::new(-1e-2, 0.0, 0.0),
        };
        spin.update(&mut transform, Duration::from_millis(1));
        assert!(transform.rotation.x < 360.0, "{:?}", transform.rotation);

        let mut orbit = Orbit::new(Vector3::new(0.0, 0.0, 0.0), 1.0, -1e-2, 0.0);
        orbit.update(&mut transform, Duration::from_millis(1));
        assert!(orbit.angle() < 360.0, "{}", orbit.angle());
    }

    #[test]
    fn orbit_keeps_radius() {
        let centre = Vector3::new(1.0, 0.0, -1.0);
        let mut transform = Transform::default();
        let mut orbit = Orbit::new(centre, 3.0, 90.0, 0.5);
        orbit.update(&mut transform, Duration::from_secs(1));

        assert!((orbit.angle() - 90.0).abs() < 1e-4);
        assert_close(transform.translation, centre + Vector3::new(0.0, 0.5, 3.0));
    }

    #[test]
    fn closures_are_behaviours() {
        let mut entity = Entity::new(Transform::default(), |t: &mut Transform, dt: Duration| {
            t.translation.y += dt.as_secs_f32()
        });
        entity.update(Duration::from_millis(500));
        assert_close(entity.transform.translation, Vector3::new(1.0, 1.5, 1.0));
    }

    #[test]
    fn entity_without_drawable_is_inert() {
        let mut device = crate::device::recording::RecordingDevice::new();
        let entity = Entity::new(Transform::default(), Static);
        let identity = Matrix4::from_scale(1.0);
        entity.draw(&mut device, &identity, &identity).unwrap();
        assert!(device.calls().is_empty());
    }
}
