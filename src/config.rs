//! Start-up configuration of the engine.
//!
//! Everything has a sensible default, so `EngineConfig::default()` opens a
//! window with a green backdrop and a camera a few units back from the origin.
//! The `with_*` methods adjust single settings:
//!
//! ```
//! use drift_ngin::config::EngineConfig;
//!
//! let config = EngineConfig::default()
//!     .with_title("cubes")
//!     .with_camera_speed(6.0);
//! assert_eq!(config.title, "cubes");
//! ```

use std::path::PathBuf;

use cgmath::{Deg, Point3};
use instant::Duration;

use crate::{
    camera::{Camera, CameraController, Projection},
    device::Color,
};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub title: String,
    pub clear_colour: Color,
    pub fovy: Deg<f32>,
    pub znear: f32,
    pub zfar: f32,
    pub camera_position: Point3<f32>,
    pub camera_yaw: Deg<f32>,
    pub camera_pitch: Deg<f32>,
    /// Units per second.
    pub camera_speed: f32,
    /// Degrees per pixel of mouse motion.
    pub mouse_sensitivity: f32,
    /// Upper bound for the delta time of a single frame.
    pub max_frame_delta: Duration,
    /// Directory native resource loads are relative to.
    pub asset_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "drift-ngin".to_string(),
            clear_colour: Color::new(0.2, 0.5, 0.0, 1.0),
            fovy: Deg(45.0),
            znear: 0.1,
            zfar: 500.0,
            camera_position: Point3::new(0.0, 2.0, 10.0),
            camera_yaw: Deg(0.0),
            camera_pitch: Deg(0.0),
            camera_speed: 10.0,
            mouse_sensitivity: 0.1,
            max_frame_delta: Duration::from_millis(250),
            asset_root: PathBuf::from("assets"),
        }
    }
}

impl EngineConfig {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_clear_colour(mut self, colour: Color) -> Self {
        self.clear_colour = colour;
        self
    }

    pub fn with_fovy(mut self, fovy: Deg<f32>) -> Self {
        self.fovy = fovy;
        self
    }

    pub fn with_clip_planes(mut self, znear: f32, zfar: f32) -> Self {
        self.znear = znear;
        self.zfar = zfar;
        self
    }

    pub fn with_camera(mut self, position: Point3<f32>, yaw: Deg<f32>, pitch: Deg<f32>) -> Self {
        self.camera_position = position;
        self.camera_yaw = yaw;
        self.camera_pitch = pitch;
        self
    }

    pub fn with_camera_speed(mut self, speed: f32) -> Self {
        self.camera_speed = speed;
        self
    }

    pub fn with_mouse_sensitivity(mut self, sensitivity: f32) -> Self {
        self.mouse_sensitivity = sensitivity;
        self
    }

    pub fn with_max_frame_delta(mut self, max: Duration) -> Self {
        self.max_frame_delta = max;
        self
    }

    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }

    pub fn camera(&self) -> Camera {
        Camera::new(self.camera_position, self.camera_yaw, self.camera_pitch)
    }

    pub fn controller(&self) -> CameraController {
        CameraController::new(self.camera_speed, self.mouse_sensitivity)
    }

    pub fn projection(&self, width: u32, height: u32) -> Projection {
        Projection::new(width, height, self.fovy, self.znear, self.zfar)
    }
}
