//! drift-ngin
//!
//! A minimal real-time 3D rendering core. Many entities share a handful of
//! drawables (geometry + shader program + arguments), each with its own
//! transform and behaviour, seen through a single fly camera. The GPU sits
//! behind the [`device::GraphicsDevice`] trait so that everything above it
//! can be exercised without a window.
//!
//! High-level modules
//! - `camera`: fly camera, its controller, input state and projection
//! - `config`: start-up configuration
//! - `data_structures`: geometry, programs, drawables, entities, textures
//! - `device`: the graphics device seam, its wgpu backend and a recording double
//! - `error`: the typed rendering error
//! - `flow`: window and event loop driver
//! - `resources`: resource cache and the text mesh parser
//! - `scene`: the frame clock and the per-frame update/draw loop
//!

pub mod camera;
pub mod config;
pub mod data_structures;
pub mod device;
pub mod error;
pub mod flow;
pub mod resources;
pub mod scene;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath::*;
pub use instant::Duration;
pub use winit::event::DeviceEvent;
pub use winit::event::WindowEvent;
