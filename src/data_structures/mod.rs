//! Engine data structures: geometry, programs, drawables, entities, textures.
//!
//! - `geometry` holds indexed vertex data uploaded once to the device
//! - `program` wraps linked shader programs and their bind callbacks
//! - `drawable` couples geometry, a program and per-draw arguments
//! - `entity` contains transforms, behaviours and the entity itself
//! - `texture` decodes images into device textures

pub mod drawable;
pub mod entity;
pub mod geometry;
pub mod program;
pub mod texture;
