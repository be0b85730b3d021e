//! A drawable couples shared geometry with a shared program and its own
//! per-draw arguments (colour, texture, extra scalars).

use std::{collections::HashMap, rc::Rc};

use cgmath::Matrix4;

use crate::{
    data_structures::{geometry::GeometryBuffer, program::ShaderProgram, texture::Texture},
    device::GraphicsDevice,
    error::Result,
};

/// Argument key read into the colour uniform.
pub const COLOUR_ARG: &str = "color";

/// A value stored in a drawable's argument table.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Vec4([f32; 4]),
    Vec3([f32; 3]),
    Scalar(f32),
    Texture(Rc<Texture>),
}

pub type ArgTable = HashMap<String, Arg>;

#[derive(Debug)]
pub struct Drawable {
    geometry: Rc<GeometryBuffer>,
    program: Rc<ShaderProgram>,
    args: ArgTable,
}

impl Drawable {
    pub fn new(geometry: Rc<GeometryBuffer>, program: Rc<ShaderProgram>) -> Self {
        Self {
            geometry,
            program,
            args: ArgTable::new(),
        }
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set_arg(&mut self, key: impl Into<String>, value: Arg) {
        self.args.insert(key.into(), value);
    }

    pub fn arg(&self, key: &str) -> Option<&Arg> {
        self.args.get(key)
    }

    pub fn args(&self) -> &ArgTable {
        &self.args
    }

    pub fn geometry(&self) -> &Rc<GeometryBuffer> {
        &self.geometry
    }

    pub fn program(&self) -> &Rc<ShaderProgram> {
        &self.program
    }

    fn colour(&self) -> [f32; 4] {
        match self.args.get(COLOUR_ARG) {
            Some(Arg::Vec4(c)) => *c,
            Some(Arg::Vec3([r, g, b])) => [*r, *g, *b, 1.0],
            Some(other) => {
                log::warn!("`{COLOUR_ARG}` argument is not a colour: {other:?}");
                [1.0; 4]
            }
            None => [1.0; 4],
        }
    }

    /// Issues one indexed draw of the geometry with the given matrices.
    ///
    /// All four standard uniforms are written, whether or not the program
    /// uses them. Device bindings are left in whatever state the draw needed.
    pub fn draw(
        &self,
        device: &mut dyn GraphicsDevice,
        model: &Matrix4<f32>,
        view: &Matrix4<f32>,
        projection: &Matrix4<f32>,
    ) -> Result<()> {
        self.geometry.bind(device);
        self.program.bind(device, &self.args)?;

        let standard = *self.program.standard();
        device.set_uniform_mat4(standard.model, &(*model).into());
        device.set_uniform_mat4(standard.view, &(*view).into());
        device.set_uniform_mat4(standard.projection, &(*projection).into());
        device.set_uniform_vec4(standard.colour, self.colour());

        device.draw_elements(
            self.geometry.topology(),
            self.geometry.index_count(),
            self.geometry.index_width(),
        )
    }

    /// Drops this drawable, freeing the geometry's device buffers if no other
    /// drawable still shares it.
    pub fn release(self, device: &mut dyn GraphicsDevice) {
        match Rc::try_unwrap(self.geometry) {
            Ok(geometry) => geometry.release(device),
            Err(shared) => log::debug!(
                "geometry still shared by {} drawables, keeping it",
                Rc::strong_count(&shared) - 1
            ),
        }
    }
}
