//! Linked shader programs and their per-draw bind callbacks.
//!
//! A [`ShaderProgram`] owns a linked device program, the locations of the four
//! standard uniforms every drawable writes and an open table of extra
//! attribute/uniform locations keyed by a symbolic name. What a program needs
//! per draw beyond the standard uniforms is done by its [`BindFn`]; the
//! [`binders`] module has the common ones.

use std::collections::HashMap;

use crate::{
    data_structures::drawable::ArgTable,
    device::{AttribLocation, GraphicsDevice, ProgramId, ShaderStage, UniformLocation},
    error::{RenderError, Result},
};

/// Wires attributes, textures and extra uniforms right before a draw.
pub type BindFn = fn(&mut dyn GraphicsDevice, &ShaderProgram, &ArgTable) -> Result<()>;

pub const MODEL_UNIFORM: &str = "u_modelMat";
pub const VIEW_UNIFORM: &str = "u_viewMat";
pub const PROJECTION_UNIFORM: &str = "u_projMat";
pub const COLOUR_UNIFORM: &str = "u_col";

/// Locations of the uniforms written on every draw.
///
/// A slot the program does not use stays `None`; writes to it are dropped by
/// the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StandardUniforms {
    pub model: Option<UniformLocation>,
    pub view: Option<UniformLocation>,
    pub projection: Option<UniformLocation>,
    pub colour: Option<UniformLocation>,
}

pub struct ShaderProgram {
    id: ProgramId,
    standard: StandardUniforms,
    attributes: HashMap<String, AttribLocation>,
    uniforms: HashMap<String, UniformLocation>,
    binder: BindFn,
}

impl std::fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("id", &self.id)
            .field("standard", &self.standard)
            .field("attributes", &self.attributes)
            .field("uniforms", &self.uniforms)
            .finish_non_exhaustive()
    }
}

impl ShaderProgram {
    /// Links two compiled stages.
    ///
    /// On failure the link log is reported, the program object is deleted
    /// again and [`RenderError::Link`] is returned.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        vertex: crate::device::ShaderId,
        fragment: crate::device::ShaderId,
        binder: BindFn,
    ) -> Result<Self> {
        let id = device.create_program(vertex, fragment);
        if !device.link_status(id) {
            let log = device.program_info_log(id);
            log::error!("shader program failed to link:\n{log}");
            device.delete_program(id);
            return Err(RenderError::Link { log });
        }

        let standard = StandardUniforms {
            model: device.uniform_location(id, MODEL_UNIFORM),
            view: device.uniform_location(id, VIEW_UNIFORM),
            projection: device.uniform_location(id, PROJECTION_UNIFORM),
            colour: device.uniform_location(id, COLOUR_UNIFORM),
        };
        log::debug!("linked {id:?} with {standard:?}");

        Ok(Self {
            id,
            standard,
            attributes: HashMap::new(),
            uniforms: HashMap::new(),
            binder,
        })
    }

    /// Compiles both stages from source and links them.
    ///
    /// The stage objects are deleted once the program exists, whether or not
    /// it linked.
    pub fn from_sources(
        device: &mut dyn GraphicsDevice,
        vertex_source: &str,
        fragment_source: &str,
        binder: BindFn,
    ) -> Result<Self> {
        let vertex = device
            .compile_shader(ShaderStage::Vertex, vertex_source)
            .inspect_err(|e| log::error!("{e}"))?;
        let fragment = match device.compile_shader(ShaderStage::Fragment, fragment_source) {
            Ok(fragment) => fragment,
            Err(e) => {
                log::error!("{e}");
                device.delete_shader(vertex);
                return Err(e);
            }
        };
        let program = Self::new(device, vertex, fragment, binder);
        device.delete_shader(vertex);
        device.delete_shader(fragment);
        program
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn standard(&self) -> &StandardUniforms {
        &self.standard
    }

    /// Looks up the attribute `raw` and stores it under `symbolic`.
    ///
    /// Returns whether the attribute exists. Registering the same symbolic
    /// name twice overwrites the first entry.
    pub fn register_attribute(
        &mut self,
        device: &mut dyn GraphicsDevice,
        raw: &str,
        symbolic: &str,
    ) -> bool {
        match device.attrib_location(self.id, raw) {
            Some(location) => {
                self.attributes.insert(symbolic.to_string(), location);
                true
            }
            None => {
                log::warn!("attribute `{raw}` not found in {:?}", self.id);
                false
            }
        }
    }

    /// Uniform counterpart of [`register_attribute`](Self::register_attribute).
    pub fn register_uniform(
        &mut self,
        device: &mut dyn GraphicsDevice,
        raw: &str,
        symbolic: &str,
    ) -> bool {
        match device.uniform_location(self.id, raw) {
            Some(location) => {
                self.uniforms.insert(symbolic.to_string(), location);
                true
            }
            None => {
                log::warn!("uniform `{raw}` not found in {:?}", self.id);
                false
            }
        }
    }

    pub fn attribute(&self, name: &str) -> Option<AttribLocation> {
        self.attributes.get(name).copied()
    }

    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }

    /// Makes this the current program and runs the bind callback.
    pub fn bind(&self, device: &mut dyn GraphicsDevice, args: &ArgTable) -> Result<()> {
        device.use_program(self.id);
        (self.binder)(device, self, args)
    }

    pub fn release(self, device: &mut dyn GraphicsDevice) {
        device.delete_program(self.id);
    }
}

/// Ready-made bind callbacks for interleaved position + texcoord geometry.
///
/// They expect the symbolic names registered by [`register_conventional`]:
/// `"position"`, `"texcoord"` and `"texture"`. Missing registrations or
/// arguments are logged and skipped so the draw still happens.
pub mod binders {
    use super::*;
    use crate::data_structures::{
        drawable::Arg,
        geometry::{TEXCOORD_OFFSET, VERTEX_STRIDE},
    };

    const STRIDE_BYTES: u32 = (VERTEX_STRIDE * std::mem::size_of::<f32>()) as u32;

    /// Registers `a_position`, `a_texcoord` and `u_texture` under their
    /// conventional symbolic names. Returns how many were found.
    pub fn register_conventional(program: &mut ShaderProgram, device: &mut dyn GraphicsDevice) -> usize {
        [
            program.register_attribute(device, "a_position", "position"),
            program.register_attribute(device, "a_texcoord", "texcoord"),
            program.register_uniform(device, "u_texture", "texture"),
        ]
        .into_iter()
        .filter(|found| *found)
        .count()
    }

    /// Binds nothing beyond the standard uniforms.
    pub fn noop(_: &mut dyn GraphicsDevice, _: &ShaderProgram, _: &ArgTable) -> Result<()> {
        Ok(())
    }

    fn attribute(
        device: &mut dyn GraphicsDevice,
        location: Option<AttribLocation>,
        name: &str,
        components: u32,
        offset: u32,
    ) {
        match location {
            Some(location) => {
                device.enable_vertex_attrib(location);
                device.vertex_attrib_pointer(location, components, STRIDE_BYTES, offset);
            }
            None => log::warn!("no `{name}` attribute registered, skipping"),
        }
    }

    /// Wires the position attribute only.
    pub fn position_only(
        device: &mut dyn GraphicsDevice,
        program: &ShaderProgram,
        _: &ArgTable,
    ) -> Result<()> {
        attribute(device, program.attribute("position"), "position", 3, 0);
        Ok(())
    }

    /// Wires position and texture coordinates and binds the `"texture"`
    /// argument to unit 0.
    pub fn textured(
        device: &mut dyn GraphicsDevice,
        program: &ShaderProgram,
        args: &ArgTable,
    ) -> Result<()> {
        attribute(device, program.attribute("position"), "position", 3, 0);
        attribute(
            device,
            program.attribute("texcoord"),
            "texcoord",
            2,
            TEXCOORD_OFFSET as u32,
        );
        match args.get("texture") {
            Some(Arg::Texture(texture)) => device.bind_texture(0, Some(texture.id())),
            Some(other) => {
                log::warn!("`texture` argument is not a texture: {other:?}");
                device.bind_texture(0, None);
            }
            None => {
                log::warn!("no `texture` argument set, drawing untextured");
                device.bind_texture(0, None);
            }
        }
        device.set_uniform_i32(program.uniform("texture"), 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::recording::{Call, RecordingDevice};

    const SOURCE: &str = "void main() {}";

    #[test]
    fn resolves_standard_uniforms_on_link() {
        let mut device = RecordingDevice::new();
        let program = ShaderProgram::from_sources(&mut device, SOURCE, SOURCE, binders::noop).unwrap();

        let standard = program.standard();
        let names: Vec<_> = [standard.model, standard.view, standard.projection, standard.colour]
            .into_iter()
            .map(|l| device.uniform_name(l.unwrap()).unwrap().to_string())
            .collect();
        assert_eq!(names, [MODEL_UNIFORM, VIEW_UNIFORM, PROJECTION_UNIFORM, COLOUR_UNIFORM]);
    }

    #[test]
    fn link_failure_deletes_program() {
        let mut device = RecordingDevice::new().with_failing_links();
        let err = ShaderProgram::from_sources(&mut device, SOURCE, SOURCE, binders::noop).unwrap_err();

        assert!(matches!(err, RenderError::Link { log } if log.contains("link rejected")));
        assert_eq!(device.live_programs(), 0);
        assert!(device.calls().iter().any(|c| matches!(c, Call::DeleteProgram(_))));
    }

    #[test]
    fn compile_failure_is_reported() {
        let mut device = RecordingDevice::new();
        let err = ShaderProgram::from_sources(&mut device, SOURCE, "  ", binders::noop).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Compile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
        assert!(device.calls().iter().any(|c| matches!(c, Call::DeleteShader(_))));
    }

    #[test]
    fn registration_overwrites_and_skips_missing() {
        let mut device = RecordingDevice::new();
        let mut program =
            ShaderProgram::from_sources(&mut device, SOURCE, SOURCE, binders::noop).unwrap();

        assert!(program.register_uniform(&mut device, "u_time", "time"));
        let first = program.uniform("time");
        assert!(program.register_uniform(&mut device, "u_speed", "time"));
        assert_ne!(program.uniform("time"), first);
        assert_eq!(program.uniform("missing"), None);
        assert_eq!(binders::register_conventional(&mut program, &mut device), 3);
        assert!(program.attribute("position").is_some());
    }

    #[test]
    fn bind_uses_program_then_runs_binder() {
        let mut device = RecordingDevice::new();
        let mut program =
            ShaderProgram::from_sources(&mut device, SOURCE, SOURCE, binders::position_only).unwrap();
        binders::register_conventional(&mut program, &mut device);
        device.clear_calls();

        program.bind(&mut device, &ArgTable::new()).unwrap();
        let position = program.attribute("position").unwrap();
        assert_eq!(
            device.calls(),
            &[
                Call::UseProgram(program.id()),
                Call::EnableVertexAttrib(position),
                Call::VertexAttribPointer {
                    location: position,
                    components: 3,
                    stride: 20,
                    offset: 0
                },
            ]
        );
    }

    #[test]
    fn textured_binder_without_texture_unbinds_unit() {
        let mut device = RecordingDevice::new();
        let mut program =
            ShaderProgram::from_sources(&mut device, SOURCE, SOURCE, binders::textured).unwrap();
        binders::register_conventional(&mut program, &mut device);
        device.clear_calls();

        program.bind(&mut device, &ArgTable::new()).unwrap();
        assert!(device.calls().contains(&Call::BindTexture {
            unit: 0,
            texture: None
        }));
        assert_eq!(device.uniforms_set(), ["u_texture"]);
    }
}
