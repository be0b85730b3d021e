use std::{cell::RefCell, rc::Rc};

use drift_ngin::{
    data_structures::{
        drawable::{ArgTable, Drawable},
        geometry::GeometryBuffer,
        program::{BindFn, ShaderProgram, binders},
    },
    device::{
        AttribLocation, BufferId, BufferKind, Color, GraphicsDevice, IndexWidth, ProgramId,
        ShaderId, ShaderStage, TextureId, Topology, UniformLocation,
        recording::RecordingDevice,
    },
    error::Result,
};

/// Unit quad in the XY plane, interleaved position + texcoord.
#[rustfmt::skip]
pub(crate) const QUAD_VERTICES: [f32; 20] = [
    -1.0, -1.0, 0.5,  0.0, 1.0,
     1.0, -1.0, 0.5,  1.0, 1.0,
     1.0,  1.0, 0.5,  1.0, 0.0,
    -1.0,  1.0, 0.5,  0.0, 0.0,
];
pub(crate) const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

pub(crate) fn quad_drawable(device: &mut dyn GraphicsDevice, binder: BindFn) -> Rc<RefCell<Drawable>> {
    let geometry =
        GeometryBuffer::new(device, &QUAD_VERTICES, &QUAD_INDICES, Topology::TriangleList).unwrap();
    let mut program = ShaderProgram::from_sources(device, "vertex", "fragment", binder).unwrap();
    binders::register_conventional(&mut program, device);
    Rc::new(RefCell::new(Drawable::new(Rc::new(geometry), Rc::new(program))))
}

pub(crate) fn failing_binder(_: &mut dyn GraphicsDevice, _: &ShaderProgram, _: &ArgTable) -> Result<()> {
    Err(drift_ngin::error::RenderError::Unsupported(
        "binder refuses to bind".to_string(),
    ))
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Trace {
    Update(usize),
    /// Translation column of the model matrix the draw used.
    Draw([f32; 3]),
}

pub(crate) type TraceLog = Rc<RefCell<Vec<Trace>>>;

/// Recording device that also appends every draw to a shared trace, so the
/// order of behaviour updates and draws can be checked together.
pub(crate) struct TracingDevice {
    pub inner: RecordingDevice,
    pub trace: TraceLog,
    model: Option<[f32; 3]>,
}

impl TracingDevice {
    pub fn new(trace: TraceLog) -> Self {
        Self {
            inner: RecordingDevice::new(),
            trace,
            model: None,
        }
    }
}

impl GraphicsDevice for TracingDevice {
    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Result<BufferId> {
        self.inner.create_buffer(kind, contents)
    }
    fn bind_buffer(&mut self, kind: BufferKind, buffer: BufferId) {
        self.inner.bind_buffer(kind, buffer)
    }
    fn delete_buffer(&mut self, buffer: BufferId) {
        self.inner.delete_buffer(buffer)
    }
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId> {
        self.inner.compile_shader(stage, source)
    }
    fn delete_shader(&mut self, shader: ShaderId) {
        self.inner.delete_shader(shader)
    }
    fn create_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> ProgramId {
        self.inner.create_program(vertex, fragment)
    }
    fn link_status(&self, program: ProgramId) -> bool {
        self.inner.link_status(program)
    }
    fn program_info_log(&self, program: ProgramId) -> String {
        self.inner.program_info_log(program)
    }
    fn use_program(&mut self, program: ProgramId) {
        self.inner.use_program(program)
    }
    fn delete_program(&mut self, program: ProgramId) {
        self.inner.delete_program(program)
    }
    fn attrib_location(&mut self, program: ProgramId, name: &str) -> Option<AttribLocation> {
        self.inner.attrib_location(program, name)
    }
    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.inner.uniform_location(program, name)
    }
    fn set_uniform_mat4(&mut self, location: Option<UniformLocation>, value: &[[f32; 4]; 4]) {
        if location.and_then(|l| self.inner.uniform_name(l)) == Some("u_modelMat") {
            self.model = Some([value[3][0], value[3][1], value[3][2]]);
        }
        self.inner.set_uniform_mat4(location, value)
    }
    fn set_uniform_vec4(&mut self, location: Option<UniformLocation>, value: [f32; 4]) {
        self.inner.set_uniform_vec4(location, value)
    }
    fn set_uniform_vec3(&mut self, location: Option<UniformLocation>, value: [f32; 3]) {
        self.inner.set_uniform_vec3(location, value)
    }
    fn set_uniform_f32(&mut self, location: Option<UniformLocation>, value: f32) {
        self.inner.set_uniform_f32(location, value)
    }
    fn set_uniform_i32(&mut self, location: Option<UniformLocation>, value: i32) {
        self.inner.set_uniform_i32(location, value)
    }
    fn enable_vertex_attrib(&mut self, location: AttribLocation) {
        self.inner.enable_vertex_attrib(location)
    }
    fn vertex_attrib_pointer(&mut self, location: AttribLocation, components: u32, stride: u32, offset: u32) {
        self.inner.vertex_attrib_pointer(location, components, stride, offset)
    }
    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId> {
        self.inner.create_texture(width, height, rgba)
    }
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        self.inner.bind_texture(unit, texture)
    }
    fn delete_texture(&mut self, texture: TextureId) {
        self.inner.delete_texture(texture)
    }
    fn draw_elements(&mut self, topology: Topology, count: u32, width: IndexWidth) -> Result<()> {
        self.trace
            .borrow_mut()
            .push(Trace::Draw(self.model.take().unwrap_or([f32::NAN; 3])));
        self.inner.draw_elements(topology, count, width)
    }
    fn set_viewport(&mut self, width: u32, height: u32) {
        self.inner.set_viewport(width, height)
    }
    fn set_clear_color(&mut self, colour: Color) {
        self.inner.set_clear_color(colour)
    }
    fn set_depth_test(&mut self, enabled: bool) {
        self.inner.set_depth_test(enabled)
    }
    fn begin_frame(&mut self) -> Result<()> {
        self.inner.begin_frame()
    }
    fn end_frame(&mut self) -> Result<()> {
        self.inner.end_frame()
    }
    fn min_index_width(&self) -> IndexWidth {
        self.inner.min_index_width()
    }
}

/// Fresh directory under the system temp dir, unique per test name.
pub(crate) fn temp_assets(test_name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "drift-ngin-{}-{}",
        test_name,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
