use std::{io::Cursor, rc::Rc};

use drift_ngin::{
    Matrix4, SquareMatrix,
    data_structures::{
        drawable::{Arg, COLOUR_ARG},
        program::binders,
        texture::Texture,
    },
    device::{
        IndexWidth, Topology,
        recording::{Call, RecordingDevice},
    },
    error::RenderError,
};

mod common;

use common::test_utils::{QUAD_INDICES, QUAD_VERTICES, quad_drawable};

fn png_bytes() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 255, 0, 255]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

#[test]
fn should_set_all_standard_uniforms_with_noop_binder() {
    let mut device = RecordingDevice::new();
    let drawable = quad_drawable(&mut device, binders::noop);
    device.clear_calls();

    let identity = Matrix4::identity();
    drawable
        .borrow()
        .draw(&mut device, &identity, &identity, &identity)
        .unwrap();

    assert_eq!(
        device.uniforms_set(),
        ["u_modelMat", "u_viewMat", "u_projMat", "u_col"]
    );
    assert_eq!(
        device.draws(),
        [&Call::DrawElements {
            topology: Topology::TriangleList,
            count: QUAD_INDICES.len() as u32,
            width: IndexWidth::U8,
        }]
    );
}

#[test]
fn should_bind_before_uploading_uniforms() {
    let mut device = RecordingDevice::new();
    let drawable = quad_drawable(&mut device, binders::noop);
    device.clear_calls();

    let identity = Matrix4::identity();
    drawable
        .borrow()
        .draw(&mut device, &identity, &identity, &identity)
        .unwrap();

    let calls = device.calls();
    assert!(matches!(calls[0], Call::BindBuffer { .. }));
    assert!(matches!(calls[1], Call::BindBuffer { .. }));
    assert!(matches!(calls[2], Call::UseProgram(_)));
}

#[test]
fn should_bind_texture_argument_to_unit_zero() {
    let mut device = RecordingDevice::new();
    let drawable = quad_drawable(&mut device, binders::textured);
    let texture = Rc::new(Texture::from_bytes(&mut device, &png_bytes(), Some("png")).unwrap());
    drawable
        .borrow_mut()
        .set_arg("texture", Arg::Texture(texture.clone()));
    drawable
        .borrow_mut()
        .set_arg(COLOUR_ARG, Arg::Vec4([0.5, 0.5, 0.5, 1.0]));
    device.clear_calls();

    let identity = Matrix4::identity();
    drawable
        .borrow()
        .draw(&mut device, &identity, &identity, &identity)
        .unwrap();

    assert!(device.calls().contains(&Call::BindTexture {
        unit: 0,
        texture: Some(texture.id())
    }));
    let attribute_pointers = device
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::VertexAttribPointer { stride: 20, .. }))
        .count();
    assert_eq!(attribute_pointers, 2);
}

#[test]
fn should_reject_out_of_range_indices_before_upload() {
    let mut device = RecordingDevice::new();
    let err = drift_ngin::data_structures::geometry::GeometryBuffer::new(
        &mut device,
        &QUAD_VERTICES,
        &[0, 1, 4],
        Topology::TriangleList,
    )
    .unwrap_err();

    assert!(matches!(err, RenderError::IndexOutOfRange { index: 4, .. }));
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn should_not_build_programs_that_fail_to_link() {
    let mut device = RecordingDevice::new().with_failing_links();
    let result = drift_ngin::data_structures::program::ShaderProgram::from_sources(
        &mut device,
        "vertex",
        "fragment",
        binders::noop,
    );

    assert!(matches!(result, Err(RenderError::Link { .. })));
    assert_eq!(device.live_programs(), 0);
}

#[test]
fn should_release_geometry_with_last_drawable() {
    let mut device = RecordingDevice::new();
    let drawable = quad_drawable(&mut device, binders::noop);
    let drawable = Rc::try_unwrap(drawable).unwrap().into_inner();
    assert_eq!(device.live_buffers(), 2);

    drawable.release(&mut device);
    assert_eq!(device.live_buffers(), 0);
}
