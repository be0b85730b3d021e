use std::{cell::RefCell, rc::Rc};

use drift_ngin::{
    Duration, Vector3,
    camera::InputState,
    config::EngineConfig,
    data_structures::{
        entity::{Entity, Spin, Static, Transform},
        program::binders,
    },
    device::{
        BufferKind,
        recording::{Call, RecordingDevice},
    },
    scene::Scene,
};

mod common;

use common::test_utils::{Trace, TracingDevice, failing_binder, quad_drawable};

fn scene() -> Scene {
    Scene::new(&EngineConfig::default(), 800, 600)
}

#[test]
fn should_interleave_update_and_draw_per_entity() {
    let trace = Rc::new(RefCell::new(Vec::new()));
    let mut device = TracingDevice::new(trace.clone());
    let drawable = quad_drawable(&mut device, binders::position_only);

    let mut scene = scene();
    for i in 0..3 {
        let log = trace.clone();
        let entity = Entity::new(
            Transform::at(Vector3::new(0.0, 0.0, 0.0)),
            move |t: &mut Transform, _: Duration| {
                log.borrow_mut().push(Trace::Update(i));
                t.translation.x = i as f32 * 10.0;
            },
        )
        .with_drawable(drawable.clone());
        scene.add(entity);
    }

    let mut input = InputState::default();
    let stats = scene.frame(&mut device, &mut input, Duration::from_secs(1));

    assert_eq!(stats.updated, 3);
    assert_eq!(stats.drawn, 3);
    assert_eq!(
        *trace.borrow(),
        [
            Trace::Update(0),
            Trace::Draw([0.0, 0.0, 0.0]),
            Trace::Update(1),
            Trace::Draw([10.0, 0.0, 0.0]),
            Trace::Update(2),
            Trace::Draw([20.0, 0.0, 0.0]),
        ]
    );
}

#[test]
fn should_share_geometry_between_entities() {
    let mut device = RecordingDevice::new();
    let drawable = quad_drawable(&mut device, binders::position_only);
    let mut scene = scene();
    for x in 0..5 {
        scene.add(
            Entity::new(
                Transform::at(Vector3::new(x as f32, 0.0, 0.0)),
                Spin {
                    degrees_per_second: Vector3::new(0.0, 90.0, 0.0),
                },
            )
            .with_drawable(drawable.clone()),
        );
    }

    let mut input = InputState::default();
    for frame in 0..3 {
        scene.frame(&mut device, &mut input, Duration::from_millis(16 * frame));
    }

    let vertex_uploads = device
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::CreateBuffer { kind: BufferKind::Vertex, .. }))
        .count();
    assert_eq!(vertex_uploads, 1);
    assert_eq!(device.draws().len(), 15);
}

#[test]
fn should_keep_drawing_after_a_failing_entity() {
    let mut device = RecordingDevice::new();
    let good = quad_drawable(&mut device, binders::position_only);
    let bad = quad_drawable(&mut device, failing_binder);

    let mut scene = scene();
    scene.add(Entity::new(Transform::default(), Static).with_drawable(good.clone()));
    scene.add(Entity::new(Transform::default(), Static).with_drawable(bad));
    scene.add(Entity::new(Transform::default(), Static).with_drawable(good));

    let stats = scene
        .render(&mut device, &mut InputState::default(), Duration::ZERO)
        .unwrap();

    assert_eq!(stats.updated, 3);
    assert_eq!(stats.drawn, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(device.draws().len(), 2);
    assert_eq!(device.calls().last(), Some(&Call::EndFrame));
}

#[test]
fn should_update_logic_only_entities_without_drawing() {
    let mut device = RecordingDevice::new();
    let ticks = Rc::new(RefCell::new(0));
    let counter = ticks.clone();

    let mut scene = scene();
    scene.add(Entity::new(Transform::default(), move |_: &mut Transform, _: Duration| {
        *counter.borrow_mut() += 1
    }));

    let mut input = InputState::default();
    scene.frame(&mut device, &mut input, Duration::ZERO);
    let stats = scene.frame(&mut device, &mut input, Duration::from_millis(10));

    assert_eq!(*ticks.borrow(), 2);
    assert_eq!(stats.drawn, 0);
    assert!(device.calls().is_empty());
}

#[test]
fn should_move_camera_before_drawing() {
    let mut device = RecordingDevice::new();
    let drawable = quad_drawable(&mut device, binders::position_only);
    let view_location = drawable
        .borrow()
        .program()
        .standard()
        .view
        .unwrap();

    let config = EngineConfig::default().with_camera_speed(1.0);
    let mut scene = Scene::new(&config, 800, 600);
    scene.add(Entity::new(Transform::default(), Static).with_drawable(drawable));

    let mut input = InputState::default();
    input.right = true;
    scene.frame(&mut device, &mut input, Duration::ZERO);
    device.clear_calls();
    scene.frame(&mut device, &mut input, Duration::from_millis(200));

    let view = device.calls().iter().find_map(|call| match call {
        Call::UniformMat4 {
            location: Some(l),
            value,
        } if *l == view_location => Some(*value),
        _ => None,
    });
    let expected: [[f32; 4]; 4] = scene.camera.view_matrix().into();
    assert_eq!(view, Some(expected));
    assert!((scene.camera.position.x - 0.2).abs() < 1e-5);
}
