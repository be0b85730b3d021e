use std::{cell::RefCell, rc::Rc};

use drift_ngin::{
    Vector3,
    config::EngineConfig,
    data_structures::{
        drawable::{Arg, COLOUR_ARG, Drawable},
        entity::{Entity, Orbit, Spin, Transform},
        geometry::GeometryBuffer,
        program::{ShaderProgram, binders},
    },
    device::{Topology, gpu::FLAT_SHADER},
    flow::{SceneBuilder, SetupContext},
    resources::mesh,
    scene::Scene,
};

const GRID: i32 = 5;
const SPACING: f32 = 3.0;

const COLOURS: [[f32; 4]; 3] = [
    [0.9, 0.3, 0.2, 1.0],
    [0.2, 0.4, 0.9, 1.0],
    [0.95, 0.85, 0.3, 1.0],
];

struct Cubes;

impl SceneBuilder for Cubes {
    async fn build(self, ctx: SetupContext<'_>) -> anyhow::Result<Scene> {
        let SetupContext {
            device,
            resources,
            config,
            size,
        } = ctx;

        let (vertices, faces) = mesh::parse(resources.text("cube.obj").await?);
        // every face comes out as five entries, only the first three are corners
        let indices: Vec<u32> = faces.chunks(5).flat_map(|face| face.iter().take(3)).copied().collect();
        let geometry = Rc::new(GeometryBuffer::new(
            device,
            &vertices,
            &indices,
            Topology::TriangleList,
        )?);

        let mut program = ShaderProgram::from_sources(device, FLAT_SHADER, FLAT_SHADER, binders::textured)?;
        binders::register_conventional(&mut program, device);
        let program = Rc::new(program);

        let drawables: Vec<_> = COLOURS
            .iter()
            .map(|colour| {
                let mut drawable = Drawable::new(geometry.clone(), program.clone());
                drawable.set_arg(COLOUR_ARG, Arg::Vec4(*colour));
                Rc::new(RefCell::new(drawable))
            })
            .collect();

        let mut scene = Scene::new(config, size[0], size[1]);
        for x in 0..GRID {
            for z in 0..GRID {
                let offset = (GRID - 1) as f32 * SPACING / 2.0;
                let position = Vector3::new(x as f32 * SPACING - offset, 0.0, z as f32 * SPACING - offset);
                let spin = Spin {
                    degrees_per_second: Vector3::new(0.0, 30.0 + 10.0 * x as f32, 15.0 * z as f32),
                };
                let drawable = drawables[((x + z) % 2) as usize].clone();
                scene.add(Entity::new(Transform::at(position), spin).with_drawable(drawable));
            }
        }
        for i in 0..4 {
            let orbit = Orbit::new(Vector3::new(0.0, 0.0, 0.0), 10.0, 20.0 + 5.0 * i as f32, 2.0 + i as f32);
            let transform = Transform::default().with_scale(Vector3::new(0.5, 0.5, 0.5));
            scene.add(Entity::new(transform, orbit).with_drawable(drawables[2].clone()));
        }
        log::info!("built {} cubes", scene.entities().len());
        Ok(scene)
    }
}

fn main() -> anyhow::Result<()> {
    let config = EngineConfig::default()
        .with_title("cubes")
        .with_asset_root(concat!(env!("CARGO_MANIFEST_DIR"), "/assets"));
    drift_ngin::flow::run(config, Cubes)
}
