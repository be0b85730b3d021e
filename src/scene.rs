//! The per-frame loop: advance the clock, move the camera, update and draw
//! every entity in order.

use instant::Duration;

use crate::{
    camera::{Camera, CameraController, InputState, Projection},
    config::EngineConfig,
    data_structures::entity::Entity,
    device::GraphicsDevice,
    error::Result,
};

/// Turns monotonically increasing timestamps into frame deltas.
///
/// The first tick yields zero. Later ticks yield the time since the previous
/// tick, capped at `max_delta` so a stall does not teleport everything.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    last: Option<Duration>,
    max_delta: Duration,
}

impl FrameClock {
    pub fn new(max_delta: Duration) -> Self {
        Self {
            last: None,
            max_delta,
        }
    }

    /// `elapsed` is the time since an arbitrary fixed start.
    pub fn tick(&mut self, elapsed: Duration) -> Duration {
        let dt = match self.last {
            Some(last) => elapsed.saturating_sub(last).min(self.max_delta),
            None => Duration::ZERO,
        };
        self.last = Some(elapsed);
        dt
    }
}

/// Counts from the last [`Scene::frame`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub updated: usize,
    pub drawn: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct Scene {
    pub camera: Camera,
    pub controller: CameraController,
    pub projection: Projection,
    entities: Vec<Entity>,
    clock: FrameClock,
}

impl Scene {
    pub fn new(config: &EngineConfig, width: u32, height: u32) -> Self {
        Self {
            camera: config.camera(),
            controller: config.controller(),
            projection: config.projection(width, height),
            entities: Vec::new(),
            clock: FrameClock::new(config.max_frame_delta),
        }
    }

    /// Appends an entity; entities update and draw in insertion order.
    pub fn add(&mut self, entity: Entity) -> usize {
        self.entities.push(entity);
        self.entities.len() - 1
    }

    pub fn remove(&mut self, index: usize) -> Option<Entity> {
        (index < self.entities.len()).then(|| self.entities.remove(index))
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut [Entity] {
        &mut self.entities
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.projection.resize(width, height);
    }

    /// Runs one frame. Never stops half-way: a failing draw is logged and the
    /// remaining entities are still updated and drawn.
    pub fn frame(
        &mut self,
        device: &mut dyn GraphicsDevice,
        input: &mut InputState,
        elapsed: Duration,
    ) -> FrameStats {
        let dt = self.clock.tick(elapsed);
        self.controller.update(&mut self.camera, input, dt);

        let view = self.camera.view_matrix();
        let projection = self.projection.calc_matrix();
        let mut stats = FrameStats::default();
        for (index, entity) in self.entities.iter_mut().enumerate() {
            entity.update(dt);
            stats.updated += 1;
            match entity.draw(device, &view, &projection) {
                Ok(()) => stats.drawn += usize::from(entity.drawable().is_some()),
                Err(e) => {
                    stats.failed += 1;
                    log::error!("entity {index} failed to draw: {e}");
                }
            }
        }
        stats
    }

    /// [`frame`](Self::frame) wrapped in `begin_frame`/`end_frame`.
    pub fn render(
        &mut self,
        device: &mut dyn GraphicsDevice,
        input: &mut InputState,
        elapsed: Duration,
    ) -> Result<FrameStats> {
        device.begin_frame()?;
        let stats = self.frame(device, input, elapsed);
        device.end_frame()?;
        Ok(stats)
    }
}
