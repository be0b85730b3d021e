//! Window and event loop driver.
//!
//! [`run`] opens a window, creates a [`WgpuDevice`] for it, lets a
//! [`SceneBuilder`] load its resources and build the scene, and then renders
//! one [`Scene::render`] per redraw until the window is closed.
//!
//! # Input
//!
//! - W/A/S/D or the arrow keys move the camera
//! - a left click locks the pointer, after which mouse motion turns the camera
//! - Escape releases the pointer again
//!
//! Setup errors end the event loop and are returned from [`run`]. Errors
//! during a frame are logged and the loop continues.

use std::{fmt::Debug, future::Future, sync::Arc};

use instant::Instant;
use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, ElementState, KeyEvent, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Window},
};

use crate::{
    camera::InputState,
    config::EngineConfig,
    device::{GraphicsDevice, gpu::WgpuDevice},
    error::RenderError,
    resources::ResourceCache,
    scene::Scene,
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// What a [`SceneBuilder`] gets to work with during setup.
pub struct SetupContext<'a> {
    pub device: &'a mut dyn GraphicsDevice,
    pub resources: &'a mut ResourceCache,
    pub config: &'a EngineConfig,
    /// Size of the render target in pixels.
    pub size: [u32; 2],
}

/// Builds the scene once the device exists.
///
/// This is the place to load shaders and meshes through the resource cache
/// and to create programs, geometry, drawables and entities.
pub trait SceneBuilder: 'static {
    fn build(self, ctx: SetupContext<'_>) -> impl Future<Output = anyhow::Result<Scene>>;
}

struct AppState {
    device: WgpuDevice,
    scene: Scene,
}

impl Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("device", &self.device)
            .field("entities", &self.scene.entities().len())
            .finish()
    }
}

impl AppState {
    fn window(&self) -> Option<&Arc<Window>> {
        self.device.window()
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.device.set_viewport(width, height);
            self.scene.resize(width, height);
        }
    }
}

enum FlowEvent {
    #[allow(dead_code)]
    Initialized(Box<AppState>),
    #[allow(dead_code)]
    Failed(anyhow::Error),
}

impl Debug for FlowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized(state) => f.debug_tuple("Initialized").field(state).finish(),
            Self::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

async fn setup<B: SceneBuilder>(
    window: Arc<Window>,
    config: EngineConfig,
    builder: B,
) -> anyhow::Result<AppState> {
    let mut device = WgpuDevice::new(window).await?;
    let [width, height] = device.size();
    device.set_viewport(width, height);
    device.set_clear_color(config.clear_colour);
    device.set_depth_test(true);

    let mut resources = ResourceCache::new(config.asset_root.clone());
    let scene = builder
        .build(SetupContext {
            device: &mut device,
            resources: &mut resources,
            config: &config,
            size: [width, height],
        })
        .await?;
    log::info!(
        "scene ready: {} entities, {} resources",
        scene.entities().len(),
        resources.len()
    );
    Ok(AppState { device, scene })
}

struct App<B: SceneBuilder> {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    #[allow(dead_code)]
    proxy: EventLoopProxy<FlowEvent>,
    config: EngineConfig,
    builder: Option<B>,
    state: Option<AppState>,
    input: InputState,
    pointer_locked: bool,
    start: Instant,
    error: Option<anyhow::Error>,
}

impl<B: SceneBuilder> App<B> {
    fn new(event_loop: &EventLoop<FlowEvent>, config: EngineConfig, builder: B) -> anyhow::Result<Self> {
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            proxy: event_loop.create_proxy(),
            config,
            builder: Some(builder),
            state: None,
            input: InputState::default(),
            pointer_locked: false,
            start: Instant::now(),
            error: None,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("setup failed: {error:#}");
        self.error = Some(error);
        event_loop.exit();
    }

    fn set_pointer_lock(&mut self, locked: bool) {
        let Some(window) = self.state.as_ref().and_then(AppState::window) else {
            return;
        };
        let result = if locked {
            window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
        } else {
            window.set_cursor_grab(CursorGrabMode::None)
        };
        match result {
            Ok(()) => {
                window.set_cursor_visible(!locked);
                self.pointer_locked = locked;
            }
            Err(e) => log::warn!("could not change pointer lock: {e}"),
        }
    }

    fn install(&mut self, mut state: AppState) {
        if let Some(window) = state.window().cloned() {
            let size = window.inner_size();
            state.resize(size.width, size.height);
            window.request_redraw();
        }
        self.start = Instant::now();
        self.state = Some(state);
    }
}

impl<B: SceneBuilder> ApplicationHandler<FlowEvent> for App<B> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(builder) = self.builder.take() else {
            return;
        };

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title(self.config.title.clone());

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let canvas = web_sys::window()
                .and_then(|window| window.document())
                .and_then(|document| document.get_element_by_id(CANVAS_ID));
            match canvas {
                Some(canvas) => {
                    window_attributes =
                        window_attributes.with_canvas(Some(canvas.unchecked_into()));
                }
                None => log::warn!("no #{CANVAS_ID} element, letting winit create one"),
            }
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => return self.fail(event_loop, e.into()),
        };
        let init_future = setup(window, self.config.clone(), builder);

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self.async_runtime.block_on(init_future) {
                Ok(state) => self.install(state),
                Err(e) => self.fail(event_loop, e),
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let event = match init_future.await {
                    Ok(state) => FlowEvent::Initialized(Box::new(state)),
                    Err(e) => FlowEvent::Failed(e),
                };
                if proxy.send_event(event).is_err() {
                    log::error!("event loop closed before setup finished");
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: FlowEvent) {
        match event {
            // This is the message from our wasm `spawn_local`
            FlowEvent::Initialized(state) => self.install(*state),
            FlowEvent::Failed(e) => self.fail(event_loop, e),
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            if self.pointer_locked {
                self.input.add_look_delta(dx, dy);
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        if self.state.is_none() {
            return;
        }
        self.input.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    state.resize(size.width, size.height);
                }
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } if !self.pointer_locked => self.set_pointer_lock(true),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } if self.pointer_locked => self.set_pointer_lock(false),
            WindowEvent::Focused(false) if self.pointer_locked => self.set_pointer_lock(false),
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                let elapsed = self.start.elapsed();
                match state.scene.render(&mut state.device, &mut self.input, elapsed) {
                    Ok(stats) if stats.failed > 0 => {
                        log::warn!("{} of {} entities failed to draw", stats.failed, stats.updated)
                    }
                    Ok(_) => (),
                    // begin_frame already reconfigured the surface
                    Err(RenderError::Surface(e)) => log::warn!("{e}"),
                    Err(e) => log::error!("Unable to render {e}"),
                }
                if let Some(window) = state.window() {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

/// Opens a window and runs the scene produced by `builder` until the window
/// is closed.
pub fn run<B: SceneBuilder>(config: EngineConfig, builder: B) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            web_sys::console::warn_1(&JsValue::from_str(&format!(
                "Could not initialize logger: {e}"
            )));
        }
    }

    let event_loop: EventLoop<FlowEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, config, builder)?;

    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
