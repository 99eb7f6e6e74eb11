//! vkframe sandbox
//!
//! Opens a window and drives one built-in demo through the frame loop. Each
//! demo draws a metrics overlay, and the window title carries a short
//! summary. `[demo] name` in `vkframe.toml` picks the demo. Escape quits, M cycles
//! the MSAA sample count and `[` / `]` move the sampler's minimum LOD.

mod controls;
mod demos;

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use vkframe_core::{Config, FrameClock};
use vkframe_platform::Window;
use vkframe_renderer::{Demo, FrameBackend, Renderer, RendererOptions, VulkanBackend};

use crate::controls::Action;

/// How often the window title is refreshed with frame stats.
const TITLE_INTERVAL_SECS: f32 = 0.5;

type SandboxRenderer = Renderer<VulkanBackend, Box<dyn Demo<VulkanBackend>>>;

struct App {
    config: Config,
    // Dropped before the window its surface was created from.
    renderer: Option<SandboxRenderer>,
    window: Option<Window>,
    clock: FrameClock,
    next_title_update: f32,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            clock: FrameClock::new(),
            next_title_update: 0.0,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window)?;
        let backend = VulkanBackend::new(&window, &self.config.window.title, &self.config.graphics)?;
        let demo = demos::create(&self.config.demo.name, &self.config.paths.shader_dir)?;

        let mut renderer = Renderer::new(
            backend,
            demo,
            RendererOptions {
                clear_color: self.config.graphics.clear_color,
                samples: self.config.graphics.msaa.samples(),
            },
        );
        renderer.prepare()?;

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    /// Runs one update and, unless the window is minimized, one frame.
    fn frame(&mut self) -> Result<()> {
        let time = self.clock.tick();
        let dt = time.delta_secs();
        let (Some(renderer), Some(window)) = (self.renderer.as_mut(), self.window.as_ref()) else {
            return Ok(());
        };

        renderer.update(dt)?;
        if window.is_minimized() {
            return Ok(());
        }
        renderer.render(dt)?;

        let now = time.app_secs();
        if now >= self.next_title_update {
            self.next_title_update = now + TITLE_INTERVAL_SECS;
            let title = controls::window_title(
                &self.config.window.title,
                &self.config.demo.name,
                renderer.stats(),
                renderer.settings(),
            );
            window.inner().set_title(&title);
        }
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut renderer) = self.renderer.take()
            && let Err(e) = renderer.destroy()
        {
            error!("Renderer shutdown failed: {}", e);
        }
        self.window = None;
        event_loop.exit();
    }

    fn handle_action(&mut self, event_loop: &ActiveEventLoop, action: Action) {
        if action == Action::Exit {
            info!("Escape pressed, shutting down");
            self.shutdown(event_loop);
            return;
        }
        if let Some(renderer) = self.renderer.as_mut() {
            let max_samples = renderer.backend().max_samples();
            controls::apply(action, renderer.request_settings(), max_samples);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(()) => info!("Initialization complete, entering main loop"),
            Err(e) => {
                error!("Initialization failed: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer
                        .backend_mut()
                        .set_window_extent(size.width, size.height);
                    renderer.request_resize();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.frame() {
                    error!("Frame failed: {:#}", e);
                    self.shutdown(event_loop);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if !event.state.is_pressed() || event.repeat {
                    return;
                }
                if let PhysicalKey::Code(key) = event.physical_key
                    && let Some(action) = controls::action_for(key)
                {
                    self.handle_action(event_loop, action);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    vkframe_core::init_logging();
    info!("Starting vkframe sandbox");

    let config = Config::load()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
