//! Frame Pacer demo.
//!
//! Opens a window and drives a clear-colour demo through the frame
//! scheduler, with the ring size and wait bounds taken from `pacer.toml`.

mod renderer;

use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use pacer_core::{EngineConfig, FrameClock};
use pacer_frame::FrameError;
use pacer_platform::Window;

use crate::renderer::Renderer;

const CONFIG_PATH: &str = "pacer.toml";

/// How long to idle per event-loop turn while minimized.
const MINIMIZED_SLEEP: Duration = Duration::from_millis(100);

struct App {
    config: EngineConfig,
    // Dropped before the window its surface was created for.
    renderer: Option<Renderer>,
    window: Option<Window>,
    clock: FrameClock,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            clock: FrameClock::default(),
            fatal: None,
        }
    }

    /// Logs a fatal frame error, tears the renderer down and stops the loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: FrameError) {
        error!(
            "Fatal error in {}: {} (native code {:?})",
            err.operation().unwrap_or("frame loop"),
            err,
            err.native_code()
        );
        self.shutdown_renderer();
        self.fatal = Some(err.into());
        event_loop.exit();
    }

    fn shutdown_renderer(&mut self) {
        if let Some(mut renderer) = self.renderer.take()
            && let Err(e) = renderer.shutdown()
        {
            error!("Renderer shutdown failed: {}", e);
        }
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return;
        };

        if window.is_minimized() {
            std::thread::sleep(MINIMIZED_SLEEP);
            return;
        }

        self.clock.tick();
        let elapsed = self.clock.elapsed().as_secs_f32();

        match renderer.render_frame(elapsed, window.size()) {
            Ok(()) => {}
            Err(e) if !e.is_fatal() => {
                warn!("Recoverable frame error: {}", e);
                renderer.request_recreate();
            }
            Err(e) => {
                self.fail(event_loop, e);
                return;
            }
        }

        if self.clock.should_report() {
            info!(
                "{:.1} fps ({:.2} ms/frame, {} frames)",
                self.clock.fps(),
                self.clock.frame_time_ms(),
                self.clock.frames()
            );
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                self.fatal = Some(e.into());
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(&window, &self.config) {
            Ok(renderer) => {
                info!("Initialization complete, entering main loop");
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => {
                error!("Failed to create renderer: {:#}", e);
                self.fatal = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.shutdown_renderer();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.request_recreate();
                }
            }
            WindowEvent::RedrawRequested => self.draw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown_renderer();
    }
}

fn main() -> Result<()> {
    pacer_core::init_logging();
    info!("Starting Frame Pacer");

    let config = EngineConfig::load_or_default(CONFIG_PATH)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(anyhow!("frame loop stopped: {:#}", e)),
        None => Ok(()),
    }
}
