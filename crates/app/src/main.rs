//! ToyBox - Main Entry Point
//!
//! Opens a window, starts the renderer on the demo scene and drives the
//! update, render, present loop until the window closes or a fatal error
//! stops it.

mod demo;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use toybox_core::{AppConfig, Timer};
use toybox_platform::{EventQueue, EventSource, PlatformEvent, Window};
use toybox_renderer::Renderer;

const DEFAULT_CONFIG_PATH: &str = "toybox.toml";

/// Everything the application owns, passed explicitly to the event loop.
struct AppContext {
    config: AppConfig,
    window: Option<Window>,
    renderer: Option<Renderer>,
    timer: Timer,
    events: EventQueue,
    /// First fatal error; turns into a non-zero exit status.
    failure: Option<anyhow::Error>,
}

impl AppContext {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            timer: Timer::new(),
            events: EventQueue::new(),
            failure: None,
        }
    }

    fn startup(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window).context("creating window")?;
        let scene = demo::build_scene(&self.config.scene);
        let renderer = Renderer::startup(&window, scene, &self.config.renderer)
            .context("starting renderer")?;

        info!("Initialization complete, entering main loop");
        self.window = Some(window);
        self.renderer = Some(renderer);
        self.timer.reset();
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        let (Some(window), Some(renderer)) = (self.window.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };

        for event in self.events.poll_events() {
            if let PlatformEvent::Resized { width, height } = event {
                window.resize(width, height);
                renderer.notify_resize(width, height);
            }
        }

        let delta = self.timer.delta_secs();
        renderer.frame_update(delta);
        renderer.frame_render()?;
        renderer.frame_present()?;
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("Fatal: {:#}", err);
        self.failure.get_or_insert(err);
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        self.events = EventQueue::new();
        if let Some(renderer) = self.renderer.take()
            && let Err(e) = renderer.shutdown()
        {
            error!("Renderer shutdown failed: {}", e);
        }
        self.window = None;

        if self.timer.frame_count() > 0 {
            info!(
                "Rendered {} frames, {:.1} fps average",
                self.timer.frame_count(),
                self.timer.average_fps()
            );
        }
    }
}

impl ApplicationHandler for AppContext {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.startup(event_loop)
        {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        self.events.push_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.tick() {
                    self.fail(event_loop, e);
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

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn run() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = AppConfig::load_or_default(&config_path)?;

    match config.log_filter.as_deref() {
        Some(filter) => toybox_core::init_logging_with(filter),
        None => toybox_core::init_logging(),
    }
    info!("Starting ToyBox");
    debug!("Effective configuration:\n{}", config.to_toml_string()?);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = AppContext::new(config);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("toybox: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
