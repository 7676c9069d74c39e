mod app;
mod cli;
mod effect;
mod frame;
mod gpu;
mod headless;
mod layer;
mod params;
mod settings;
mod source;
mod ui;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{WindowAttributes, WindowId};

use app::App;
use cli::Cli;
use settings::SettingsConfig;

/// Logs the whole error chain and aborts. Driver and pipeline failures leave
/// GPU state undefined, so nothing is retried.
fn fatal(err: impl Into<anyhow::Error>) -> ! {
    let err = err.into();
    log::error!("fatal: {err:#}");
    std::process::abort()
}

struct WorkshopApp {
    cli: Cli,
    settings: Option<SettingsConfig>,
    app: Option<App>,
}

impl WorkshopApp {
    fn new(cli: Cli, settings: SettingsConfig) -> Self {
        Self {
            cli,
            settings: Some(settings),
            app: None,
        }
    }
}

impl ApplicationHandler for WorkshopApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(settings) = self.settings.take() else {
            return;
        };

        let attrs = WindowAttributes::default()
            .with_title("Normal Map Workshop")
            .with_inner_size(winit::dpi::LogicalSize::new(
                settings.window_width.max(320),
                settings.window_height.max(240),
            ));
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => fatal(anyhow::anyhow!("failed to create window: {e}")),
        };

        match App::new(window, &self.cli, settings) {
            Ok(app) => {
                self.app = Some(app);
                log::info!("Normal Map Workshop initialized");
            }
            Err(e) => fatal(e),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(app) = self.app.as_mut() else {
            return;
        };

        let egui_consumed = app.host.overlay.handle_event(&app.host.window, &event);

        match event {
            WindowEvent::CloseRequested => {
                app.quit_requested = true;
            }
            WindowEvent::Resized(size) => {
                app.host.resize(size.width, size.height);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } if !egui_consumed || !app.host.overlay.wants_keyboard() => {
                app.quit_requested = true;
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = app.frame() {
                    fatal(e);
                }
            }
            _ => {}
        }

        // Quit only between frames.
        if app.quit_requested {
            app.save_settings();
            log::info!("Exiting after frame {}", app.workshop.frame());
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(app) = &self.app {
            app.host.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let settings = SettingsConfig::load();

    if cli.headless {
        let output = cli.output.clone().unwrap_or_else(|| settings.output_path.clone());
        let flip_y = cli.flip_y || settings.flip_y;
        if let Err(e) = headless::run(&cli.source, &cli.initial_layers(), flip_y, &output) {
            fatal(e);
        }
        return Ok(());
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(winit::event_loop::ControlFlow::Poll);

    let mut app = WorkshopApp::new(cli, settings);
    event_loop.run_app(&mut app)?;

    Ok(())
}
