mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use zview_core::{
    intake::ACCEPTED_EXTENSIONS, FileIntake, IntakeEvent, LoadOrchestrator, LoadOutcome, Scene,
    UsdzLoader,
};
use zview_math::{Camera, OrbitControls};
use zview_viewport::{FrameLoop, OverlayActions, OverlayStatus, Renderer};

use config::{Args, ViewerConfig};

/// Application state
struct App {
    config: ViewerConfig,
    startup_file: Option<PathBuf>,

    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,

    scene: Scene,
    camera: Camera,
    controls: OrbitControls,
    intake: FileIntake,
    orchestrator: LoadOrchestrator<UsdzLoader>,
    frame_loop: FrameLoop,

    // Input state
    left_mouse_pressed: bool,
    middle_mouse_pressed: bool,
    last_mouse_pos: Option<(f64, f64)>,
    last_frame_time: Instant,
    /// The loading state has been on screen for at least one frame
    loading_drawn: bool,
}

impl App {
    fn new(config: ViewerConfig, startup_file: Option<PathBuf>) -> Self {
        let scene = Scene::bootstrap(&config.scene_settings());
        let camera = config.camera();
        let controls = OrbitControls::new(camera.target);
        let orchestrator =
            LoadOrchestrator::new(UsdzLoader::new()).with_fit_offset(config.camera.fit_offset);

        Self {
            frame_loop: FrameLoop::new(config.frame_interval()),
            config,
            startup_file,
            window: None,
            renderer: None,
            scene,
            camera,
            controls,
            intake: FileIntake::new(),
            orchestrator,
            left_mouse_pressed: false,
            middle_mouse_pressed: false,
            last_mouse_pos: None,
            last_frame_time: Instant::now(),
            loading_drawn: false,
        }
    }

    /// Route an intake event; selected files start a load.
    fn handle_intake(&mut self, event: IntakeEvent) {
        if let Some(file) = self.intake.handle(event) {
            self.orchestrator.load_file(&mut self.scene, file);
            self.request_redraw();
        }
    }

    /// Show the native file dialog (the click-to-browse path).
    fn open_picker(&mut self) {
        let picked = rfd::FileDialog::new()
            .set_title("Open USDZ")
            .add_filter("USD", ACCEPTED_EXTENSIONS)
            .pick_file();

        match picked {
            Some(path) => self.handle_intake(IntakeEvent::Picked(path)),
            None => log::debug!("File dialog cancelled"),
        }
    }

    fn frame_content(&mut self) {
        if let Some(fit) = self
            .orchestrator
            .refit(&self.scene, &mut self.camera, &mut self.controls)
        {
            log::debug!("Reframed at distance {:.3}", fit.distance);
        }
    }

    fn apply_actions(&mut self, actions: OverlayActions) {
        if actions.open_picker {
            self.open_picker();
        }
        if actions.frame_content {
            self.frame_content();
        }
    }

    fn request_redraw(&self) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn clear_color(&self) -> wgpu::Color {
        let [r, g, b] = self.config.render.clear_color;
        wgpu::Color { r, g, b, a: 1.0 }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let Some(time_seconds) = self.frame_loop.begin_frame(now) else {
            return;
        };

        // Calculate delta time
        let delta_time = (now - self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        self.orchestrator.update(&mut self.scene, time_seconds);
        let clear_color = self.clear_color();
        self.loading_drawn = self.orchestrator.is_loading();

        let (Some(renderer), Some(window)) = (&mut self.renderer, &self.window) else {
            return;
        };

        renderer.update_fps(delta_time);
        renderer.sync_scene(&self.scene);

        let status = OverlayStatus {
            loading: self.orchestrator.is_loading(),
            content_visible: self.orchestrator.is_content_visible(),
            error: self.orchestrator.error(),
            file_name: self
                .orchestrator
                .current_file()
                .map(|file| file.name.as_str()),
            hovering: self.intake.is_hovering(),
            hover_accepted: self.intake.hover_accepted(),
            ..Default::default()
        };

        let actions = match renderer.render(clear_color, window, &self.camera, status) {
            Ok(actions) => Some(actions),
            Err(e) => {
                // Check if it's a surface error we can handle
                if let Some(surface_err) = e.downcast_ref::<wgpu::SurfaceError>() {
                    match surface_err {
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                            renderer.reconfigure();
                        }
                        wgpu::SurfaceError::OutOfMemory => {
                            log::error!("Out of memory!");
                            event_loop.exit();
                        }
                        _ => {
                            log::error!("Surface error: {:?}", surface_err);
                        }
                    }
                } else {
                    log::error!("Render error: {:?}", e);
                }
                None
            }
        };

        if let Some(actions) = actions {
            self.apply_actions(actions);
        }
    }

    fn handle_key(&mut self, keycode: KeyCode) {
        match keycode {
            KeyCode::KeyO => self.open_picker(),
            KeyCode::KeyF => self.frame_content(),
            KeyCode::KeyI => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.overlay.info_open = !renderer.overlay.info_open;
                }
            }
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title(self.config.window.title.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        // Initialize renderer (async in pollster block)
        let mut renderer =
            match pollster::block_on(Renderer::new(window.clone(), &self.scene, &self.camera)) {
                Ok(renderer) => renderer,
                Err(e) => {
                    log::error!("Failed to initialize renderer: {:?}", e);
                    event_loop.exit();
                    return;
                }
            };

        let size = window.inner_size();
        renderer.resize((size.width, size.height), &mut self.camera);

        self.window = Some(window);
        self.renderer = Some(renderer);
        log::info!("Window and renderer initialized");

        if let Some(path) = self.startup_file.take() {
            self.handle_intake(IntakeEvent::Picked(path));
        }
        self.request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        // Let egui handle the event first
        if let (Some(renderer), Some(window)) = (&mut self.renderer, &self.window) {
            if renderer.handle_egui_event(window, &event) {
                // Event was consumed by egui, don't process it further
                self.request_redraw();
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                self.frame_loop.cancel();
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize((physical_size.width, physical_size.height), &mut self.camera);
                    log::debug!("Resized to {}x{}", physical_size.width, physical_size.height);
                }
            }
            WindowEvent::HoveredFile(path) => self.handle_intake(IntakeEvent::Hovered(path)),
            WindowEvent::HoveredFileCancelled => self.handle_intake(IntakeEvent::HoverCancelled),
            WindowEvent::DroppedFile(path) => self.handle_intake(IntakeEvent::Dropped(path)),
            WindowEvent::MouseInput { button, state, .. } => match button {
                MouseButton::Left => {
                    self.left_mouse_pressed = state == ElementState::Pressed;
                    if !self.left_mouse_pressed {
                        self.last_mouse_pos = None;
                    }
                }
                MouseButton::Middle => {
                    self.middle_mouse_pressed = state == ElementState::Pressed;
                    if !self.middle_mouse_pressed {
                        self.last_mouse_pos = None;
                    }
                }
                _ => {}
            },
            WindowEvent::CursorMoved { position, .. } => {
                if self.left_mouse_pressed || self.middle_mouse_pressed {
                    if let Some(last_pos) = self.last_mouse_pos {
                        let delta_x = (position.x - last_pos.0) as f32;
                        let delta_y = (position.y - last_pos.1) as f32;

                        if self.left_mouse_pressed {
                            self.controls.orbit(&mut self.camera, delta_x, delta_y);
                        } else {
                            self.controls.pan(&mut self.camera, delta_x, delta_y);
                        }
                    }
                    self.last_mouse_pos = Some((position.x, position.y));
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll_amount = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y * 100.0,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32,
                };
                self.controls.dolly(&mut self.camera, scroll_amount);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(keycode),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(keycode),
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        // Decode only after the loading state has been drawn once
        let outcome = if self.loading_drawn {
            self.orchestrator
                .poll(&mut self.scene, &mut self.camera, &mut self.controls)
        } else {
            None
        };

        if let Some(outcome) = outcome {
            self.loading_drawn = false;
            if let LoadOutcome::Loaded { file, .. } = &outcome {
                if let Some(window) = &self.window {
                    window.set_title(&format!("{} - {}", file, self.config.window.title));
                }
            }
            self.request_redraw();
        }

        if self.orchestrator.is_loading() && !self.loading_drawn {
            self.request_redraw();
        }

        match self.frame_loop.next_deadline() {
            Some(deadline) => {
                if self.frame_loop.is_due(Instant::now()) {
                    self.request_redraw();
                }
                event_loop.set_control_flow(ControlFlow::WaitUntil(deadline));
            }
            None => event_loop.set_control_flow(ControlFlow::Wait),
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    let mut config = ViewerConfig::load_or_default(&args.config)?;
    config.apply_args(&args);

    log::info!("Starting zview");

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config, args.file);

    log::info!("Running event loop");
    event_loop.run_app(&mut app)?;

    Ok(())
}
