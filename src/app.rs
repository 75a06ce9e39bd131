use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes},
};

use crate::config::SimulationParameters;
use crate::error::SimError;
use crate::gfx::GpuContext;
use crate::session::ArSession;
use crate::simulation::GpuBackend;
use crate::tracking::{NullTracker, Tracker};
use crate::video::{NoVideo, VideoSource};

/// Windowed host: one simulation frame and one composite per redraw
///
/// `V` toggles the passthrough video, `Escape` or closing the window tears
/// the session down.
pub struct EffectApp {
    event_loop: Option<EventLoop<()>>,
    app_state: AppState,
}

struct AppState {
    title: String,
    params: SimulationParameters,
    video: Option<Box<dyn VideoSource>>,
    tracker: Option<Box<dyn Tracker>>,

    window: Option<Arc<Window>>,
    context: Option<GpuContext>,
    session: Option<ArSession<GpuBackend>>,
    last_frame: Option<Instant>,
    torn_down: bool,
    halted_reported: bool,
    error: Option<anyhow::Error>,
}

impl EffectApp {
    pub fn new(params: SimulationParameters) -> anyhow::Result<Self> {
        let event_loop = EventLoop::new().context("failed to create event loop")?;
        Ok(Self {
            event_loop: Some(event_loop),
            app_state: AppState {
                title: "flowveil".to_string(),
                params,
                video: None,
                tracker: None,
                window: None,
                context: None,
                session: None,
                last_frame: None,
                torn_down: false,
                halted_reported: false,
                error: None,
            },
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.app_state.title = title.into();
        self
    }

    pub fn with_video(mut self, video: Box<dyn VideoSource>) -> Self {
        self.app_state.video = Some(video);
        self
    }

    pub fn with_tracker(mut self, tracker: Box<dyn Tracker>) -> Self {
        self.app_state.tracker = Some(tracker);
        self
    }

    /// Run the event loop until the window closes
    ///
    /// Installs an `env_logger` sink unless the host already set one up.
    pub fn run(mut self) -> anyhow::Result<()> {
        let _ = env_logger::try_init();

        let event_loop = self
            .event_loop
            .take()
            .context("event loop already consumed")?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop
            .run_app(&mut self.app_state)
            .context("event loop failed")?;

        self.app_state.teardown();
        match self.app_state.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl AppState {
    fn start(&mut self, window: Arc<Window>) -> anyhow::Result<()> {
        let (width, height): (u32, u32) = window.inner_size().into();
        let context = pollster::block_on(GpuContext::new(window.clone(), width, height))
            .context("failed to create GPU context")?;
        let format = context
            .surface_format()
            .context("windowed context has no surface")?;
        let backend = GpuBackend::new(&context, format)?;

        let video = self.video.take().unwrap_or_else(|| Box::new(NoVideo));
        let tracker = self.tracker.take().unwrap_or_else(|| Box::new(NullTracker));
        let session = ArSession::new(
            backend,
            self.params.clone(),
            (width.max(1), height.max(1)),
            video,
            tracker,
        )?;

        self.context = Some(context);
        self.session = Some(session);
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{:#}", err);
        self.error = Some(err);
        self.teardown();
        event_loop.exit();
    }

    fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.destroy();
        }
        self.torn_down = true;
    }

    fn redraw(&mut self) -> anyhow::Result<()> {
        let (Some(session), Some(context)) = (self.session.as_mut(), self.context.as_mut()) else {
            return Ok(());
        };

        let now = Instant::now();
        let dt = self
            .last_frame
            .map(|last| now.duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_frame = Some(now);

        match session.frame(dt) {
            Ok(()) => self.halted_reported = false,
            Err(SimError::Halted) => {
                if !self.halted_reported {
                    log::warn!("Simulation halted; waiting for a successful resize");
                    self.halted_reported = true;
                }
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }

        let frame = context.acquire_frame()?;
        let mut view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        session.present(&mut view)?;
        frame.present();
        Ok(())
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.torn_down {
            return;
        }

        let attributes = WindowAttributes::default()
            .with_title(self.title.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                self.fail(event_loop, anyhow::Error::new(err).context("failed to create window"));
                return;
            }
        };
        if let Err(err) = self.start(window) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        if self.torn_down {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.teardown();
                event_loop.exit();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match key_code {
                KeyCode::Escape => {
                    self.teardown();
                    event_loop.exit();
                }
                KeyCode::KeyV => {
                    if let Some(session) = self.session.as_mut() {
                        session.toggle_video();
                    }
                }
                _ => (),
            },
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                if let Some(context) = self.context.as_mut() {
                    context.resize(width, height);
                }
                if let Some(session) = self.session.as_mut() {
                    if let Err(err) = session.resize(width, height) {
                        log::error!("Resize to {}x{} failed: {}", width, height, err);
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Some(session) = self.session.as_mut() {
                    session.pointer_moved(position.x, position.y);
                }
            }
            WindowEvent::CursorLeft { .. } => {
                if let Some(session) = self.session.as_mut() {
                    session.pointer_left();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    self.fail(event_loop, err);
                }
            }
            _ => (),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.torn_down {
            return;
        }
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
