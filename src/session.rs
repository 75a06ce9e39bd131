//! Explicit session context tying video, tracker, forcing, simulation and
//! compositor together
//!
//! Construction walks a fixed initialisation sequence and reports the stage
//! that failed. After that the host drives the session with [`ArSession::frame`]
//! and [`ArSession::present`] once per display tick, feeds pointer and resize
//! events between ticks, and calls [`ArSession::destroy`] (any number of times)
//! to tear down.

use std::fmt;

use thiserror::Error;

use crate::config::SimulationParameters;
use crate::error::{ConfigError, SimError, SimResult};
use crate::forcing::{ForcingAdapter, PointerState};
use crate::output::Compositor;
use crate::simulation::{Backend, FieldData, SimulationGraph};
use crate::tracking::{Tracker, TrackerError};
use crate::video::{VideoError, VideoSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    Uninitialized,
    LoadingVideo,
    LoadingTracker,
    BuildingPipeline,
    Ready,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitStage::Uninitialized => "validating configuration",
            InitStage::LoadingVideo => "loading video",
            InitStage::LoadingTracker => "loading tracker",
            InitStage::BuildingPipeline => "building simulation pipeline",
            InitStage::Ready => "ready",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum InitCause {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Video(#[from] VideoError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Simulation(#[from] SimError),
}

/// Initialisation failed while in `stage`
#[derive(Debug, Error)]
#[error("initialisation failed while {stage}: {cause}")]
pub struct InitError {
    pub stage: InitStage,
    #[source]
    pub cause: InitCause,
}

impl InitError {
    fn new(stage: InitStage, cause: impl Into<InitCause>) -> Self {
        let cause = cause.into();
        log::error!("Session: failed while {}: {}", stage, cause);
        Self { stage, cause }
    }
}

pub struct ArSession<B: Backend> {
    backend: B,
    graph: SimulationGraph<B>,
    forcing: ForcingAdapter,
    compositor: Compositor,
    pointer: PointerState,
    tracker: Box<dyn Tracker>,
    video: Box<dyn VideoSource>,
    display: (u32, u32),
    stage: InitStage,
    destroyed: bool,
    tracker_warned: bool,
}

impl<B: Backend> ArSession<B> {
    /// Bring the session up: validate, open video, start the tracker, build
    /// the simulation
    ///
    /// Collaborators opened before a failing stage are shut down again.
    ///
    /// # Arguments
    /// * `backend` - Field storage; owned by the session from here on
    /// * `params` - Validated before anything else happens
    /// * `display` - Drawable size in pixels; the field size derives from it
    /// * `video` - Passthrough video feed
    /// * `tracker` - Landmark tracker fed from the same feed
    pub fn new(
        mut backend: B,
        params: SimulationParameters,
        display: (u32, u32),
        mut video: Box<dyn VideoSource>,
        mut tracker: Box<dyn Tracker>,
    ) -> Result<Self, InitError> {
        let mut stage = InitStage::Uninitialized;
        let (field_w, field_h) = params.field_extent(display.0, display.1);
        params
            .validate()
            .and_then(|()| params.validate_extent(field_w, field_h))
            .map_err(|e| InitError::new(stage, e))?;

        stage = InitStage::LoadingVideo;
        log::info!("Session: {}", stage);
        let info = video.open().map_err(|e| InitError::new(stage, e))?;

        stage = InitStage::LoadingTracker;
        log::info!("Session: {} ({}x{} video)", stage, info.width, info.height);
        if let Err(e) = tracker.init(&info) {
            video.close();
            return Err(InitError::new(stage, e));
        }

        stage = InitStage::BuildingPipeline;
        log::info!("Session: {} on {} backend", stage, backend.name());
        let graph = match SimulationGraph::new(&mut backend, params.clone(), field_w, field_h) {
            Ok(graph) => graph,
            Err(e) => {
                tracker.destroy();
                video.close();
                return Err(InitError::new(stage, e));
            }
        };

        let forcing = ForcingAdapter::new(&params, (field_w, field_h), info);
        let compositor = Compositor::new(&params.overlay, *forcing.transform());
        log::info!(
            "Session: ready, display {}x{}, field {}x{}",
            display.0,
            display.1,
            field_w,
            field_h
        );

        Ok(Self {
            backend,
            graph,
            forcing,
            compositor,
            pointer: PointerState::new(),
            tracker,
            video,
            display,
            stage: InitStage::Ready,
            destroyed: false,
            tracker_warned: false,
        })
    }

    /// Advance one frame
    ///
    /// Tracker failures are treated as "no landmarks this frame".
    ///
    /// # Errors
    /// Whatever the graph reports: `SimError::Halted` after a failed resize,
    /// or a backend execution error (which halts the graph).
    pub fn frame(&mut self, dt: f32) -> SimResult<()> {
        if self.destroyed {
            debug_assert!(false, "ArSession::frame called after destroy");
            log::warn!("Session: frame after destroy ignored");
            return Ok(());
        }

        let tracked = match self.tracker.update() {
            Ok(()) => {
                self.tracker_warned = false;
                true
            }
            Err(e) => {
                if !self.tracker_warned {
                    log::warn!("Session: tracker unavailable ({}); no landmark forcing", e);
                    self.tracker_warned = true;
                }
                false
            }
        };
        let landmarks = if tracked { self.tracker.landmarks() } else { &[] };

        let dt = self.graph.params().clamp_dt(dt);
        let motion = self.pointer.commit();
        let samples = self.forcing.collect(dt, motion, landmarks);
        self.graph.step(&mut self.backend, dt, samples)?;

        let frame = self.video.current_frame();
        self.compositor.upload_video(&mut self.backend, frame);
        Ok(())
    }

    /// Composite the current fields into `target`
    pub fn present(&mut self, target: &mut B::Target) -> SimResult<()> {
        if self.destroyed {
            return Err(SimError::Destroyed);
        }
        self.compositor
            .present(&mut self.backend, &self.graph, target, self.display)
    }

    /// Recreate the fields for a new drawable size
    ///
    /// Zero sizes (minimised windows) are ignored. On allocation failure the
    /// simulation halts until a later resize succeeds.
    pub fn resize(&mut self, width: u32, height: u32) -> SimResult<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        let (field_w, field_h) = self.graph.params().field_extent(width, height);
        self.graph.params().validate_extent(field_w, field_h)?;
        self.display = (width, height);
        log::info!(
            "Session: resize to {}x{} (field {}x{})",
            width,
            height,
            field_w,
            field_h
        );
        self.forcing.set_field_extent(field_w, field_h);
        self.compositor.set_transform(*self.forcing.transform());
        self.graph.resize(&mut self.backend, field_w, field_h)
    }

    /// Swap parameters between frames; the field is rebuilt when the
    /// resolution scale changes
    pub fn set_parameters(&mut self, params: SimulationParameters) -> SimResult<()> {
        let rescale = params.resolution_scale != self.graph.params().resolution_scale;
        params.validate()?;
        let (field_w, field_h) = params.field_extent(self.display.0, self.display.1);
        params.validate_extent(field_w, field_h)?;

        if rescale {
            self.graph.resize(&mut self.backend, field_w, field_h)?;
            self.forcing.set_field_extent(field_w, field_h);
        }
        self.graph.set_parameters(params.clone())?;
        self.forcing.configure(&params);
        self.compositor.configure(&params.overlay);
        self.compositor.set_transform(*self.forcing.transform());
        Ok(())
    }

    pub fn set_video_visible(&mut self, visible: bool) {
        self.compositor.set_video_visible(visible);
    }

    pub fn toggle_video(&mut self) -> bool {
        self.compositor.toggle_video()
    }

    pub fn pointer_mut(&mut self) -> &mut PointerState {
        &mut self.pointer
    }

    /// Pointer moved to `(x, y)` window pixels
    pub fn pointer_moved(&mut self, x: f64, y: f64) {
        self.pointer
            .move_to_pixels(x, y, self.display.0, self.display.1);
    }

    pub fn pointer_left(&mut self) {
        self.pointer.leave();
    }

    /// Release every GPU resource and detach from the collaborators
    ///
    /// Safe to call any number of times.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.graph.destroy(&mut self.backend);
        self.compositor.release(&mut self.backend);
        self.tracker.destroy();
        self.video.close();
        self.forcing.reset();
        self.destroyed = true;
        log::info!("Session: destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn stage(&self) -> InitStage {
        self.stage
    }

    pub fn display_size(&self) -> (u32, u32) {
        self.display
    }

    pub fn graph(&self) -> &SimulationGraph<B> {
        &self.graph
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Copy the dye field back to host memory
    pub fn read_dye(&mut self) -> SimResult<FieldData> {
        self.graph.read_dye(&mut self.backend)
    }

    pub fn forcing(&self) -> &ForcingAdapter {
        &self.forcing
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }
}

impl<B: Backend> Drop for ArSession<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
