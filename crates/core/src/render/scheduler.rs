use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{RenderEngine, Surface, VisualConfig};
use crate::{analysis::FrequencyFrame, audio::PlaybackState, timeline::RefreshClock};

/// Where the render loop gets its data and its go/stop signal.
pub trait FrameSource {
    /// Gives the source a chance to apply pending notifications before the
    /// frame is decided.
    fn poll(&self) {}

    fn playback(&self) -> PlaybackState;

    fn frame(&self) -> FrequencyFrame;
}

/// Shared stop flag for a [`RenderLoop`], checked before every frame.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Outcome of a single loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// A frame was drawn and another one should follow.
    Scheduled,
    /// Nothing was drawn; the loop is idle until playback resumes.
    Stopped,
}

/// Explicit per-frame loop around a [`RenderEngine`].
#[derive(Debug)]
pub struct RenderLoop {
    engine: RenderEngine,
    cancel: CancelToken,
    drawing: bool,
    frames: u64,
}

impl RenderLoop {
    pub fn new(engine: RenderEngine) -> Self {
        Self {
            engine,
            cancel: CancelToken::new(),
            drawing: false,
            frames: 0,
        }
    }

    pub fn engine(&self) -> &RenderEngine {
        &self.engine
    }

    /// Handle that stops the loop from elsewhere, e.g. a signal handler.
    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    /// Runs one iteration: draws the latest frame while playing, otherwise
    /// blanks the surface once and reports [`LoopStatus::Stopped`].
    pub fn step<S>(
        &mut self,
        source: &S,
        surface: &mut dyn Surface,
        visual: &VisualConfig,
    ) -> LoopStatus
    where
        S: FrameSource + ?Sized,
    {
        source.poll();

        if self.cancel.is_cancelled() || !source.playback().is_playing {
            if self.drawing {
                surface.clear();
                self.drawing = false;
                tracing::debug!(frames = self.frames, "render loop stopped");
            }
            return LoopStatus::Stopped;
        }

        if !self.drawing {
            tracing::debug!(mode = ?visual.mode, palette = ?visual.palette, "render loop started");
        }
        let frame = source.frame();
        self.engine.draw(surface, &frame, visual);
        self.drawing = true;
        self.frames += 1;
        LoopStatus::Scheduled
    }

    /// Steps once per refresh until playback stops, the loop is cancelled or
    /// the clock runs out. Returns the number of frames drawn by this call.
    pub fn run<S, C>(
        &mut self,
        source: &S,
        surface: &mut dyn Surface,
        visual: &VisualConfig,
        clock: &mut C,
    ) -> u64
    where
        S: FrameSource + ?Sized,
        C: RefreshClock + ?Sized,
    {
        let start = self.frames;
        while self.step(source, surface, visual) == LoopStatus::Scheduled {
            if !clock.wait_for_refresh() {
                break;
            }
        }
        self.frames - start
    }

    /// Cancels the loop for good and blanks the surface.
    pub fn teardown(&mut self, surface: &mut dyn Surface) {
        self.cancel.cancel();
        surface.clear();
        self.drawing = false;
    }
}
