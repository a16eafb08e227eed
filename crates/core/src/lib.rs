//! Core library for the SonicFlow audio visualiser.
//!
//! Audio enters through one of three mutually exclusive sources managed by
//! the [`SourceController`], is reduced to a magnitude spectrum by the
//! [`SpectralAnalyzer`] and painted every refresh by the [`RenderEngine`]
//! driven from a [`RenderLoop`]. Platform services (capture devices, file
//! decoding) sit behind the [`AudioPlatform`] trait; the `native` feature
//! provides an implementation on top of cpal and rodio.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod record;
pub mod render;
pub mod timeline;

pub use analysis::{ContextState, FrequencyFrame, SampleSink, SpectralAnalyzer};
pub use audio::{
    AudioPlatform, ControllerPhase, FileRef, MediaStream, PlaybackElement, PlaybackState,
    SourceConnection, SourceController, SourceKind,
};
pub use config::{AnalysisConfig, AppConfig, RenderConfig, SourceConfig};
pub use error::{Result, VisualizerError};
pub use record::{DrawCommand, RecordingSurface};
pub use render::{Palette, Pixmap, RenderEngine, RenderLoop, Surface, VisualConfig, VisualMode};
pub use timeline::{FrameBudget, FrameClock, RefreshClock};
