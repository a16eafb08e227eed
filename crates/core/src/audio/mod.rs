//! Audio sources and the controller that switches between them.
//!
//! A [`SourceConnection`] is the only way audio reaches the analysis node. The
//! [`SourceController`] keeps at most one of them alive and releases it in
//! full before the next one is attached.

mod controller;
#[cfg(feature = "native")]
pub mod native;
mod platform;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::SampleSink;

pub use controller::{ControllerPhase, SourceController, SourceEvent};
pub use platform::{AudioPlatform, EndedObserver, MediaStream, MediaTrack, PlaybackElement};

/// The three mutually exclusive inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Microphone,
    SystemAudio,
    #[default]
    File,
}

impl SourceKind {
    /// Short status text for the caller's UI.
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Microphone => "Live Input",
            SourceKind::SystemAudio => "System Audio",
            SourceKind::File => "File Playback",
        }
    }

    /// Live sources stream continuously and have no pause concept.
    pub fn is_live(self) -> bool {
        !matches!(self, SourceKind::File)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Microphone => write!(f, "microphone"),
            SourceKind::SystemAudio => write!(f, "system"),
            SourceKind::File => write!(f, "file"),
        }
    }
}

/// Observable playback status shared with the render loop and the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackState {
    pub source_kind: SourceKind,
    pub is_playing: bool,
}

/// Kind of a track inside a capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Reference to a local audio file picked by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    path: PathBuf,
}

impl FileRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name for log output, falling back to the full path.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

impl From<PathBuf> for FileRef {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for FileRef {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

/// The single input wired into the analysis node, with everything needed to
/// release it again.
#[derive(Debug)]
pub enum SourceConnection {
    Microphone { stream: MediaStream },
    SystemAudio { stream: MediaStream },
    File { element: Box<dyn PlaybackElement> },
}

impl SourceConnection {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceConnection::Microphone { .. } => SourceKind::Microphone,
            SourceConnection::SystemAudio { .. } => SourceKind::SystemAudio,
            SourceConnection::File { .. } => SourceKind::File,
        }
    }

    /// Points the source output at the analysis input, or disconnects it.
    pub(crate) fn route(&mut self, sink: Option<SampleSink>) {
        match self {
            SourceConnection::Microphone { stream } | SourceConnection::SystemAudio { stream } => {
                stream.route_audio(sink)
            }
            SourceConnection::File { element } => element.route(sink),
        }
    }

    /// Frees platform resources: stops every capture track, or pauses the
    /// element and drops its source so nothing keeps buffering.
    pub fn release(&mut self) {
        match self {
            SourceConnection::Microphone { stream } | SourceConnection::SystemAudio { stream } => {
                stream.stop_all()
            }
            SourceConnection::File { element } => {
                element.set_monitoring(false);
                element.pause();
                element.clear_source();
            }
        }
    }
}
