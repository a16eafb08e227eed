use std::cell::{Cell, RefCell};
use std::fmt;

use crossbeam_channel::{Receiver, Sender};

use super::{AudioPlatform, EndedObserver, FileRef, PlaybackState, SourceConnection, SourceKind};
use crate::{
    analysis::{ContextState, FrequencyFrame, SpectralAnalyzer},
    config::AppConfig,
    render::FrameSource,
    Result, VisualizerError,
};

/// Coarse lifecycle of the controller as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Idle,
    /// The newest request, for this kind, is waiting on the platform. Older
    /// requests still in flight are not reported: they can only resolve as
    /// superseded.
    Connecting(SourceKind),
    Connected(SourceKind),
}

/// Notification posted by a platform observer, tagged with the connection
/// it was registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEvent {
    CaptureEnded { generation: u64 },
    PlaybackEnded { generation: u64 },
}

impl SourceEvent {
    pub fn generation(self) -> u64 {
        match self {
            SourceEvent::CaptureEnded { generation } | SourceEvent::PlaybackEnded { generation } => {
                generation
            }
        }
    }
}

#[derive(Debug)]
struct ActiveSource {
    generation: u64,
    connection: SourceConnection,
}

#[derive(Debug, Default)]
struct Slot {
    active: Option<ActiveSource>,
    pending: Option<(u64, SourceKind)>,
    playback: PlaybackState,
}

#[derive(Debug, Clone, Copy)]
struct Ticket {
    generation: u64,
    kind: SourceKind,
}

/// Owns the single active source and the analyser it feeds.
///
/// All methods take `&self` and run on one cooperative executor. Connect
/// requests acquire the new source first and only then tear down the old one,
/// so a refused prompt leaves the current source playing. Each request takes
/// a generation number; a request that resolves after a newer one was started
/// releases what it acquired and fails with [`VisualizerError::Superseded`].
pub struct SourceController<P: AudioPlatform> {
    platform: P,
    analyzer: RefCell<SpectralAnalyzer>,
    slot: RefCell<Slot>,
    generation: Cell<u64>,
    fallback: SourceKind,
    events_tx: Sender<SourceEvent>,
    events_rx: Receiver<SourceEvent>,
}

impl<P: AudioPlatform> SourceController<P> {
    pub fn new(platform: P, config: &AppConfig) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            platform,
            analyzer: RefCell::new(SpectralAnalyzer::new(config.analysis.clone())),
            slot: RefCell::new(Slot::default()),
            generation: Cell::new(0),
            fallback: config.sources.capture_end_fallback,
            events_tx,
            events_rx,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Creates or resumes the analysis context. Connects call this themselves.
    pub fn initialize(&self) {
        self.analyzer.borrow_mut().initialize();
    }

    pub fn state(&self) -> PlaybackState {
        self.slot.borrow().playback
    }

    pub fn phase(&self) -> ControllerPhase {
        let slot = self.slot.borrow();
        if let Some((_, kind)) = slot.pending {
            return ControllerPhase::Connecting(kind);
        }
        match &slot.active {
            Some(active) => ControllerPhase::Connected(active.connection.kind()),
            None => ControllerPhase::Idle,
        }
    }

    /// Latest spectrum of whatever is attached; empty before initialization.
    pub fn sample(&self) -> FrequencyFrame {
        self.analyzer.borrow_mut().sample()
    }

    pub fn bin_count(&self) -> usize {
        self.analyzer.borrow().bin_count()
    }

    pub fn analyzer_state(&self) -> Option<ContextState> {
        self.analyzer.borrow().state()
    }

    pub async fn connect_microphone(&self) -> Result<()> {
        let ticket = self.begin(SourceKind::Microphone)?;
        let stream = match self.platform.request_microphone().await {
            Ok(stream) => stream,
            Err(err) => return Err(self.abandon(ticket, err)),
        };
        self.commit(ticket, SourceConnection::Microphone { stream })
    }

    /// Connects desktop audio through a display capture. A stream without
    /// audio tracks is released on the spot and rejected.
    pub async fn connect_system_audio(&self) -> Result<()> {
        let ticket = self.begin(SourceKind::SystemAudio)?;
        let mut stream = match self.platform.request_display_capture().await {
            Ok(stream) => stream,
            Err(err) => return Err(self.abandon(ticket, err)),
        };

        if !stream.has_audio() {
            tracing::warn!(
                video_tracks = stream.video_track_count(),
                "display capture carried no audio; releasing it"
            );
            stream.stop_all();
            return Err(self.abandon(ticket, VisualizerError::NoAudioTrack));
        }

        self.commit(ticket, SourceConnection::SystemAudio { stream })
    }

    /// Opens `file`, routes it through the analyser to the speakers and
    /// starts playback.
    pub async fn connect_file(&self, file: FileRef) -> Result<()> {
        let ticket = self.begin(SourceKind::File)?;
        let name = file.name();
        let element = match self.platform.open_file(file).await {
            Ok(element) => element,
            Err(err) => return Err(self.abandon(ticket, err)),
        };
        tracing::debug!(file = %name, "file opened");
        self.commit(ticket, SourceConnection::File { element })
    }

    /// Pauses or resumes file playback and returns the new playing flag.
    ///
    /// Live sources have nothing to pause and are rejected without touching
    /// the state.
    pub fn toggle_play_pause(&self) -> Result<bool> {
        let mut slot = self.slot.borrow_mut();
        let Slot {
            active, playback, ..
        } = &mut *slot;

        match active.as_mut().map(|active| &mut active.connection) {
            None => Err(VisualizerError::NotConnected),
            Some(SourceConnection::File { element }) => {
                if playback.is_playing {
                    element.pause();
                    playback.is_playing = false;
                } else {
                    element.play()?;
                    playback.is_playing = true;
                }
                tracing::debug!(playing = playback.is_playing, "file playback toggled");
                Ok(playback.is_playing)
            }
            Some(connection) => {
                let kind = connection.kind();
                tracing::debug!(%kind, "ignoring pause request for live input");
                Err(VisualizerError::PauseUnsupported(kind))
            }
        }
    }

    /// Forwards the output volume to the playback element, if one is active.
    pub fn set_volume(&self, volume: f32) -> bool {
        let volume = volume.clamp(0.0, 1.0);
        let mut slot = self.slot.borrow_mut();
        match slot.active.as_mut().map(|active| &mut active.connection) {
            Some(SourceConnection::File { element }) => {
                element.set_volume(volume);
                true
            }
            _ => false,
        }
    }

    /// Releases the active source and returns to idle. In-flight connects
    /// are invalidated.
    pub fn stop(&self) {
        self.advance_generation();
        self.slot.borrow_mut().pending = None;
        let released = self.teardown();
        self.slot.borrow_mut().playback.is_playing = false;
        if let Some(kind) = released {
            tracing::info!(%kind, "source stopped");
        }
    }

    /// Ends the session: stops the source and closes the analysis context.
    pub fn shutdown(&self) {
        self.stop();
        self.analyzer.borrow_mut().close();
    }

    /// Applies queued observer notifications and returns how many changed
    /// the state. Called between frames.
    pub fn process_events(&self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if self.apply(event) {
                applied += 1;
            }
        }
        applied
    }

    fn apply(&self, event: SourceEvent) -> bool {
        let current = self
            .slot
            .borrow()
            .active
            .as_ref()
            .map(|active| active.generation);
        if current != Some(event.generation()) {
            tracing::debug!(?event, "ignoring event from a released source");
            return false;
        }

        match event {
            SourceEvent::CaptureEnded { .. } => {
                let ended = self.teardown();
                self.slot.borrow_mut().playback = PlaybackState {
                    source_kind: self.fallback,
                    is_playing: false,
                };
                tracing::info!(
                    ended = ?ended,
                    fallback = %self.fallback,
                    "capture ended; source released"
                );
            }
            SourceEvent::PlaybackEnded { .. } => {
                self.slot.borrow_mut().playback.is_playing = false;
                tracing::info!("file playback finished");
            }
        }
        true
    }

    fn advance_generation(&self) -> u64 {
        let next = self.generation.get() + 1;
        self.generation.set(next);
        next
    }

    fn begin(&self, kind: SourceKind) -> Result<Ticket> {
        {
            let mut analyzer = self.analyzer.borrow_mut();
            analyzer.initialize();
            if analyzer.bin_count() == 0 {
                tracing::warn!(%kind, "connect refused: analysis context unavailable");
                return Err(VisualizerError::AnalyzerUnavailable);
            }
        }

        let generation = self.advance_generation();
        self.slot.borrow_mut().pending = Some((generation, kind));
        tracing::debug!(%kind, generation, "connect requested");
        Ok(Ticket { generation, kind })
    }

    fn settle(&self, ticket: Ticket) {
        let mut slot = self.slot.borrow_mut();
        if matches!(slot.pending, Some((generation, _)) if generation == ticket.generation) {
            slot.pending = None;
        }
    }

    fn abandon(&self, ticket: Ticket, err: VisualizerError) -> VisualizerError {
        self.settle(ticket);
        tracing::warn!(kind = %ticket.kind, %err, "connect failed; keeping current source");
        err
    }

    fn commit(&self, ticket: Ticket, mut connection: SourceConnection) -> Result<()> {
        self.settle(ticket);
        if ticket.generation != self.generation.get() {
            tracing::info!(kind = %ticket.kind, "connect superseded; releasing acquired source");
            connection.release();
            return Err(VisualizerError::Superseded);
        }

        self.teardown();

        if let Err(err) = self.analyzer.borrow_mut().attach(&mut connection) {
            connection.release();
            self.slot.borrow_mut().playback.is_playing = false;
            return Err(err);
        }

        let is_playing = match &mut connection {
            SourceConnection::Microphone { stream } | SourceConnection::SystemAudio { stream } => {
                let observer = self.observer(SourceEvent::CaptureEnded {
                    generation: ticket.generation,
                });
                if !stream.observe_end(observer) {
                    tracing::debug!("capture stream has no track to watch");
                }
                true
            }
            SourceConnection::File { element } => {
                element.set_monitoring(true);
                element.on_ended(self.observer(SourceEvent::PlaybackEnded {
                    generation: ticket.generation,
                }));
                match element.play() {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!(%err, "file attached but playback did not start");
                        false
                    }
                }
            }
        };

        let mut slot = self.slot.borrow_mut();
        slot.playback = PlaybackState {
            source_kind: ticket.kind,
            is_playing,
        };
        slot.active = Some(ActiveSource {
            generation: ticket.generation,
            connection,
        });
        tracing::info!(kind = %ticket.kind, label = ticket.kind.label(), is_playing, "source connected");
        Ok(())
    }

    fn observer(&self, event: SourceEvent) -> EndedObserver {
        let events = self.events_tx.clone();
        Box::new(move || {
            let _ = events.send(event);
        })
    }

    /// Detaches and releases the active source, if any.
    fn teardown(&self) -> Option<SourceKind> {
        let active = self.slot.borrow_mut().active.take();
        let mut active = active?;
        let kind = active.connection.kind();
        self.analyzer.borrow_mut().detach(&mut active.connection);
        active.connection.release();
        tracing::debug!(%kind, "source released");
        Some(kind)
    }
}

impl<P: AudioPlatform> FrameSource for SourceController<P> {
    fn poll(&self) {
        self.process_events();
    }

    fn playback(&self) -> PlaybackState {
        self.state()
    }

    fn frame(&self) -> FrequencyFrame {
        self.sample()
    }
}

impl<P: AudioPlatform> fmt::Debug for SourceController<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceController")
            .field("phase", &self.phase())
            .field("state", &self.state())
            .field("generation", &self.generation.get())
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl<P: AudioPlatform> Drop for SourceController<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
