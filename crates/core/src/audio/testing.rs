//! In-memory platform used by the unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture};
use parking_lot::Mutex;

use super::{
    AudioPlatform, EndedObserver, FileRef, MediaStream, MediaTrack, PlaybackElement, SourceKind,
    TrackKind,
};
use crate::{analysis::SampleSink, Result, VisualizerError};

#[derive(Default)]
struct TrackShared {
    stopped: AtomicBool,
    sink: Mutex<Option<SampleSink>>,
    observer: Mutex<Option<EndedObserver>>,
}

/// Test-side view of a [`FakeTrack`].
#[derive(Clone)]
pub(crate) struct TrackProbe {
    shared: Arc<TrackShared>,
}

impl TrackProbe {
    pub(crate) fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn sink(&self) -> Option<SampleSink> {
        self.shared.sink.lock().clone()
    }

    pub(crate) fn has_observer(&self) -> bool {
        self.shared.observer.lock().is_some()
    }

    /// Simulates the platform ending the track, e.g. the user stops sharing.
    pub(crate) fn end(&self) {
        let observer = self.shared.observer.lock().take();
        if let Some(observer) = observer {
            observer();
        }
    }
}

pub(crate) struct FakeTrack {
    kind: TrackKind,
    label: String,
    shared: Arc<TrackShared>,
}

impl FakeTrack {
    pub(crate) fn new(kind: TrackKind) -> (Self, TrackProbe) {
        let shared = Arc::new(TrackShared::default());
        let track = Self {
            kind,
            label: format!("fake {kind:?} track"),
            shared: Arc::clone(&shared),
        };
        (track, TrackProbe { shared })
    }
}

impl fmt::Debug for FakeTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeTrack")
            .field("kind", &self.kind)
            .field("stopped", &self.shared.stopped.load(Ordering::Acquire))
            .finish()
    }
}

impl MediaTrack for FakeTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn route(&mut self, sink: Option<SampleSink>) {
        if self.kind == TrackKind::Audio {
            *self.shared.sink.lock() = sink;
        }
    }

    fn on_ended(&mut self, observer: EndedObserver) {
        *self.shared.observer.lock() = Some(observer);
    }

    fn stop(&mut self) {
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.sink.lock().take();
    }

    fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }
}

/// Microphone stream with a single audio track.
pub(crate) fn microphone_stream() -> (MediaStream, TrackProbe) {
    let (track, probe) = FakeTrack::new(TrackKind::Audio);
    (MediaStream::new(vec![Box::new(track)]), probe)
}

/// Display capture stream with an optional video track and `audio` audio tracks.
pub(crate) fn display_stream(video: bool, audio: usize) -> (MediaStream, Vec<TrackProbe>) {
    let mut tracks: Vec<Box<dyn MediaTrack>> = Vec::new();
    let mut probes = Vec::new();
    if video {
        let (track, probe) = FakeTrack::new(TrackKind::Video);
        tracks.push(Box::new(track));
        probes.push(probe);
    }
    for _ in 0..audio {
        let (track, probe) = FakeTrack::new(TrackKind::Audio);
        tracks.push(Box::new(track));
        probes.push(probe);
    }
    (MediaStream::new(tracks), probes)
}

#[derive(Default)]
struct ElementShared {
    playing: AtomicBool,
    paused: AtomicBool,
    cleared: AtomicBool,
    monitoring: AtomicBool,
    refuse_play: AtomicBool,
    play_calls: AtomicUsize,
    volume: Mutex<f32>,
    sink: Mutex<Option<SampleSink>>,
    observer: Mutex<Option<EndedObserver>>,
}

/// Test-side view of a [`FakeElement`].
#[derive(Clone)]
pub(crate) struct ElementProbe {
    shared: Arc<ElementShared>,
}

impl ElementProbe {
    pub(crate) fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    pub(crate) fn is_cleared(&self) -> bool {
        self.shared.cleared.load(Ordering::Acquire)
    }

    pub(crate) fn is_monitoring(&self) -> bool {
        self.shared.monitoring.load(Ordering::Acquire)
    }

    pub(crate) fn play_calls(&self) -> usize {
        self.shared.play_calls.load(Ordering::Acquire)
    }

    pub(crate) fn volume(&self) -> f32 {
        *self.shared.volume.lock()
    }

    pub(crate) fn sink(&self) -> Option<SampleSink> {
        self.shared.sink.lock().clone()
    }

    pub(crate) fn refuse_play(&self) {
        self.shared.refuse_play.store(true, Ordering::Release);
    }

    /// Simulates playback running off the end of the file.
    pub(crate) fn finish(&self) {
        self.shared.playing.store(false, Ordering::Release);
        if let Some(observer) = self.shared.observer.lock().as_ref() {
            observer();
        }
    }
}

pub(crate) struct FakeElement {
    shared: Arc<ElementShared>,
}

impl FakeElement {
    pub(crate) fn new() -> (Self, ElementProbe) {
        let shared = Arc::new(ElementShared::default());
        *shared.volume.lock() = 1.0;
        (
            Self {
                shared: Arc::clone(&shared),
            },
            ElementProbe { shared },
        )
    }
}

impl fmt::Debug for FakeElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeElement")
            .field("playing", &self.shared.playing.load(Ordering::Acquire))
            .finish()
    }
}

impl PlaybackElement for FakeElement {
    fn play(&mut self) -> Result<()> {
        self.shared.play_calls.fetch_add(1, Ordering::AcqRel);
        if self.shared.refuse_play.load(Ordering::Acquire) {
            return Err(VisualizerError::Decode("unsupported codec".to_string()));
        }
        self.shared.paused.store(false, Ordering::Release);
        self.shared.playing.store(true, Ordering::Release);
        Ok(())
    }

    fn pause(&mut self) {
        self.shared.paused.store(true, Ordering::Release);
        self.shared.playing.store(false, Ordering::Release);
    }

    fn clear_source(&mut self) {
        self.shared.cleared.store(true, Ordering::Release);
    }

    fn set_volume(&mut self, volume: f32) {
        *self.shared.volume.lock() = volume;
    }

    fn set_monitoring(&mut self, audible: bool) {
        self.shared.monitoring.store(audible, Ordering::Release);
    }

    fn route(&mut self, sink: Option<SampleSink>) {
        *self.shared.sink.lock() = sink;
    }

    fn on_ended(&mut self, observer: EndedObserver) {
        *self.shared.observer.lock() = Some(observer);
    }
}

enum Grant<T> {
    Now(Result<T>),
    Later(oneshot::Receiver<Result<T>>),
}

/// Scripted platform: every request pops the next queued answer. An empty
/// queue behaves like a refused permission prompt.
#[derive(Default)]
pub(crate) struct FakePlatform {
    microphone: RefCell<VecDeque<Grant<MediaStream>>>,
    display: RefCell<VecDeque<Grant<MediaStream>>>,
    files: RefCell<VecDeque<Grant<Box<dyn PlaybackElement>>>>,
}

impl FakePlatform {
    pub(crate) fn grant_microphone(&self, stream: MediaStream) {
        self.microphone.borrow_mut().push_back(Grant::Now(Ok(stream)));
    }

    pub(crate) fn defer_microphone(&self) -> oneshot::Sender<Result<MediaStream>> {
        let (tx, rx) = oneshot::channel();
        self.microphone.borrow_mut().push_back(Grant::Later(rx));
        tx
    }

    pub(crate) fn grant_display(&self, stream: MediaStream) {
        self.display.borrow_mut().push_back(Grant::Now(Ok(stream)));
    }

    pub(crate) fn defer_display(&self) -> oneshot::Sender<Result<MediaStream>> {
        let (tx, rx) = oneshot::channel();
        self.display.borrow_mut().push_back(Grant::Later(rx));
        tx
    }

    pub(crate) fn grant_file(&self, element: FakeElement) {
        self.files
            .borrow_mut()
            .push_back(Grant::Now(Ok(Box::new(element))));
    }

    pub(crate) fn fail_file(&self, err: VisualizerError) {
        self.files.borrow_mut().push_back(Grant::Now(Err(err)));
    }

    fn next<T: 'static>(
        queue: &RefCell<VecDeque<Grant<T>>>,
        kind: SourceKind,
    ) -> LocalBoxFuture<'static, Result<T>> {
        match queue.borrow_mut().pop_front() {
            Some(Grant::Now(result)) => future::ready(result).boxed_local(),
            Some(Grant::Later(rx)) => async move {
                rx.await
                    .unwrap_or(Err(VisualizerError::PermissionDenied(kind)))
            }
            .boxed_local(),
            None => future::ready(Err(VisualizerError::PermissionDenied(kind))).boxed_local(),
        }
    }
}

impl AudioPlatform for FakePlatform {
    fn request_microphone(&self) -> LocalBoxFuture<'_, Result<MediaStream>> {
        Self::next(&self.microphone, SourceKind::Microphone)
    }

    fn request_display_capture(&self) -> LocalBoxFuture<'_, Result<MediaStream>> {
        Self::next(&self.display, SourceKind::SystemAudio)
    }

    fn open_file(&self, _file: FileRef) -> LocalBoxFuture<'_, Result<Box<dyn PlaybackElement>>> {
        Self::next(&self.files, SourceKind::File)
    }
}
