use std::fmt;

use futures::future::LocalBoxFuture;

use super::{FileRef, TrackKind};
use crate::{analysis::SampleSink, Result};

/// Callback fired when a track or playback element ends on its own.
///
/// May be invoked from a platform audio thread. A replayed file fires it again
/// at its next end.
pub type EndedObserver = Box<dyn Fn() + Send>;

/// Capture and playback services provided by the host.
///
/// Every request is a suspension point: permission prompts and file decoding
/// resolve asynchronously on the caller's executor.
pub trait AudioPlatform {
    /// Requests an audio-only capture stream from the default input.
    fn request_microphone(&self) -> LocalBoxFuture<'_, Result<MediaStream>>;

    /// Requests a display capture stream which may or may not carry audio.
    fn request_display_capture(&self) -> LocalBoxFuture<'_, Result<MediaStream>>;

    /// Opens and decodes a local file into a paused playback element.
    fn open_file(&self, file: FileRef) -> LocalBoxFuture<'_, Result<Box<dyn PlaybackElement>>>;
}

/// A single track of a capture stream.
pub trait MediaTrack: fmt::Debug {
    fn kind(&self) -> TrackKind;

    fn label(&self) -> &str;

    /// Sends captured samples to `sink`; `None` disconnects. Video tracks
    /// ignore routing.
    fn route(&mut self, sink: Option<SampleSink>);

    /// Registers the observer fired when the track ends outside our control,
    /// e.g. the user stops sharing or the device disappears. Stopping the
    /// track ourselves does not fire it.
    fn on_ended(&mut self, observer: EndedObserver);

    /// Stops capturing and releases the underlying device.
    fn stop(&mut self);

    fn is_stopped(&self) -> bool;
}

/// Playable element wrapping a decoded file.
pub trait PlaybackElement: fmt::Debug {
    /// Starts or resumes playback; after the end it restarts from the top.
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    /// Drops the decoded source so no further buffering happens.
    fn clear_source(&mut self);

    /// Output volume in `0.0..=1.0`, owned by the caller's volume control.
    fn set_volume(&mut self, volume: f32);

    /// Connects the analysed signal onward to the audio output.
    fn set_monitoring(&mut self, audible: bool);

    fn route(&mut self, sink: Option<SampleSink>);

    /// Registers the observer fired when playback reaches the end.
    fn on_ended(&mut self, observer: EndedObserver);
}

/// A set of capture tracks granted together.
#[derive(Debug, Default)]
pub struct MediaStream {
    tracks: Vec<Box<dyn MediaTrack>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Box<dyn MediaTrack>>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Box<dyn MediaTrack>] {
        &self.tracks
    }

    pub fn audio_track_count(&self) -> usize {
        self.count(TrackKind::Audio)
    }

    pub fn video_track_count(&self) -> usize {
        self.count(TrackKind::Video)
    }

    pub fn has_audio(&self) -> bool {
        self.audio_track_count() > 0
    }

    pub(crate) fn route_audio(&mut self, sink: Option<SampleSink>) {
        for track in self
            .tracks
            .iter_mut()
            .filter(|track| track.kind() == TrackKind::Audio)
        {
            track.route(sink.clone());
        }
    }

    /// Watches the track whose end means the capture is over: the first
    /// video track if there is one, else the first audio track.
    ///
    /// Returns false when the stream has no tracks at all.
    pub(crate) fn observe_end(&mut self, observer: EndedObserver) -> bool {
        let index = self
            .tracks
            .iter()
            .position(|track| track.kind() == TrackKind::Video)
            .or_else(|| {
                self.tracks
                    .iter()
                    .position(|track| track.kind() == TrackKind::Audio)
            });

        match index {
            Some(index) => {
                let track = &mut self.tracks[index];
                tracing::debug!(label = track.label(), kind = ?track.kind(), "watching track for end of capture");
                track.on_ended(observer);
                true
            }
            None => false,
        }
    }

    /// Stops every track on the stream.
    pub fn stop_all(&mut self) {
        for track in &mut self.tracks {
            if !track.is_stopped() {
                track.route(None);
                track.stop();
            }
        }
    }

    /// True once every track has been stopped.
    pub fn is_released(&self) -> bool {
        self.tracks.iter().all(|track| track.is_stopped())
    }

    fn count(&self, kind: TrackKind) -> usize {
        self.tracks
            .iter()
            .filter(|track| track.kind() == kind)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::FakeTrack;
    use super::*;

    #[test]
    fn counts_tracks_by_kind() {
        let (audio, _) = FakeTrack::new(TrackKind::Audio);
        let (video, _) = FakeTrack::new(TrackKind::Video);
        let stream = MediaStream::new(vec![Box::new(video), Box::new(audio)]);

        assert_eq!(stream.audio_track_count(), 1);
        assert_eq!(stream.video_track_count(), 1);
        assert!(stream.has_audio());
        assert!(!stream.is_released());
    }

    #[test]
    fn prefers_video_track_for_end_of_capture() {
        let (audio, audio_probe) = FakeTrack::new(TrackKind::Audio);
        let (video, video_probe) = FakeTrack::new(TrackKind::Video);
        let mut stream = MediaStream::new(vec![Box::new(audio), Box::new(video)]);

        assert!(stream.observe_end(Box::new(|| {})));
        assert!(video_probe.has_observer());
        assert!(!audio_probe.has_observer());
    }

    #[test]
    fn falls_back_to_audio_track_for_end_of_capture() {
        let (audio, audio_probe) = FakeTrack::new(TrackKind::Audio);
        let mut stream = MediaStream::new(vec![Box::new(audio)]);

        assert!(stream.observe_end(Box::new(|| {})));
        assert!(audio_probe.has_observer());
    }

    #[test]
    fn empty_stream_has_nothing_to_observe() {
        let mut stream = MediaStream::default();
        assert!(!stream.observe_end(Box::new(|| {})));
        assert!(stream.is_released());
    }
}
