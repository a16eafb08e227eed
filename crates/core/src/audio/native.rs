//! Desktop backend: cpal for capture, rodio for file playback.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use futures::future::{FutureExt, LocalBoxFuture};
use parking_lot::Mutex;
use rodio::{Decoder, OutputStream, Sink, Source};

use super::{
    AudioPlatform, EndedObserver, FileRef, MediaStream, MediaTrack, PlaybackElement, TrackKind,
};
use crate::{analysis::SampleSink, Result, VisualizerError};

/// Substrings that mark an input device as a capture of the system output.
const LOOPBACK_HINTS: [&str; 3] = ["monitor", "loopback", "stereo mix"];

/// Samples buffered by the playback tap before they are pushed to the analyser.
const TAP_CHUNK: usize = 512;

fn device_error(err: impl fmt::Display) -> VisualizerError {
    VisualizerError::Device(err.to_string())
}

/// [`AudioPlatform`] backed by the default cpal host.
pub struct NativePlatform {
    host: cpal::Host,
}

impl NativePlatform {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    fn open_microphone(&self) -> Result<MediaStream> {
        let device = self
            .host
            .default_input_device()
            .ok_or_else(|| VisualizerError::Device("no input device available".to_string()))?;
        let track = CaptureTrack::open(&device, CaptureConfig::Input)?;
        Ok(MediaStream::new(vec![Box::new(track)]))
    }

    fn open_loopback(&self) -> Result<MediaStream> {
        match self.find_loopback()? {
            Some((device, config)) => {
                let track = CaptureTrack::open(&device, config)?;
                Ok(MediaStream::new(vec![Box::new(track)]))
            }
            None => {
                tracing::warn!(host = ?self.host.id(), "no loopback or monitor device found");
                Ok(MediaStream::default())
            }
        }
    }

    #[cfg(target_os = "windows")]
    fn find_loopback(&self) -> Result<Option<(cpal::Device, CaptureConfig)>> {
        // WASAPI captures the mix when an input stream is built on an output device.
        Ok(self
            .host
            .default_output_device()
            .map(|device| (device, CaptureConfig::OutputLoopback)))
    }

    #[cfg(not(target_os = "windows"))]
    fn find_loopback(&self) -> Result<Option<(cpal::Device, CaptureConfig)>> {
        let devices = self.host.input_devices().map_err(device_error)?;
        Ok(devices
            .find(|device| {
                device
                    .name()
                    .map(|name| is_loopback_name(&name))
                    .unwrap_or(false)
            })
            .map(|device| (device, CaptureConfig::Input)))
    }
}

impl Default for NativePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NativePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativePlatform")
            .field("host", &self.host.id())
            .finish()
    }
}

impl AudioPlatform for NativePlatform {
    fn request_microphone(&self) -> LocalBoxFuture<'_, Result<MediaStream>> {
        async move { self.open_microphone() }.boxed_local()
    }

    fn request_display_capture(&self) -> LocalBoxFuture<'_, Result<MediaStream>> {
        async move { self.open_loopback() }.boxed_local()
    }

    fn open_file(&self, file: FileRef) -> LocalBoxFuture<'_, Result<Box<dyn PlaybackElement>>> {
        async move {
            let element = FileElement::open(file.path())?;
            Ok(Box::new(element) as Box<dyn PlaybackElement>)
        }
        .boxed_local()
    }
}

fn is_loopback_name(name: &str) -> bool {
    let name = name.to_lowercase();
    LOOPBACK_HINTS.iter().any(|hint| name.contains(hint))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureConfig {
    Input,
    #[cfg_attr(not(target_os = "windows"), allow(dead_code))]
    OutputLoopback,
}

#[derive(Default)]
struct CaptureShared {
    sink: Mutex<Option<SampleSink>>,
    observer: Mutex<Option<EndedObserver>>,
    stopped: AtomicBool,
}

/// A running cpal input stream exposed as an audio track.
pub struct CaptureTrack {
    label: String,
    stream: Option<cpal::Stream>,
    shared: Arc<CaptureShared>,
}

impl CaptureTrack {
    fn open(device: &cpal::Device, config: CaptureConfig) -> Result<Self> {
        let label = device.name().unwrap_or_else(|_| "unknown device".to_string());
        let supported = match config {
            CaptureConfig::Input => device.default_input_config(),
            CaptureConfig::OutputLoopback => device.default_output_config(),
        }
        .map_err(device_error)?;

        let format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.into();
        let shared = Arc::new(CaptureShared::default());

        let stream = match format {
            cpal::SampleFormat::F32 => build_capture::<f32>(device, &stream_config, &shared),
            cpal::SampleFormat::I16 => build_capture::<i16>(device, &stream_config, &shared),
            cpal::SampleFormat::U16 => build_capture::<u16>(device, &stream_config, &shared),
            other => Err(VisualizerError::Device(format!(
                "unsupported sample format {other:?}"
            ))),
        }?;
        stream.play().map_err(device_error)?;

        tracing::info!(
            device = %label,
            sample_rate = stream_config.sample_rate.0,
            channels = stream_config.channels,
            ?format,
            "capture stream started"
        );

        Ok(Self {
            label,
            stream: Some(stream),
            shared,
        })
    }
}

fn build_capture<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: &Arc<CaptureShared>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let data_shared = Arc::clone(shared);
    let error_shared = Arc::clone(shared);
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let sink = data_shared.sink.lock().clone();
                if let Some(sink) = sink {
                    scratch.clear();
                    scratch.extend(data.iter().map(|sample| sample.to_sample::<f32>()));
                    sink.push_interleaved(&scratch, channels);
                }
            },
            move |err| {
                tracing::warn!(%err, "capture stream error");
                if matches!(err, cpal::StreamError::DeviceNotAvailable)
                    && !error_shared.stopped.load(Ordering::Acquire)
                {
                    if let Some(observer) = error_shared.observer.lock().as_ref() {
                        observer();
                    }
                }
            },
            None,
        )
        .map_err(device_error)
}

impl fmt::Debug for CaptureTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureTrack")
            .field("label", &self.label)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl MediaTrack for CaptureTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn route(&mut self, sink: Option<SampleSink>) {
        *self.shared.sink.lock() = sink;
    }

    fn on_ended(&mut self, observer: EndedObserver) {
        *self.shared.observer.lock() = Some(observer);
    }

    fn stop(&mut self) {
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.sink.lock().take();
        if self.stream.take().is_some() {
            tracing::debug!(device = %self.label, "capture stream stopped");
        }
    }

    fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }
}

impl Drop for CaptureTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

struct TapShared {
    sink: Mutex<Option<SampleSink>>,
    observer: Mutex<Option<EndedObserver>>,
    monitoring: AtomicBool,
}

/// Passes decoded audio through while copying it to the analyser input.
struct AnalyserTap<S> {
    inner: S,
    channels: u16,
    sample_rate: u32,
    shared: Arc<TapShared>,
    chunk: Vec<f32>,
    finished: bool,
}

impl<S> AnalyserTap<S>
where
    S: Source<Item = f32>,
{
    fn new(inner: S, shared: Arc<TapShared>) -> Self {
        let channels = inner.channels();
        let sample_rate = inner.sample_rate();
        Self {
            inner,
            channels,
            sample_rate,
            shared,
            chunk: Vec::with_capacity(TAP_CHUNK),
            finished: false,
        }
    }

    fn flush(&mut self) {
        if self.chunk.is_empty() {
            return;
        }
        let sink = self.shared.sink.lock().clone();
        if let Some(sink) = sink {
            sink.push_interleaved(&self.chunk, self.channels as usize);
        }
        self.chunk.clear();
    }
}

impl<S> Iterator for AnalyserTap<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        match self.inner.next() {
            Some(sample) => {
                self.chunk.push(sample);
                if self.chunk.len() >= TAP_CHUNK {
                    self.flush();
                }
                if self.shared.monitoring.load(Ordering::Relaxed) {
                    Some(sample)
                } else {
                    Some(0.0)
                }
            }
            None => {
                self.flush();
                if !self.finished {
                    self.finished = true;
                    if let Some(observer) = self.shared.observer.lock().as_ref() {
                        observer();
                    }
                }
                None
            }
        }
    }
}

impl<S> Source for AnalyserTap<S>
where
    S: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}

/// Decoded local file played through the default output device.
pub struct FileElement {
    path: PathBuf,
    _stream: OutputStream,
    sink: Sink,
    shared: Arc<TapShared>,
    loaded: bool,
}

impl FileElement {
    /// Opens the output device and decodes the file head; playback starts
    /// paused.
    pub fn open(path: &Path) -> Result<Self> {
        let (stream, handle) = OutputStream::try_default().map_err(device_error)?;
        let sink = Sink::try_new(&handle).map_err(device_error)?;
        sink.pause();

        let mut element = Self {
            path: path.to_path_buf(),
            _stream: stream,
            sink,
            shared: Arc::new(TapShared {
                sink: Mutex::new(None),
                observer: Mutex::new(None),
                monitoring: AtomicBool::new(false),
            }),
            loaded: false,
        };
        element.load()?;
        Ok(element)
    }

    fn load(&mut self) -> Result<()> {
        let file = File::open(&self.path)?;
        let decoder = Decoder::new(BufReader::new(file)).map_err(|err| {
            VisualizerError::Decode(format!("{}: {err}", self.path.display()))
        })?;
        tracing::debug!(
            path = %self.path.display(),
            sample_rate = decoder.sample_rate(),
            channels = decoder.channels(),
            "file decoded"
        );

        self.sink.append(AnalyserTap::new(
            decoder.convert_samples::<f32>(),
            Arc::clone(&self.shared),
        ));
        self.loaded = true;
        Ok(())
    }
}

impl fmt::Debug for FileElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileElement")
            .field("path", &self.path)
            .field("loaded", &self.loaded)
            .field("paused", &self.sink.is_paused())
            .finish()
    }
}

impl PlaybackElement for FileElement {
    fn play(&mut self) -> Result<()> {
        if !self.loaded || self.sink.empty() {
            self.sink.clear();
            self.load()?;
        }
        self.sink.play();
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn clear_source(&mut self) {
        self.sink.clear();
        self.loaded = false;
    }

    fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(volume);
    }

    fn set_monitoring(&mut self, audible: bool) {
        self.shared.monitoring.store(audible, Ordering::Relaxed);
    }

    fn route(&mut self, sink: Option<SampleSink>) {
        *self.shared.sink.lock() = sink;
    }

    fn on_ended(&mut self, observer: EndedObserver) {
        *self.shared.observer.lock() = Some(observer);
    }
}
