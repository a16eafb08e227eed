//! Spectral analysis of whatever source is currently attached.
//!
//! [`SpectralAnalyzer`] owns the session-wide [`AnalysisContext`] and its single
//! [`AnalysisNode`]. The context is created lazily by [`SpectralAnalyzer::initialize`],
//! resumed when suspended and only torn down by [`SpectralAnalyzer::close`].

mod input;

use std::{f32::consts::PI, fmt, ops::Deref, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{audio::SourceConnection, config::AnalysisConfig, Result, VisualizerError};

pub use input::SampleSink;
use input::SharedInput;

const BLACKMAN_ALPHA: f32 = 0.16;

/// Magnitude spectrum snapshot on a 0-255 scale, lowest frequency first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyFrame {
    bins: Vec<u8>,
}

impl FrequencyFrame {
    pub fn new(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    /// A frame with no bins, produced before the node exists.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bins
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bins
    }
}

impl Deref for FrequencyFrame {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bins
    }
}

impl From<Vec<u8>> for FrequencyFrame {
    fn from(bins: Vec<u8>) -> Self {
        Self::new(bins)
    }
}

/// Processing state of the analysis context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

/// Session-wide processing graph: a sample rate, a state and one node.
#[derive(Debug)]
pub struct AnalysisContext {
    sample_rate: u32,
    state: ContextState,
    node: AnalysisNode,
}

impl AnalysisContext {
    fn new(config: &AnalysisConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            state: ContextState::Running,
            node: AnalysisNode::new(config),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn node(&self) -> &AnalysisNode {
        &self.node
    }
}

/// Frequency-analysis node fed by the attached source.
pub struct AnalysisNode {
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    input: SharedInput,
    plan: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    time_domain: Vec<f32>,
    fft_input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    smoothed: Vec<f32>,
}

impl AnalysisNode {
    fn new(config: &AnalysisConfig) -> Self {
        let fft_size = config.fft_size;
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let fft_input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();

        tracing::debug!(
            fft_size,
            bins = fft_size / 2,
            smoothing = config.smoothing,
            "created analysis node"
        );

        Self {
            fft_size,
            smoothing: config.smoothing,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            input: SharedInput::new(fft_size),
            plan,
            window: (0..fft_size).map(|i| blackman_value(i, fft_size)).collect(),
            time_domain: vec![0.0; fft_size],
            fft_input,
            spectrum,
            scratch,
            smoothed: vec![0.0; fft_size / 2],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Output length of every frame: half the transform size.
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Returns true while a source port is open on the node input.
    pub fn has_input(&self) -> bool {
        self.input.is_open()
    }

    fn frequency_frame(&mut self) -> Result<FrequencyFrame> {
        self.input.snapshot(&mut self.time_domain);
        for ((slot, sample), weight) in self
            .fft_input
            .iter_mut()
            .zip(&self.time_domain)
            .zip(&self.window)
        {
            *slot = sample * weight;
        }

        self.plan
            .process_with_scratch(&mut self.fft_input, &mut self.spectrum, &mut self.scratch)?;

        let magnitude_scale = 1.0 / self.fft_size as f32;
        let range_scale = 255.0 / (self.max_decibels - self.min_decibels);
        let mut bins = Vec::with_capacity(self.smoothed.len());

        for (smoothed, bin) in self.smoothed.iter_mut().zip(&self.spectrum) {
            let magnitude = bin.norm() * magnitude_scale;
            let blended = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;
            *smoothed = if blended.is_finite() { blended } else { 0.0 };

            let value = if *smoothed > 0.0 {
                let db = 20.0 * smoothed.log10();
                (range_scale * (db - self.min_decibels)).clamp(0.0, 255.0) as u8
            } else {
                0
            };
            bins.push(value);
        }

        Ok(FrequencyFrame::new(bins))
    }
}

impl fmt::Debug for AnalysisNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisNode")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .field("has_input", &self.input.is_open())
            .finish()
    }
}

/// Owner of the analysis graph and provider of frequency snapshots.
#[derive(Debug)]
pub struct SpectralAnalyzer {
    config: AnalysisConfig,
    context: Option<AnalysisContext>,
}

impl SpectralAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            context: None,
        }
    }

    /// Creates the context on first use and resumes it when suspended.
    ///
    /// Never recreates a context, including one that was closed. An invalid
    /// configuration leaves the analyzer without a context; later attaches
    /// then fail with [`VisualizerError::AnalyzerUnavailable`].
    pub fn initialize(&mut self) {
        match self.context.as_mut() {
            None => {
                if let Err(err) = self.config.validate() {
                    tracing::warn!(%err, "analysis context not created");
                    return;
                }
                tracing::info!(
                    sample_rate = self.config.sample_rate,
                    fft_size = self.config.fft_size,
                    "analysis context created"
                );
                self.context = Some(AnalysisContext::new(&self.config));
            }
            Some(context) => match context.state {
                ContextState::Suspended => {
                    context.state = ContextState::Running;
                    context.node.input.set_accepting(true);
                    tracing::debug!("analysis context resumed");
                }
                ContextState::Running => {}
                ContextState::Closed => {
                    tracing::warn!("analysis context is closed for this session");
                }
            },
        }
    }

    /// Pauses processing; pushed samples are ignored until resumed.
    pub fn suspend(&mut self) {
        if let Some(context) = self.context.as_mut() {
            if context.state == ContextState::Running {
                context.state = ContextState::Suspended;
                context.node.input.set_accepting(false);
                tracing::debug!("analysis context suspended");
            }
        }
    }

    /// Ends the session: closes the node input and the context for good.
    pub fn close(&mut self) {
        if let Some(context) = self.context.as_mut() {
            if context.state != ContextState::Closed {
                context.node.input.close();
                context.state = ContextState::Closed;
                tracing::info!("analysis context closed");
            }
        }
    }

    pub fn state(&self) -> Option<ContextState> {
        self.context.as_ref().map(AnalysisContext::state)
    }

    pub fn context(&self) -> Option<&AnalysisContext> {
        self.context.as_ref()
    }

    /// Bin count of produced frames, zero before initialization.
    pub fn bin_count(&self) -> usize {
        match &self.context {
            Some(context) if context.state != ContextState::Closed => context.node.bin_count(),
            _ => 0,
        }
    }

    /// Returns the current magnitude spectrum.
    ///
    /// Yields an empty frame when no node exists or the context is closed.
    pub fn sample(&mut self) -> FrequencyFrame {
        let Some(context) = self.context.as_mut() else {
            return FrequencyFrame::empty();
        };
        if context.state == ContextState::Closed {
            return FrequencyFrame::empty();
        }

        match context.node.frequency_frame() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(%err, "frequency analysis failed");
                FrequencyFrame::empty()
            }
        }
    }

    /// Routes a source's output into the node input.
    ///
    /// Opening the port invalidates whatever was attached before; callers are
    /// expected to detach the previous source first.
    pub fn attach(&mut self, connection: &mut SourceConnection) -> Result<()> {
        let context = self
            .context
            .as_mut()
            .filter(|context| context.state != ContextState::Closed)
            .ok_or(VisualizerError::AnalyzerUnavailable)?;

        if context.node.has_input() {
            tracing::warn!("attaching over a live input; previous source was not detached");
        }

        let sink = context.node.input.open();
        connection.route(Some(sink));
        tracing::debug!(kind = %connection.kind(), "source attached to analysis node");
        Ok(())
    }

    /// Disconnects a source and silences the node input.
    pub fn detach(&mut self, connection: &mut SourceConnection) {
        connection.route(None);
        if let Some(context) = self.context.as_mut() {
            context.node.input.close();
        }
        tracing::debug!(kind = %connection.kind(), "source detached from analysis node");
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    let a0 = 0.5 * (1.0 - BLACKMAN_ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * BLACKMAN_ALPHA;
    let x = index as f32 / len as f32;

    a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::FakeTrack;
    use crate::audio::{MediaStream, SourceConnection, TrackKind};

    fn analyzer(fft_size: usize) -> SpectralAnalyzer {
        SpectralAnalyzer::new(AnalysisConfig {
            fft_size,
            ..Default::default()
        })
    }

    fn microphone() -> (SourceConnection, crate::audio::testing::TrackProbe) {
        let (track, probe) = FakeTrack::new(TrackKind::Audio);
        let stream = MediaStream::new(vec![Box::new(track)]);
        (SourceConnection::Microphone { stream }, probe)
    }

    #[test]
    fn frame_is_empty_before_initialization() {
        let mut analyzer = analyzer(2048);
        assert!(analyzer.sample().is_empty());
        assert_eq!(analyzer.bin_count(), 0);
        assert_eq!(analyzer.state(), None);
    }

    #[test]
    fn frame_length_is_half_the_transform_size() {
        for fft_size in [32, 256, 1024, 2048, 4096, 32_768] {
            let mut analyzer = analyzer(fft_size);
            analyzer.initialize();
            assert_eq!(analyzer.sample().len(), fft_size / 2);
            assert_eq!(analyzer.bin_count(), fft_size / 2);
        }
    }

    #[test]
    fn initialize_is_idempotent_and_resumes() {
        let mut analyzer = analyzer(256);
        analyzer.initialize();
        analyzer.initialize();
        assert_eq!(analyzer.state(), Some(ContextState::Running));

        analyzer.suspend();
        assert_eq!(analyzer.state(), Some(ContextState::Suspended));
        analyzer.initialize();
        assert_eq!(analyzer.state(), Some(ContextState::Running));
    }

    #[test]
    fn closed_context_is_never_recreated() {
        let mut analyzer = analyzer(256);
        analyzer.initialize();
        analyzer.close();
        analyzer.initialize();

        assert_eq!(analyzer.state(), Some(ContextState::Closed));
        assert!(analyzer.sample().is_empty());
    }

    #[test]
    fn invalid_configuration_leaves_no_context() {
        let mut analyzer = analyzer(1000);
        analyzer.initialize();
        assert_eq!(analyzer.state(), None);

        let (mut connection, _) = microphone();
        assert!(matches!(
            analyzer.attach(&mut connection),
            Err(VisualizerError::AnalyzerUnavailable)
        ));
    }

    #[test]
    fn silence_maps_to_zero_bins() {
        let mut analyzer = analyzer(512);
        analyzer.initialize();
        assert!(analyzer.sample().iter().all(|&bin| bin == 0));
    }

    #[test]
    fn attached_tone_peaks_at_its_bin() {
        let fft_size = 1024;
        let mut analyzer = analyzer(fft_size);
        analyzer.initialize();

        let (mut connection, probe) = microphone();
        analyzer.attach(&mut connection).unwrap();
        let sink = probe.sink().expect("attach routes the track");

        let bin = 64;
        let tone: Vec<f32> = (0..fft_size)
            .map(|i| 0.01 * (2.0 * PI * bin as f32 * i as f32 / fft_size as f32).sin())
            .collect();
        sink.push_interleaved(&tone, 1);

        let frame = analyzer.sample();
        let (peak, _) = frame
            .iter()
            .enumerate()
            .max_by_key(|(_, value)| **value)
            .unwrap();
        assert_eq!(peak, bin);
        assert!(frame[bin] > 0);
    }

    #[test]
    fn detach_drops_stale_audio() {
        let fft_size = 256;
        let mut analyzer = analyzer(fft_size);
        analyzer.initialize();

        let (mut connection, probe) = microphone();
        analyzer.attach(&mut connection).unwrap();
        let sink = probe.sink().unwrap();
        analyzer.detach(&mut connection);

        assert!(probe.sink().is_none());
        assert!(!sink.push_interleaved(&vec![1.0; fft_size], 1));
        let frame = analyzer.sample();
        assert!(frame.iter().all(|&bin| bin == 0));
    }

    #[test]
    fn suspended_context_ignores_input() {
        let fft_size = 256;
        let mut analyzer = analyzer(fft_size);
        analyzer.initialize();
        let (mut connection, probe) = microphone();
        analyzer.attach(&mut connection).unwrap();

        analyzer.suspend();
        probe.sink().unwrap().push_interleaved(&vec![1.0; fft_size], 1);
        assert!(analyzer.sample().iter().all(|&bin| bin == 0));
    }

    #[test]
    fn blackman_window_is_zero_at_the_edge() {
        assert!(blackman_value(0, 64).abs() < 1e-6);
        assert!((blackman_value(32, 64) - 1.0).abs() < 1e-6);
    }
}
