//! Input side of the analysis node.
//!
//! Sources never touch the node directly. They receive a [`SampleSink`] bound
//! to one input port; closing the port makes every outstanding sink for it
//! inert, so a released source that keeps pushing from its audio thread cannot
//! leak samples into the next connection.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug)]
pub(crate) struct InputBus {
    samples: VecDeque<f32>,
    capacity: usize,
    port: u64,
    open: bool,
    accepting: bool,
}

impl InputBus {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::from(vec![0.0; capacity]),
            capacity,
            port: 0,
            open: false,
            accepting: true,
        }
    }

    fn push_mono(&mut self, sample: f32) {
        self.samples.pop_front();
        self.samples.push_back(sample);
    }

    fn silence(&mut self) {
        self.samples.clear();
        self.samples.resize(self.capacity, 0.0);
    }
}

/// Shared handle the node keeps on its input bus.
#[derive(Debug, Clone)]
pub(crate) struct SharedInput {
    bus: Arc<Mutex<InputBus>>,
}

impl SharedInput {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            bus: Arc::new(Mutex::new(InputBus::new(capacity))),
        }
    }

    /// Opens a fresh port, invalidating sinks handed out for earlier ones.
    pub(crate) fn open(&self) -> SampleSink {
        let mut bus = self.bus.lock();
        bus.port += 1;
        bus.open = true;
        bus.silence();
        SampleSink {
            bus: Arc::clone(&self.bus),
            port: bus.port,
        }
    }

    /// Closes the current port and drops any buffered audio.
    pub(crate) fn close(&self) {
        let mut bus = self.bus.lock();
        bus.port += 1;
        bus.open = false;
        bus.silence();
    }

    pub(crate) fn set_accepting(&self, accepting: bool) {
        self.bus.lock().accepting = accepting;
    }

    pub(crate) fn is_open(&self) -> bool {
        self.bus.lock().open
    }

    /// Copies the newest samples, oldest first, into `out`.
    pub(crate) fn snapshot(&self, out: &mut [f32]) {
        let bus = self.bus.lock();
        let skip = bus.samples.len().saturating_sub(out.len());
        for (slot, sample) in out.iter_mut().zip(bus.samples.iter().skip(skip)) {
            *slot = *sample;
        }
    }
}

/// Write end of the analysis input, handed to the active source.
///
/// Cheap to clone and safe to use from capture threads.
#[derive(Debug, Clone)]
pub struct SampleSink {
    bus: Arc<Mutex<InputBus>>,
    port: u64,
}

impl SampleSink {
    /// Pushes interleaved samples, averaging channels down to mono.
    ///
    /// Returns false once the port has been closed; the samples are dropped.
    pub fn push_interleaved(&self, samples: &[f32], channels: usize) -> bool {
        let channels = channels.max(1);
        let mut bus = self.bus.lock();
        if !bus.open || bus.port != self.port {
            return false;
        }
        if !bus.accepting {
            return true;
        }

        let scale = 1.0 / channels as f32;
        for frame in samples.chunks(channels) {
            let mono = frame.iter().sum::<f32>() * scale;
            bus.push_mono(mono);
        }
        true
    }

    /// Returns true while the port this sink was issued for is still open.
    pub fn is_connected(&self) -> bool {
        let bus = self.bus.lock();
        bus.open && bus.port == self.port
    }
}
