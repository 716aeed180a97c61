//! Simulated RF front-end
//!
//! Generates deterministic interleaved IQ blocks without hardware, with
//! programmable read faults. Used by the pipeline tests and for offline runs.

use std::collections::HashSet;
use std::f32::consts::TAU;

use crate::error::DeviceReadError;

use super::RxDevice;

/// Signal generated on one simulated channel
#[derive(Debug, Clone, Copy)]
pub enum SimSignal {
    /// Every sample is the same (i, q) pair
    Constant { i: i16, q: i16 },
    /// Complex tone at `freq` cycles per sample (-0.5..0.5), `amplitude`
    /// as a fraction of full scale
    Tone { freq: f32, amplitude: f32 },
    /// Every sample of block N carries (N, channel), letting a consumer
    /// verify which read cycle and channel a block came from
    BlockCounter,
}

/// Simulated SISO/MIMO device producing interleaved i16 IQ blocks
pub struct SimulatedDevice {
    num_channels: usize,
    signals: Vec<SimSignal>,
    phase: Vec<f32>,
    blocks_emitted: u64,
    reads_attempted: u64,
    transient_reads: HashSet<u64>,
    fatal_after: Option<u64>,
    activation_error: Option<String>,
    active: bool,
}

impl SimulatedDevice {
    pub fn new(num_channels: usize) -> Self {
        Self {
            num_channels,
            signals: vec![SimSignal::Constant { i: 0, q: 0 }; num_channels],
            phase: vec![0.0; num_channels],
            blocks_emitted: 0,
            reads_attempted: 0,
            transient_reads: HashSet::new(),
            fatal_after: None,
            activation_error: None,
            active: false,
        }
    }

    /// Set the signal generated on `channel`
    pub fn set_signal(&mut self, channel: usize, signal: SimSignal) -> &mut Self {
        self.signals[channel] = signal;
        self
    }

    /// Make read attempt `n` (0-based) fail with a transient error
    pub fn transient_on_read(&mut self, n: u64) -> &mut Self {
        self.transient_reads.insert(n);
        self
    }

    /// Make every read after `n` successful blocks fail fatally
    pub fn fatal_after(&mut self, n: u64) -> &mut Self {
        self.fatal_after = Some(n);
        self
    }

    /// Make activation fail with `msg`
    pub fn fail_activation(&mut self, msg: &str) -> &mut Self {
        self.activation_error = Some(msg.to_string());
        self
    }

    /// Number of blocks successfully emitted so far
    pub fn blocks_emitted(&self) -> u64 {
        self.blocks_emitted
    }

    fn sample(&mut self, channel: usize) -> (i16, i16) {
        match self.signals[channel] {
            SimSignal::Constant { i, q } => (i, q),
            SimSignal::Tone { freq, amplitude } => {
                let amp = amplitude * i16::MAX as f32;
                let ph = self.phase[channel];
                let (i, q) = ((amp * ph.cos()) as i16, (amp * ph.sin()) as i16);
                self.phase[channel] = (ph + TAU * freq) % TAU;
                (i, q)
            }
            SimSignal::BlockCounter => (self.blocks_emitted as i16, channel as i16),
        }
    }
}

impl RxDevice for SimulatedDevice {
    fn activate(&mut self) -> Result<(), String> {
        if let Some(msg) = &self.activation_error {
            return Err(msg.clone());
        }
        self.active = true;
        Ok(())
    }

    fn deactivate(&mut self) {
        self.active = false;
    }

    fn read_block(&mut self, buf: &mut [i16]) -> Result<(), DeviceReadError> {
        if !self.active {
            return Err(DeviceReadError::Fatal("stream not active".to_string()));
        }

        let attempt = self.reads_attempted;
        self.reads_attempted += 1;

        if self.transient_reads.contains(&attempt) {
            return Err(DeviceReadError::Transient(format!(
                "simulated timeout on read {attempt}"
            )));
        }
        if let Some(limit) = self.fatal_after {
            if self.blocks_emitted >= limit {
                return Err(DeviceReadError::Fatal("simulated device loss".to_string()));
            }
        }

        let nb = self.num_channels;
        let samples = buf.len() / (2 * nb);
        for s in 0..samples {
            for ch in 0..nb {
                let (i, q) = self.sample(ch);
                let base = (s * nb + ch) * 2;
                buf[base] = i;
                buf[base + 1] = q;
            }
        }

        self.blocks_emitted += 1;
        Ok(())
    }

    fn num_channels(&self) -> usize {
        self.num_channels
    }
}
