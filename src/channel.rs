//! Per-channel state
//!
//! One `ChannelShared` exists per active channel for the lifetime of a
//! session. The controlling thread writes settings through it; the capture
//! loop snapshots them once per read cycle, so a change lands at the next
//! cycle boundary and is never observed as a torn update.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

use crossbeam_channel::{Sender, TrySendError};
use num_complex::Complex;
use tracing::{debug, warn};

use crate::dsp::{Decimator, SpectrumPlacement};

/// One converted, decimated block of complex samples for a single channel
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    /// Channel index within the session (0-based)
    pub channel: usize,
    /// Complex baseband samples, full-scale normalized to 1.0
    pub samples: Vec<Complex<f32>>,
}

/// Channel settings shared between the controller and the capture loop
///
/// Each field is individually atomic; the loop does not need a consistent
/// multi-field snapshot (a one-cycle lag for a new setting is acceptable).
#[derive(Debug)]
pub(crate) struct ChannelShared {
    log2_decim: AtomicU32,
    placement: AtomicU8,
    queue: Mutex<Option<Sender<SampleBlock>>>,
    overruns: AtomicU64,
}

impl ChannelShared {
    pub(crate) fn new() -> Self {
        Self {
            log2_decim: AtomicU32::new(0),
            placement: AtomicU8::new(SpectrumPlacement::Centered.code()),
            queue: Mutex::new(None),
            overruns: AtomicU64::new(0),
        }
    }

    pub(crate) fn set_log2_decimation(&self, log2: u32) {
        self.log2_decim.store(log2, Ordering::SeqCst);
    }

    pub(crate) fn log2_decimation(&self) -> u32 {
        self.log2_decim.load(Ordering::SeqCst)
    }

    pub(crate) fn set_placement(&self, placement: SpectrumPlacement) {
        self.placement.store(placement.code(), Ordering::SeqCst);
    }

    pub(crate) fn placement(&self) -> SpectrumPlacement {
        SpectrumPlacement::from_code(self.placement.load(Ordering::SeqCst))
    }

    /// Attach the consumer queue. The channel holds only a producer handle;
    /// the queue's storage is owned by whoever created it.
    pub(crate) fn set_queue(&self, sender: Option<Sender<SampleBlock>>) {
        *self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = sender;
    }

    pub(crate) fn queue(&self) -> Option<Sender<SampleBlock>> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    fn record_overrun(&self) -> u64 {
        self.overruns.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Loop-side working state for one channel: conversion scratch, decimator,
/// and the forwarding step. Owned exclusively by the capture thread.
pub(crate) struct ChannelPipeline {
    channel: usize,
    converted: Vec<Complex<f32>>,
    decimated: Vec<Complex<f32>>,
    decimator: Decimator,
}

impl ChannelPipeline {
    pub(crate) fn new(channel: usize, shared: &ChannelShared) -> Self {
        let log2 = shared.log2_decimation();
        let placement = shared.placement();
        Self {
            channel,
            converted: Vec::new(),
            decimated: Vec::new(),
            // Settings are validated at the setter, so construction cannot fail
            decimator: Decimator::new(log2, placement)
                .unwrap_or_else(|_| unreachable!("validated decimation setting")),
        }
    }

    /// De-interleave and widen this channel's raw samples out of the staging
    /// buffer. `raw` holds i16 IQ pairs for `stride` channels; this channel's
    /// pair for sample s sits at `(s * stride + channel) * 2`.
    pub(crate) fn convert(&mut self, raw: &[i16], stride: usize) {
        const SCALE: f32 = 1.0 / 32768.0;
        let samples = raw.len() / (2 * stride);
        self.converted.clear();
        self.converted.reserve(samples);
        for s in 0..samples {
            let base = (s * stride + self.channel) * 2;
            self.converted.push(Complex::new(
                raw[base] as f32 * SCALE,
                raw[base + 1] as f32 * SCALE,
            ));
        }
    }

    /// Decimate the converted block at this cycle's settings and forward it
    /// to the consumer queue. Returns true if a block was enqueued.
    ///
    /// A full queue drops the block immediately and counts an overrun; the
    /// hardware stream cannot be paused, and a bounded wait here would delay
    /// the other channel of the same cycle. An unset queue drops silently
    /// (the channel is intentionally unconsumed).
    pub(crate) fn run_cycle(&mut self, shared: &ChannelShared) -> bool {
        let log2 = shared.log2_decimation();
        let placement = shared.placement();
        if log2 != self.decimator.log2_decimation() || placement != self.decimator.placement() {
            debug!(
                "channel {}: decimation now 2^{}, placement {:?}",
                self.channel, log2, placement
            );
            self.decimator = Decimator::new(log2, placement)
                .unwrap_or_else(|_| unreachable!("validated decimation setting"));
        }

        self.decimator.process(&self.converted, &mut self.decimated);

        let Some(sender) = shared.queue() else {
            return false;
        };

        let block = SampleBlock {
            channel: self.channel,
            samples: self.decimated.clone(),
        };
        match sender.try_send(block) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let total = shared.record_overrun();
                if total == 1 {
                    warn!("channel {}: consumer queue full, dropping block", self.channel);
                } else {
                    debug!(
                        "channel {}: consumer queue full, dropping block ({} overruns)",
                        self.channel, total
                    );
                }
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("channel {}: consumer queue disconnected", self.channel);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_convert_siso() {
        let shared = ChannelShared::new();
        let mut pipe = ChannelPipeline::new(0, &shared);
        pipe.convert(&[16384, -16384, 0, 32767], 1);
        assert_eq!(pipe.converted.len(), 2);
        assert!((pipe.converted[0].re - 0.5).abs() < 1e-6);
        assert!((pipe.converted[0].im + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_convert_mimo_deinterleaves() {
        let shared = ChannelShared::new();
        // Two samples for two channels: [c0, c1, c0, c1]
        let raw = [100i16, 101, 200, 201, 110, 111, 210, 211];

        let mut pipe0 = ChannelPipeline::new(0, &shared);
        pipe0.convert(&raw, 2);
        let mut pipe1 = ChannelPipeline::new(1, &shared);
        pipe1.convert(&raw, 2);

        assert_eq!(pipe0.converted.len(), 2);
        assert!((pipe0.converted[1].re * 32768.0 - 110.0).abs() < 1e-3);
        assert!((pipe1.converted[0].re * 32768.0 - 200.0).abs() < 1e-3);
        assert!((pipe1.converted[1].im * 32768.0 - 211.0).abs() < 1e-3);
    }

    #[test]
    fn test_unset_queue_drops_silently() {
        let shared = ChannelShared::new();
        let mut pipe = ChannelPipeline::new(0, &shared);
        pipe.convert(&[1, 2, 3, 4], 1);
        assert!(!pipe.run_cycle(&shared));
        assert_eq!(shared.overruns(), 0);
    }

    #[test]
    fn test_full_queue_counts_overrun() {
        let shared = ChannelShared::new();
        let (tx, rx) = bounded(1);
        shared.set_queue(Some(tx));

        let mut pipe = ChannelPipeline::new(0, &shared);
        pipe.convert(&[1, 2], 1);
        assert!(pipe.run_cycle(&shared));
        assert!(!pipe.run_cycle(&shared));
        assert!(!pipe.run_cycle(&shared));
        assert_eq!(shared.overruns(), 2);
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_settings_apply_on_next_cycle() {
        let shared = ChannelShared::new();
        let (tx, rx) = bounded(8);
        shared.set_queue(Some(tx));

        let mut pipe = ChannelPipeline::new(0, &shared);
        pipe.convert(&vec![1000i16; 128], 1);
        assert!(pipe.run_cycle(&shared));
        assert_eq!(rx.recv().unwrap().samples.len(), 64);

        shared.set_log2_decimation(2);
        assert!(pipe.run_cycle(&shared));
        assert_eq!(rx.recv().unwrap().samples.len(), 16);
    }
}
