//! Capture thread: lifecycle control and the acquisition loop
//!
//! One `CaptureThread` exists per device session. The device supports a
//! single physical stream carrying one or two Rx channels, so one dedicated
//! thread services all channels: read one interleaved block, demultiplex,
//! convert, decimate, and enqueue per channel, until stopped.
//!
//! Channel settings may be changed at any time; the loop applies them at the
//! next cycle boundary. Queues should be registered before `start_work` when
//! the consumer needs the stream from the first block.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{error, info, warn};

use crate::channel::{ChannelPipeline, ChannelShared, SampleBlock};
use crate::config::CaptureConfig;
use crate::device::RxDevice;
use crate::dsp::{SpectrumPlacement, MAX_LOG2_DECIMATION};
use crate::error::{CaptureError, DeviceReadError};

/// Counters for one capture session (atomic for cross-thread access)
#[derive(Debug, Default)]
pub struct CaptureStats {
    /// Raw blocks read from the device
    pub blocks_read: AtomicU64,
    /// Raw interleaved samples read, summed over channels
    pub samples_read: AtomicU64,
    /// Transient read errors that were retried
    pub transient_read_errors: AtomicU64,
    /// Decimated blocks enqueued, summed over channels
    pub blocks_delivered: AtomicU64,
    /// Blocks not enqueued (unset queue or full queue), summed over channels
    pub blocks_dropped: AtomicU64,
}

impl CaptureStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

/// Sample acquisition thread for a SISO/MIMO Rx device
pub struct CaptureThread {
    config: CaptureConfig,
    channels: Arc<Vec<ChannelShared>>,
    running: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
    worker: Mutex<Option<JoinHandle<()>>>,
    // The loop thread takes the device while streaming and puts it back on exit
    device_slot: Arc<Mutex<Option<Box<dyn RxDevice>>>>,
}

impl CaptureThread {
    /// Open a capture session over `device`. Channel count is fixed here for
    /// the lifetime of the session.
    pub fn new(device: Box<dyn RxDevice>, config: CaptureConfig) -> Result<Self, CaptureError> {
        config.validate()?;
        if device.num_channels() != config.num_channels {
            return Err(CaptureError::InvalidConfig(format!(
                "device exposes {} channel(s), config expects {}",
                device.num_channels(),
                config.num_channels
            )));
        }

        let channels = (0..config.num_channels).map(|_| ChannelShared::new()).collect();

        Ok(Self {
            config,
            channels: Arc::new(channels),
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            stats: CaptureStats::new(),
            worker: Mutex::new(None),
            device_slot: Arc::new(Mutex::new(Some(device))),
        })
    }

    /// Start streaming. Blocks until the loop has activated the device and
    /// is about to read, or fails with `DeviceStart` without leaving a loop
    /// behind. Fails with `AlreadyRunning` while a session is active.
    pub fn start_work(&self) -> Result<(), CaptureError> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            if self.running.load(Ordering::SeqCst) {
                return Err(CaptureError::AlreadyRunning);
            }
            // The loop terminated on its own (fatal read error); reap it
            if let Some(handle) = worker.take() {
                let _ = handle.join();
            }
        }

        let device = lock(&self.device_slot)
            .take()
            .ok_or_else(|| CaptureError::DeviceStart("device unavailable".to_string()))?;

        self.stop.store(false, Ordering::SeqCst);

        // One-shot handshake: the loop reports "reading" or the activation error
        let (ready_tx, ready_rx): (Sender<Result<(), String>>, Receiver<Result<(), String>>) =
            bounded(1);

        let config = self.config.clone();
        let channels = self.channels.clone();
        let running = self.running.clone();
        let stop = self.stop.clone();
        let stats = self.stats.clone();
        let slot = self.device_slot.clone();

        let handle = thread::Builder::new()
            .name("iq-capture".to_string())
            .spawn(move || {
                let device = run_loop(device, config, channels, running, stop, stats, ready_tx);
                *lock(&slot) = Some(device);
            })
            .map_err(|e| CaptureError::DeviceStart(format!("capture thread spawn failed: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *worker = Some(handle);
                Ok(())
            }
            Ok(Err(msg)) => {
                let _ = handle.join();
                Err(CaptureError::DeviceStart(msg))
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureError::DeviceStart(
                    "capture thread exited during startup".to_string(),
                ))
            }
        }
    }

    /// Stop streaming and wait for the loop to exit. No-op when not running;
    /// safe to call from any thread.
    pub fn stop_work(&self) {
        let mut worker = lock(&self.worker);
        let Some(handle) = worker.take() else {
            return;
        };
        info!("stopping capture...");
        self.stop.store(true, Ordering::SeqCst);
        let _ = handle.join();
        self.stop.store(false, Ordering::SeqCst);
    }

    /// Current lifecycle state; side-effect free
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Channels in this session (1 or 2)
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Session counters
    pub fn stats(&self) -> &Arc<CaptureStats> {
        &self.stats
    }

    /// Create a consumer queue at the configured depth. The receiver side is
    /// handed to the consumer; attach the sender with `set_queue`.
    pub fn bounded_queue(&self) -> (Sender<SampleBlock>, Receiver<SampleBlock>) {
        bounded(self.config.queue_depth)
    }

    /// Set the decimation exponent (rate divided by 2^log2). Applied at the
    /// next cycle boundary when the loop is running.
    pub fn set_log2_decimation(&self, channel: usize, log2: u32) -> Result<(), CaptureError> {
        if log2 > MAX_LOG2_DECIMATION {
            return Err(CaptureError::unsupported_decimation(log2));
        }
        self.channel_shared(channel)?.set_log2_decimation(log2);
        Ok(())
    }

    pub fn log2_decimation(&self, channel: usize) -> Result<u32, CaptureError> {
        Ok(self.channel_shared(channel)?.log2_decimation())
    }

    /// Set the spectrum placement policy. Applied at the next cycle boundary.
    pub fn set_placement(
        &self,
        channel: usize,
        placement: SpectrumPlacement,
    ) -> Result<(), CaptureError> {
        self.channel_shared(channel)?.set_placement(placement);
        Ok(())
    }

    pub fn placement(&self, channel: usize) -> Result<SpectrumPlacement, CaptureError> {
        Ok(self.channel_shared(channel)?.placement())
    }

    /// Attach the consumer queue for `channel`. The queue's storage is owned
    /// by the consumer side; the channel keeps only a producer handle.
    pub fn set_queue(
        &self,
        channel: usize,
        sender: Sender<SampleBlock>,
    ) -> Result<(), CaptureError> {
        self.channel_shared(channel)?.set_queue(Some(sender));
        Ok(())
    }

    /// Detach the consumer queue; subsequent blocks for the channel are
    /// dropped silently.
    pub fn clear_queue(&self, channel: usize) -> Result<(), CaptureError> {
        self.channel_shared(channel)?.set_queue(None);
        Ok(())
    }

    /// Producer handle of the queue currently attached to `channel`, if any
    pub fn queue(&self, channel: usize) -> Result<Option<Sender<SampleBlock>>, CaptureError> {
        Ok(self.channel_shared(channel)?.queue())
    }

    /// Blocks dropped on `channel` because its queue was full
    pub fn overruns(&self, channel: usize) -> Result<u64, CaptureError> {
        Ok(self.channel_shared(channel)?.overruns())
    }

    fn channel_shared(&self, channel: usize) -> Result<&ChannelShared, CaptureError> {
        self.channels.get(channel).ok_or(CaptureError::InvalidChannel {
            channel,
            count: self.channels.len(),
        })
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.stop_work();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The acquisition loop. Runs on the dedicated capture thread and returns
/// the device when the session ends so the controller can restart it.
fn run_loop(
    mut device: Box<dyn RxDevice>,
    config: CaptureConfig,
    channels: Arc<Vec<ChannelShared>>,
    running: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
    ready_tx: Sender<Result<(), String>>,
) -> Box<dyn RxDevice> {
    let nb = config.num_channels;

    // Raw staging buffer: one read cycle of interleaved IQ for all channels.
    // Lives and dies with the loop; no other thread touches it.
    let mut raw = vec![0i16; config.block_samples * nb * 2];

    if let Err(e) = device.activate() {
        error!("device activation failed: {}", e);
        let _ = ready_tx.send(Err(e));
        return device;
    }

    let mut pipelines: Vec<ChannelPipeline> = channels
        .iter()
        .enumerate()
        .map(|(ch, shared)| ChannelPipeline::new(ch, shared))
        .collect();

    running.store(true, Ordering::SeqCst);
    let _ = ready_tx.send(Ok(()));

    info!(
        "capture started: {} channel(s), {} samples per cycle",
        nb, config.block_samples
    );

    let mut first_block = true;
    let mut last_stats_time = Instant::now();
    let mut last_blocks = 0u64;

    while !stop.load(Ordering::SeqCst) {
        match device.read_block(&mut raw) {
            Ok(()) => {}
            Err(DeviceReadError::Transient(msg)) => {
                stats.transient_read_errors.fetch_add(1, Ordering::Relaxed);
                warn!("transient device read error, retrying: {}", msg);
                // A driver that reports errors without blocking would
                // otherwise spin this loop hot
                thread::sleep(Duration::from_millis(100));
                continue;
            }
            Err(DeviceReadError::Fatal(msg)) => {
                // A fatal error ends the whole session, never one channel
                error!("fatal device read error, stopping capture: {}", msg);
                break;
            }
        }

        if first_block {
            info!("first block received ({} samples per channel)", config.block_samples);
            first_block = false;
        }

        stats.blocks_read.fetch_add(1, Ordering::Relaxed);
        stats
            .samples_read
            .fetch_add((config.block_samples * nb) as u64, Ordering::Relaxed);

        // Every channel of this cycle is demultiplexed from the same read and
        // delivered before the next read begins, preserving channel alignment.
        for (pipeline, shared) in pipelines.iter_mut().zip(channels.iter()) {
            pipeline.convert(&raw, nb);
            if pipeline.run_cycle(shared) {
                stats.blocks_delivered.fetch_add(1, Ordering::Relaxed);
            } else {
                stats.blocks_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }

        if last_stats_time.elapsed() >= Duration::from_secs(5) {
            let blocks = stats.blocks_read.load(Ordering::Relaxed);
            let elapsed = last_stats_time.elapsed().as_secs_f32();
            let rate = (blocks - last_blocks) as f32 * config.block_samples as f32 / elapsed;
            info!(
                "[capture] rate: {:.2} MSPS/channel | blocks: {} | delivered: {} | dropped: {} | read retries: {}",
                rate / 1_000_000.0,
                blocks,
                stats.blocks_delivered.load(Ordering::Relaxed),
                stats.blocks_dropped.load(Ordering::Relaxed),
                stats.transient_read_errors.load(Ordering::Relaxed),
            );
            last_stats_time = Instant::now();
            last_blocks = blocks;
        }
    }

    device.deactivate();
    running.store(false, Ordering::SeqCst);

    info!(
        "capture stopped. blocks={}, delivered={}, dropped={}, read retries={}",
        stats.blocks_read.load(Ordering::Relaxed),
        stats.blocks_delivered.load(Ordering::Relaxed),
        stats.blocks_dropped.load(Ordering::Relaxed),
        stats.transient_read_errors.load(Ordering::Relaxed),
    );

    device
}
