//! IQ Capture - SISO/MIMO sample acquisition for SDR front-ends
//!
//! Pulls raw interleaved IQ blocks from an RF front-end with one or two Rx
//! channels over a single physical stream, then per channel:
//! 1. Demultiplex the channel's samples out of the shared staging buffer
//! 2. Widen i16 fixed-point IQ to complex float
//! 3. Decimate by a configured power of two with spectrum placement
//! 4. Enqueue the block into the channel's bounded consumer queue
//!
//! One dedicated thread services all channels of a session, so dual-channel
//! output stays time-aligned cycle for cycle. Register queues and decimation
//! settings before `start_work` when the consumer needs the stream from the
//! first block; later changes apply at the next cycle boundary.

pub mod capture;
pub mod channel;
pub mod config;
pub mod device;
pub mod dsp;
pub mod error;

pub use capture::{CaptureStats, CaptureThread};
pub use channel::SampleBlock;
pub use config::CaptureConfig;
pub use device::{RxDevice, SimSignal, SimulatedDevice};
pub use dsp::{Decimator, SpectrumPlacement, MAX_LOG2_DECIMATION};
pub use error::{CaptureError, DeviceReadError};
