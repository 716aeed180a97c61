//! Driver boundary for RF front-ends
//!
//! The capture loop borrows a device through the `RxDevice` trait for the
//! duration of one streaming session. Real backends wrap a vendor driver;
//! `SimulatedDevice` generates deterministic test signals.

pub mod sim;

pub use sim::{SimSignal, SimulatedDevice};

use crate::error::DeviceReadError;

/// Rx side of an RF front-end with a single physical sample stream
///
/// The stream carries one or two logical channels. With two channels the
/// driver interleaves complex samples per channel:
/// `[c0_i, c0_q, c1_i, c1_q, ...]`; with one channel the buffer is plain
/// `[i, q, i, q, ...]`.
pub trait RxDevice: Send {
    /// Enable the Rx stream. Called once by the capture loop before the
    /// first read.
    fn activate(&mut self) -> Result<(), String>;

    /// Disable the Rx stream. Called once when the loop exits, including
    /// on fatal read errors.
    fn deactivate(&mut self);

    /// Blocking synchronous read of one full interleaved block into `buf`.
    ///
    /// The driver owns the read timeout; a timeout surfaces as
    /// `DeviceReadError::Transient`. The buffer is always filled completely
    /// on success.
    fn read_block(&mut self, buf: &mut [i16]) -> Result<(), DeviceReadError>;

    /// Number of Rx channels multiplexed into the stream (1 or 2)
    fn num_channels(&self) -> usize;
}
