//! Decimation engine
//!
//! Reduces the sample rate by a power of two using a cascade of half-band
//! stages. Spectrum placement selects which part of the input spectrum lands
//! in the center of the decimated output band:
//! 1. Centered: no shift, output band centered on the tuned frequency
//! 2. Infra/Supra: a quarter-rate complex rotation retains the band just
//!    below/above the tuned frequency, keeping the receiver's DC spike out
//!    of the retained band
//! 3. Auto: deterministic infra/supra choice from the decimation exponent

mod halfband;

use num_complex::Complex;

use crate::error::CaptureError;

use halfband::HalfbandStage;

/// Deepest supported cascade (decimation by up to 64)
pub const MAX_LOG2_DECIMATION: u32 = 6;

/// Which alias of the input spectrum is retained as the output band center
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectrumPlacement {
    /// Output band centered on the original center frequency
    Centered,
    /// Band just below center (shift spectrum up by a quarter of the input rate)
    Infra,
    /// Band just above center (shift spectrum down by a quarter of the input rate)
    Supra,
    /// Infra for even non-zero exponents, supra for odd ones
    Auto,
}

impl SpectrumPlacement {
    /// Resolve `Auto` to a concrete placement for a given decimation exponent.
    ///
    /// The rule is uniform across channels: exponent 0 is the identity
    /// transform so placement is moot (`Centered`); odd exponents pick
    /// `Supra`, even non-zero ones `Infra`.
    pub fn resolve(self, log2_decim: u32) -> SpectrumPlacement {
        match self {
            SpectrumPlacement::Auto => {
                if log2_decim == 0 {
                    SpectrumPlacement::Centered
                } else if log2_decim % 2 == 1 {
                    SpectrumPlacement::Supra
                } else {
                    SpectrumPlacement::Infra
                }
            }
            other => other,
        }
    }

    pub(crate) fn code(self) -> u8 {
        match self {
            SpectrumPlacement::Centered => 0,
            SpectrumPlacement::Infra => 1,
            SpectrumPlacement::Supra => 2,
            SpectrumPlacement::Auto => 3,
        }
    }

    pub(crate) fn from_code(code: u8) -> Self {
        match code {
            1 => SpectrumPlacement::Infra,
            2 => SpectrumPlacement::Supra,
            3 => SpectrumPlacement::Auto,
            _ => SpectrumPlacement::Centered,
        }
    }
}

/// Cascaded power-of-two decimator for complex IQ blocks
///
/// Exponent 0 is a pure pass-through. For deeper settings the input is
/// optionally rotated by a quarter of the input rate (infra/supra), then run
/// through `log2_decim` half-band stages, each halving the rate. Filter and
/// rotator state persist across blocks.
#[derive(Debug)]
pub struct Decimator {
    log2_decim: u32,
    placement: SpectrumPlacement,
    stages: Vec<HalfbandStage>,
    rot_phase: u8,
    work_a: Vec<Complex<f32>>,
    work_b: Vec<Complex<f32>>,
}

impl Decimator {
    /// Fails with `UnsupportedDecimation` if the exponent exceeds the
    /// supported cascade depth; configuration errors never occur mid-stream.
    pub fn new(log2_decim: u32, placement: SpectrumPlacement) -> Result<Self, CaptureError> {
        if log2_decim > MAX_LOG2_DECIMATION {
            return Err(CaptureError::unsupported_decimation(log2_decim));
        }
        Ok(Self {
            log2_decim,
            placement,
            stages: (0..log2_decim).map(|_| HalfbandStage::new()).collect(),
            rot_phase: 0,
            work_a: Vec::new(),
            work_b: Vec::new(),
        })
    }

    pub fn log2_decimation(&self) -> u32 {
        self.log2_decim
    }

    pub fn placement(&self) -> SpectrumPlacement {
        self.placement
    }

    /// Decimate one block, replacing the contents of `output`.
    pub fn process(&mut self, input: &[Complex<f32>], output: &mut Vec<Complex<f32>>) {
        output.clear();

        if self.log2_decim == 0 {
            output.extend_from_slice(input);
            return;
        }

        self.work_a.clear();
        match self.placement.resolve(self.log2_decim) {
            SpectrumPlacement::Centered | SpectrumPlacement::Auto => {
                self.work_a.extend_from_slice(input);
            }
            SpectrumPlacement::Infra => {
                // Multiply by j^n: spectrum moves up by a quarter rate
                for &x in input {
                    self.work_a.push(rotate(x, self.rot_phase));
                    self.rot_phase = (self.rot_phase + 1) & 3;
                }
            }
            SpectrumPlacement::Supra => {
                // Multiply by (-j)^n: spectrum moves down by a quarter rate
                for &x in input {
                    self.work_a.push(rotate(x, (4 - self.rot_phase) & 3));
                    self.rot_phase = (self.rot_phase + 1) & 3;
                }
            }
        }

        for stage in &mut self.stages {
            self.work_b.clear();
            stage.process(&self.work_a, &mut self.work_b);
            std::mem::swap(&mut self.work_a, &mut self.work_b);
        }

        output.extend_from_slice(&self.work_a);
    }
}

/// Multiply by j^phase
#[inline]
fn rotate(x: Complex<f32>, phase: u8) -> Complex<f32> {
    match phase & 3 {
        0 => x,
        1 => Complex::new(-x.im, x.re),
        2 => Complex::new(-x.re, -x.im),
        _ => Complex::new(x.im, -x.re),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    fn tone(freq: f32, amplitude: f32, len: usize) -> Vec<Complex<f32>> {
        (0..len)
            .map(|n| {
                let ph = TAU * freq * n as f32;
                Complex::new(amplitude * ph.cos(), amplitude * ph.sin())
            })
            .collect()
    }

    /// Power of the correlation against a complex exponential at `freq`
    /// (amplitude squared for a pure tone at that frequency).
    fn power_at(x: &[Complex<f32>], freq: f32) -> f32 {
        let mut acc = Complex::new(0.0f32, 0.0);
        for (n, &s) in x.iter().enumerate() {
            let ph = -TAU * freq * n as f32;
            acc += s * Complex::new(ph.cos(), ph.sin());
        }
        (acc / x.len() as f32).norm_sqr()
    }

    #[test]
    fn test_factor_zero_is_identity() {
        let input = tone(0.1, 1.0, 512);
        let mut dec = Decimator::new(0, SpectrumPlacement::Centered).unwrap();
        let mut out = Vec::new();
        dec.process(&input, &mut out);
        assert_eq!(out, input);
    }

    #[test]
    fn test_output_length() {
        let input = tone(0.01, 1.0, 4096);
        for log2 in 1..=MAX_LOG2_DECIMATION {
            let mut dec = Decimator::new(log2, SpectrumPlacement::Centered).unwrap();
            let mut out = Vec::new();
            dec.process(&input, &mut out);
            assert_eq!(out.len(), 4096 >> log2, "log2 = {}", log2);
        }
    }

    #[test]
    fn test_rejects_unsupported_factor() {
        let err = Decimator::new(MAX_LOG2_DECIMATION + 1, SpectrumPlacement::Centered)
            .unwrap_err();
        assert!(matches!(
            err,
            CaptureError::UnsupportedDecimation { requested: 7, .. }
        ));
    }

    #[test]
    fn test_centered_passband_tone() {
        // A tone at 0.05 cycles/sample appears at 0.10 after decimation by 2
        let input = tone(0.05, 1.0, 4096);
        let mut dec = Decimator::new(1, SpectrumPlacement::Centered).unwrap();
        let mut out = Vec::new();
        dec.process(&input, &mut out);

        let settled = &out[64..];
        assert!(power_at(settled, 0.10) > 0.7, "passband tone lost");
        assert!(power_at(settled, -0.10) < 0.01, "image not rejected");
    }

    #[test]
    fn test_centered_two_stage_cascade() {
        let input = tone(0.02, 1.0, 8192);
        let mut dec = Decimator::new(2, SpectrumPlacement::Centered).unwrap();
        let mut out = Vec::new();
        dec.process(&input, &mut out);

        let settled = &out[64..];
        assert!(power_at(settled, 0.08) > 0.7);
    }

    #[test]
    fn test_infra_retains_band_below_center() {
        // Infra maps the band around -fs/4 to the output center
        let input = tone(-0.25, 1.0, 4096);
        let mut dec = Decimator::new(1, SpectrumPlacement::Infra).unwrap();
        let mut out = Vec::new();
        dec.process(&input, &mut out);

        let settled = &out[64..];
        assert!(power_at(settled, 0.0) > 0.7, "infra band not centered");
    }

    #[test]
    fn test_infra_rejects_band_above_center() {
        // The opposite side lands at Nyquist, deep in the stopband
        let input = tone(0.25, 1.0, 4096);
        let mut dec = Decimator::new(1, SpectrumPlacement::Infra).unwrap();
        let mut out = Vec::new();
        dec.process(&input, &mut out);

        let settled = &out[64..];
        assert!(power_at(settled, 0.0) < 0.05);
        assert!(power_at(settled, 0.5) < 0.05);
    }

    #[test]
    fn test_supra_retains_band_above_center() {
        let input = tone(0.25, 1.0, 4096);
        let mut dec = Decimator::new(1, SpectrumPlacement::Supra).unwrap();
        let mut out = Vec::new();
        dec.process(&input, &mut out);

        let settled = &out[64..];
        assert!(power_at(settled, 0.0) > 0.7, "supra band not centered");
    }

    #[test]
    fn test_auto_placement_rule() {
        assert_eq!(
            SpectrumPlacement::Auto.resolve(0),
            SpectrumPlacement::Centered
        );
        assert_eq!(SpectrumPlacement::Auto.resolve(1), SpectrumPlacement::Supra);
        assert_eq!(SpectrumPlacement::Auto.resolve(2), SpectrumPlacement::Infra);
        assert_eq!(SpectrumPlacement::Auto.resolve(3), SpectrumPlacement::Supra);
        assert_eq!(SpectrumPlacement::Auto.resolve(6), SpectrumPlacement::Infra);
        // Concrete placements resolve to themselves
        assert_eq!(
            SpectrumPlacement::Infra.resolve(4),
            SpectrumPlacement::Infra
        );
    }

    #[test]
    fn test_streamed_blocks_match_single_block() {
        // Feeding a stream in small blocks must equal one large block
        let input = tone(0.03, 0.8, 4096);
        let mut out_whole = Vec::new();
        Decimator::new(2, SpectrumPlacement::Infra)
            .unwrap()
            .process(&input, &mut out_whole);

        let mut dec = Decimator::new(2, SpectrumPlacement::Infra).unwrap();
        let mut streamed = Vec::new();
        let mut chunk_out = Vec::new();
        for chunk in input.chunks(512) {
            dec.process(chunk, &mut chunk_out);
            streamed.extend_from_slice(&chunk_out);
        }

        assert_eq!(out_whole.len(), streamed.len());
        for (a, b) in out_whole.iter().zip(streamed.iter()) {
            assert!((a - b).norm() < 1e-5);
        }
    }
}
