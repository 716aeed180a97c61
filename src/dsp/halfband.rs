//! Half-band decimation stage
//!
//! One stage of the decimation cascade: a linear-phase half-band low-pass
//! FIR followed by downsampling by 2. Filter state persists across blocks
//! so a continuous stream can be processed block by block.

use num_complex::Complex;

/// 11-tap half-band low-pass. Every other tap is zero apart from the
/// center, passband edge at a quarter of the input rate.
const TAPS: [f32; 11] = [
    0.00599, 0.0, -0.05109, 0.0, 0.29494, 0.5, 0.29494, 0.0, -0.05109, 0.0, 0.00599,
];

#[derive(Debug)]
pub(crate) struct HalfbandStage {
    hist: [Complex<f32>; TAPS.len()],
    idx: usize,
    emit: bool,
}

impl HalfbandStage {
    pub(crate) fn new() -> Self {
        Self {
            hist: [Complex::new(0.0, 0.0); TAPS.len()],
            idx: 0,
            emit: false,
        }
    }

    /// Filter `input` and append every second filtered sample to `output`.
    pub(crate) fn process(&mut self, input: &[Complex<f32>], output: &mut Vec<Complex<f32>>) {
        let n = TAPS.len();
        for &x in input {
            self.hist[self.idx] = x;

            self.emit = !self.emit;
            if self.emit {
                let mut acc = Complex::new(0.0, 0.0);
                for (m, &tap) in TAPS.iter().enumerate() {
                    if tap != 0.0 {
                        acc += tap * self.hist[(self.idx + n - m) % n];
                    }
                }
                output.push(acc);
            }

            self.idx = (self.idx + 1) % n;
        }
    }
}
