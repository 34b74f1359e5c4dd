//! Linear Predictive Coding (LPC) by Burg's method
//!
//! Coefficients follow Praat's LPC convention: `a[1..m]` without the leading
//! 1, for the inverse filter
//!
//! A(z) = 1 + a[1] z^-1 + a[2] z^-2 + ... + a[m] z^-m
//!
//! The forward and backward prediction errors live in the worker's scratch
//! slot, so analysing a frame does not allocate.

use crate::operation::{FrameResult, SoundFrame, SoundFrameAnalysis};
use crate::pool::{ScratchSlot, VectorDeclaration};
use crate::sampled::AnalysisFrame;
use crate::{FrameError, PraatError, Result};

const FORWARD: &str = "burg forward";
const BACKWARD: &str = "burg backward";
const PREVIOUS: &str = "burg previous";

/// LPC coefficients and prediction error of one frame
#[derive(Debug, Clone, PartialEq)]
pub struct LpcFrame {
    /// a[1..m] of the inverse filter
    pub coefficients: Vec<f64>,
    /// Mean squared prediction error
    pub gain: f64,
}

impl LpcFrame {
    /// An undefined frame with room for `order` coefficients
    pub fn new(order: usize) -> Self {
        Self {
            coefficients: vec![f64::NAN; order],
            gain: f64::NAN,
        }
    }

    pub fn order(&self) -> usize {
        self.coefficients.len()
    }
}

impl AnalysisFrame for LpcFrame {
    fn set_undefined(&mut self) {
        self.coefficients.fill(f64::NAN);
        self.gain = f64::NAN;
    }

    fn is_undefined(&self) -> bool {
        self.gain.is_nan()
    }
}

/// Burg LPC analysis of a given order
#[derive(Debug, Clone, Copy)]
pub struct BurgLpcAnalysis {
    order: usize,
}

impl BurgLpcAnalysis {
    /// # Errors
    /// [`PraatError::InvalidParameter`] for order 0
    pub fn new(order: usize) -> Result<Self> {
        if order == 0 {
            return Err(PraatError::InvalidParameter(
                "LPC order must be at least 1".to_string(),
            ));
        }
        Ok(Self { order })
    }

    pub fn order(&self) -> usize {
        self.order
    }
}

impl SoundFrameAnalysis for BurgLpcAnalysis {
    type Frame = LpcFrame;

    fn scratch_declarations(&self, window_samples: usize) -> Vec<VectorDeclaration> {
        vec![
            VectorDeclaration::new(FORWARD, window_samples),
            VectorDeclaration::new(BACKWARD, window_samples),
            VectorDeclaration::new(PREVIOUS, self.order),
        ]
    }

    fn analyse_sound_frame(
        &self,
        frame: &SoundFrame<'_>,
        output: &mut LpcFrame,
        scratch: &mut ScratchSlot<'_>,
    ) -> FrameResult {
        let samples = frame.samples();
        let n = samples.len();
        let m = self.order;
        if n <= m {
            return Err(FrameError::InsufficientData {
                available: n,
                required: m + 1,
            });
        }

        // Compute initial power
        let power: f64 = samples.iter().map(|s| s * s).sum();
        let mut xms = power / n as f64;
        if xms <= 0.0 {
            return Err(FrameError::SilentFrame);
        }

        let [b1, b2, aa] = scratch.vectors([FORWARD, BACKWARD, PREVIOUS])?;
        let (b1, b2, aa) = (&mut b1[..n], &mut b2[..n], &mut aa[..m]);

        output.coefficients.resize(m, 0.0);
        let a = output.coefficients.as_mut_slice();
        a.fill(0.0);
        aa.fill(0.0);

        // b1[0] = x[0], b2[n-2] = x[n-1], b1[j] = b2[j-1] = x[j] in between
        b1[0] = samples[0];
        b2[n - 2] = samples[n - 1];
        for j in 1..n - 1 {
            b1[j] = samples[j];
            b2[j - 1] = samples[j];
        }

        for i in 0..m {
            let mut num = 0.0;
            let mut den = 0.0;
            for j in 0..n - i - 1 {
                num += b1[j] * b2[j];
                den += b1[j] * b1[j] + b2[j] * b2[j];
            }
            if den <= 0.0 {
                return Err(FrameError::Degenerate(format!(
                    "prediction error vanished at order {}",
                    i + 1
                )));
            }

            a[i] = 2.0 * num / den;
            xms *= 1.0 - a[i] * a[i];

            for j in 0..i {
                a[j] = aa[j] - a[i] * aa[i - j - 1];
            }

            if i < m - 1 {
                aa[..=i].copy_from_slice(&a[..=i]);
                for j in 0..n - i - 2 {
                    b1[j] -= aa[i] * b2[j];
                    b2[j] = b2[j + 1] - aa[i] * b1[j + 1];
                }
            }
        }

        // predictor coefficients -> inverse filter coefficients
        for c in a.iter_mut() {
            *c = -*c;
        }
        output.gain = xms;
        Ok(())
    }
}
