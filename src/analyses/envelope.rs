//! Spectral envelopes from LPC frames
//!
//! A sampled-to-sampled analysis: every destination frame is computed from
//! the LPC frame with the same index, without looking at the sound. The
//! envelope is the LPC model's power spectrum
//!
//! P(f) = gain / |A(exp(i 2 pi f / fs))|^2
//!
//! on `number_of_bins` equally spaced frequencies from 0 to Nyquist, in dB.

use num_complex::Complex;
use std::f64::consts::PI;

use super::lpc::LpcFrame;
use crate::operation::{FrameResult, SampledFrameAnalysis};
use crate::pool::{ScratchSlot, VectorDeclaration};
use crate::sampled::{AnalysisFrame, SampledDomain, SampledFrames};
use crate::{FrameError, PraatError, Result};

const POWER: &str = "envelope power";

/// Value written for bins without power
const FLOOR_DB: f64 = -300.0;

/// Evaluate LPC frames as dB spectra
#[derive(Debug, Clone, Copy)]
pub struct LpcSpectralEnvelope<'a> {
    lpc: &'a SampledFrames<LpcFrame>,
    number_of_bins: usize,
    sample_rate: f64,
}

impl<'a> LpcSpectralEnvelope<'a> {
    /// # Arguments
    /// * `lpc` - Source LPC frames; the destination must share their time grid
    /// * `number_of_bins` - Frequencies per envelope, at least 2
    /// * `sample_rate` - Sample rate of the analysed sound
    pub fn new(lpc: &'a SampledFrames<LpcFrame>, number_of_bins: usize, sample_rate: f64) -> Result<Self> {
        if number_of_bins < 2 {
            return Err(PraatError::InvalidParameter(format!(
                "an envelope needs at least 2 bins, got {}",
                number_of_bins
            )));
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(PraatError::InvalidParameter(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }
        Ok(Self {
            lpc,
            number_of_bins,
            sample_rate,
        })
    }

    pub fn number_of_bins(&self) -> usize {
        self.number_of_bins
    }

    /// Frequency of bin `bin` in Hz
    pub fn bin_frequency(&self, bin: usize) -> f64 {
        bin as f64 * 0.5 * self.sample_rate / (self.number_of_bins - 1) as f64
    }
}

impl SampledFrameAnalysis for LpcSpectralEnvelope<'_> {
    type Frame = Vec<f64>;

    fn scratch_declarations(&self) -> Vec<VectorDeclaration> {
        vec![VectorDeclaration::new(POWER, self.number_of_bins)]
    }

    fn check_destination(&self, domain: &SampledDomain) -> Result<()> {
        let source = self.lpc.domain();
        for (field, expected, found) in [
            ("nx", source.nx as f64, domain.nx as f64),
            ("dx", source.dx, domain.dx),
            ("x1", source.x1, domain.x1),
        ] {
            if expected != found {
                return Err(PraatError::DomainMismatch {
                    field,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    fn analyse_frame(
        &self,
        index: usize,
        output: &mut Vec<f64>,
        scratch: &mut ScratchSlot<'_>,
    ) -> FrameResult {
        let frame = self
            .lpc
            .get(index)
            .ok_or_else(|| FrameError::Degenerate(format!("no LPC frame {}", index + 1)))?;
        if frame.is_undefined() {
            return Err(FrameError::Degenerate("LPC frame is undefined".to_string()));
        }
        if !(frame.gain > 0.0) {
            return Err(FrameError::SilentFrame);
        }

        // |A|^2 at every bin
        let power = scratch.vector(POWER)?;
        for (bin, value) in power.iter_mut().enumerate() {
            let omega = 2.0 * PI * self.bin_frequency(bin) / self.sample_rate;
            let z = Complex::from_polar(1.0, -omega);
            let mut zk = Complex::new(1.0, 0.0);
            let mut a = Complex::new(1.0, 0.0);
            for &c in &frame.coefficients {
                zk *= z;
                a += zk * c;
            }
            *value = a.norm_sqr();
        }

        output.resize(self.number_of_bins, 0.0);
        for (db, &denominator) in output.iter_mut().zip(power.iter()) {
            let p = frame.gain / denominator;
            *db = if p.is_finite() && p > 1e-30 {
                10.0 * p.log10()
            } else {
                FLOOR_DB
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnalysisWorkspace, Sound, WindowShape};
    use approx::assert_relative_eq;

    fn lpc_frames(frames: Vec<LpcFrame>) -> SampledFrames<LpcFrame> {
        let domain = SampledDomain::new(0.0, 1.0, frames.len(), 0.1, 0.05).unwrap();
        let mut frames = frames.into_iter();
        SampledFrames::from_fn(domain, |_| frames.next().unwrap_or_else(|| LpcFrame::new(2)))
    }

    /// Two-pole resonator at `frequency` with pole radius `radius`
    fn resonator(frequency: f64, radius: f64, sample_rate: f64) -> LpcFrame {
        let theta = 2.0 * PI * frequency / sample_rate;
        LpcFrame {
            coefficients: vec![-2.0 * radius * theta.cos(), radius * radius],
            gain: 1.0,
        }
    }

    fn envelopes(lpc: &SampledFrames<LpcFrame>, bins: usize) -> (SampledFrames<Vec<f64>>, crate::AnalysisReport) {
        let sound = Sound::create_silence(1.0, 8000.0);
        let envelope = LpcSpectralEnvelope::new(lpc, bins, 8000.0).unwrap();
        let destination = SampledFrames::filled(*lpc.domain(), vec![f64::NAN; bins]);
        let mut workspace = AnalysisWorkspace::new(&sound, destination, 0.025, WindowShape::Hanning).unwrap();
        workspace.init_scratch_pool(&envelope.scratch_declarations()).unwrap();
        let report = workspace.run_sampled(&envelope).unwrap();
        (workspace.into_destination(), report)
    }

    #[test]
    fn test_flat_filter_gives_flat_envelope() {
        let flat = LpcFrame {
            coefficients: vec![0.0, 0.0],
            gain: 0.01,
        };
        let lpc = lpc_frames(vec![flat; 10]);
        let (result, report) = envelopes(&lpc, 33);
        assert!(report.is_complete());
        for frame in result.frames() {
            assert_eq!(frame.len(), 33);
            for &v in frame {
                assert_relative_eq!(v, -20.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_resonator_peak() {
        let lpc = lpc_frames((0..10).map(|i| resonator(500.0 + 250.0 * i as f64, 0.98, 8000.0)).collect());
        let (result, _) = envelopes(&lpc, 257);
        let envelope = LpcSpectralEnvelope::new(&lpc, 257, 8000.0).unwrap();

        for (i, frame) in result.frames().iter().enumerate() {
            let peak = frame
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(bin, _)| bin)
                .unwrap();
            let expected = 500.0 + 250.0 * i as f64;
            assert!((envelope.bin_frequency(peak) - expected).abs() < 50.0);
        }
    }

    #[test]
    fn test_undefined_lpc_frames_fail() {
        let mut frames = vec![resonator(1000.0, 0.9, 8000.0); 10];
        frames[3] = LpcFrame::new(2);
        frames[8].gain = 0.0;
        let lpc = lpc_frames(frames);
        let (result, report) = envelopes(&lpc, 17);

        assert_eq!(report.failed_indices(), vec![3, 8]);
        assert!(matches!(report.failures()[1].error, FrameError::SilentFrame));
        assert!(result.frames()[3].is_undefined());
        assert!(!result.frames()[4].is_undefined());
    }

    #[test]
    fn test_destination_grid_must_match() {
        let lpc = lpc_frames(vec![resonator(1000.0, 0.9, 8000.0); 10]);
        let envelope = LpcSpectralEnvelope::new(&lpc, 17, 8000.0).unwrap();
        let sound = Sound::create_silence(1.0, 8000.0);

        let other = SampledDomain::new(0.0, 1.0, 9, 0.1, 0.05).unwrap();
        let mut workspace =
            AnalysisWorkspace::new(&sound, SampledFrames::filled(other, vec![0.0; 17]), 0.025, WindowShape::Hanning)
                .unwrap();
        workspace.init_scratch_pool(&envelope.scratch_declarations()).unwrap();
        assert!(matches!(
            workspace.run_sampled(&envelope),
            Err(PraatError::DomainMismatch { field: "nx", .. })
        ));
    }

    #[test]
    fn test_parameters() {
        let lpc = lpc_frames(vec![]);
        assert!(LpcSpectralEnvelope::new(&lpc, 1, 8000.0).is_err());
        assert!(LpcSpectralEnvelope::new(&lpc, 16, 0.0).is_err());
        let envelope = LpcSpectralEnvelope::new(&lpc, 5, 8000.0).unwrap();
        assert_relative_eq!(envelope.bin_frequency(4), 4000.0);
    }
}
