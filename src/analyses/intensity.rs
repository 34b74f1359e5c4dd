//! Intensity (loudness) of each frame, in dB re the hearing threshold
//!
//! Each frame's mean power is weighted by the squared taper, so a steady
//! signal reads the same with every window shape:
//!
//! - power = sum((w * x)^2) / sum(w^2)
//! - intensity = 10 * log10(power / (2e-5)^2), floored at -300 dB

use crate::operation::{FrameResult, SoundFrame, SoundFrameAnalysis};
use crate::pool::ScratchSlot;

/// Reference pressure for dB SPL calculation (2×10⁻⁵ Pa)
const REFERENCE_PRESSURE: f64 = 2e-5;

/// Value written for frames without energy
pub const MINIMUM_INTENSITY: f64 = -300.0;

/// Short-term intensity contour
#[derive(Debug, Clone, Copy, Default)]
pub struct IntensityAnalysis;

impl IntensityAnalysis {
    pub fn new() -> Self {
        Self
    }
}

/// Convert a power in Pa² to dB re the hearing threshold
pub fn power_to_db(power: f64) -> f64 {
    let hearing_threshold = REFERENCE_PRESSURE * REFERENCE_PRESSURE;
    let relative = power / hearing_threshold;
    if relative < 1.0e-30 {
        MINIMUM_INTENSITY
    } else {
        10.0 * relative.log10()
    }
}

impl SoundFrameAnalysis for IntensityAnalysis {
    type Frame = f64;

    fn analyse_sound_frame(
        &self,
        frame: &SoundFrame<'_>,
        output: &mut f64,
        _scratch: &mut ScratchSlot<'_>,
    ) -> FrameResult {
        let sumxw: f64 = frame.samples().iter().map(|s| s * s).sum();
        let sumw: f64 = frame.window().iter().map(|w| w * w).sum();

        let power = if sumw > 0.0 { sumxw / sumw } else { 0.0 };
        *output = power_to_db(power);
        Ok(())
    }
}
