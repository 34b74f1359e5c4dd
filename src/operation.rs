//! Frame analysis operations: the extension point of the engine
//!
//! Every concrete analysis implements one of two traits:
//!
//! - [`SoundFrameAnalysis`] receives a windowed slice of the bound sound.
//!   The workspace does the slicing and tapering, so all sound-based
//!   analyses share the exact same windowing.
//! - [`SampledFrameAnalysis`] works on already-sampled data that the
//!   operation carries itself (e.g. turning LPC frames into spectra).
//!
//! Both write exactly one destination frame per call and may only touch the
//! scratch slot they are given.

use crate::pool::{try_zeroed, ScratchSlot, VectorDeclaration};
use crate::sampled::{AnalysisFrame, SampledDomain};
use crate::window::WindowShape;
use crate::{FrameError, PraatError, Result, Sound};

/// Outcome of analysing one frame
pub type FrameResult = std::result::Result<(), FrameError>;

/// A windowed slice of the sound, centred on one analysis frame
#[derive(Debug, Clone, Copy)]
pub struct SoundFrame<'a> {
    index: usize,
    time: f64,
    samples: &'a [f64],
    window: &'a [f64],
    sample_rate: f64,
    in_range: usize,
}

impl<'a> SoundFrame<'a> {
    /// Frame index in the destination (0-based)
    pub fn index(&self) -> usize {
        self.index
    }

    /// Time of the frame centre
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Tapered samples
    pub fn samples(&self) -> &'a [f64] {
        self.samples
    }

    /// The taper that was applied to [`SoundFrame::samples`]
    pub fn window(&self) -> &'a [f64] {
        self.window
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Number of samples that came from inside the sound (the rest is zero padding)
    pub fn in_range(&self) -> usize {
        self.in_range
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Per-frame analysis of a windowed slice of a sound
pub trait SoundFrameAnalysis: Sync {
    /// What one destination frame holds
    type Frame: AnalysisFrame;

    /// Scratch vectors needed to analyse a frame of `window_samples` samples
    fn scratch_declarations(&self, _window_samples: usize) -> Vec<VectorDeclaration> {
        Vec::new()
    }

    /// Analyse one frame into `output`
    fn analyse_sound_frame(
        &self,
        frame: &SoundFrame<'_>,
        output: &mut Self::Frame,
        scratch: &mut ScratchSlot<'_>,
    ) -> FrameResult;
}

/// Per-frame analysis of already-sampled data
pub trait SampledFrameAnalysis: Sync {
    type Frame: AnalysisFrame;

    fn scratch_declarations(&self) -> Vec<VectorDeclaration> {
        Vec::new()
    }

    /// Verify the destination grid fits this operation's input
    fn check_destination(&self, _domain: &SampledDomain) -> Result<()> {
        Ok(())
    }

    /// Analyse frame `index` into `output`
    fn analyse_frame(
        &self,
        index: usize,
        output: &mut Self::Frame,
        scratch: &mut ScratchSlot<'_>,
    ) -> FrameResult;
}

/// Cuts windowed frames out of a sound
///
/// Holds the taper once; every frame is written into a caller-provided
/// buffer of [`SoundFrameExtractor::window_samples`] values.
#[derive(Debug, Clone)]
pub struct SoundFrameExtractor {
    window: Vec<f64>,
    shape: WindowShape,
    subtract_mean: bool,
}

/// Samples in a frame of `physical_width` seconds, at least 1
///
/// `None` if the count does not fit in `usize`.
pub fn window_sample_count(physical_width: f64, sample_rate: f64) -> Option<usize> {
    // floor(width / dx), tolerating representation error in the product
    let count = (physical_width * sample_rate * (1.0 + 1e-12)).floor();
    if !(count < usize::MAX as f64) {
        return None;
    }
    Some((count as usize).max(1))
}

impl SoundFrameExtractor {
    /// Prepare an extractor reading `physical_width` seconds of a sound sampled at `sample_rate`
    ///
    /// # Errors
    /// [`PraatError::InvalidWidth`] if the sample count is not representable,
    /// [`PraatError::OutOfMemory`] if the taper cannot be allocated.
    pub fn new(physical_width: f64, sample_rate: f64, shape: WindowShape) -> Result<Self> {
        let window_samples =
            window_sample_count(physical_width, sample_rate).ok_or(PraatError::InvalidWidth(physical_width))?;
        let mut window = try_zeroed(window_samples, "analysis window")?;
        shape.fill(&mut window);
        Ok(Self {
            window,
            shape,
            subtract_mean: false,
        })
    }

    /// Remove the mean of the in-range samples before tapering
    pub fn set_subtract_mean(&mut self, subtract_mean: bool) {
        self.subtract_mean = subtract_mean;
    }

    pub fn subtract_mean(&self) -> bool {
        self.subtract_mean
    }

    pub fn shape(&self) -> WindowShape {
        self.shape
    }

    pub fn window(&self) -> &[f64] {
        &self.window
    }

    pub fn window_samples(&self) -> usize {
        self.window.len()
    }

    /// Fill `buffer` with the tapered frame centred at `time`
    ///
    /// The frame consists of the `window_samples` samples nearest to `time`;
    /// positions outside the sound read as zero. Returns how many samples
    /// came from inside the sound.
    pub fn extract(&self, sound: &Sound, time: f64, buffer: &mut [f64]) -> usize {
        debug_assert_eq!(buffer.len(), self.window.len());
        let samples = sound.samples();
        let n = self.window.len();

        let centre = (time - sound.x1()) / sound.dx();
        let first = (centre - 0.5 * (n as f64 - 1.0)).round() as isize;

        // in-range part of the frame: buffer[lo..hi] <- samples[first + lo..first + hi]
        let lo = (-first).clamp(0, n as isize) as usize;
        let hi = (samples.len() as isize - first).clamp(lo as isize, n as isize) as usize;

        buffer[..lo].fill(0.0);
        buffer[hi..].fill(0.0);
        if hi > lo {
            let start = (first + lo as isize) as usize;
            buffer[lo..hi].copy_from_slice(&samples[start..start + (hi - lo)]);
        }

        if self.subtract_mean && hi > lo {
            let mean = buffer[lo..hi].iter().sum::<f64>() / (hi - lo) as f64;
            for s in &mut buffer[lo..hi] {
                *s -= mean;
            }
        }

        for (s, &w) in buffer.iter_mut().zip(&self.window) {
            *s *= w;
        }

        hi - lo
    }

    /// Build the view handed to a [`SoundFrameAnalysis`]
    pub fn frame<'a>(
        &'a self,
        index: usize,
        time: f64,
        sample_rate: f64,
        samples: &'a [f64],
        in_range: usize,
    ) -> SoundFrame<'a> {
        SoundFrame {
            index,
            time,
            samples,
            window: &self.window,
            sample_rate,
            in_range,
        }
    }
}
