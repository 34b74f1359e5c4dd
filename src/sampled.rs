//! Sampled containers: the destination side of an analysis
//!
//! A [`SampledFrames`] holds one value per analysis frame on a regular time
//! grid described by a [`SampledDomain`]. Frames are independent slots, which
//! is what lets workers fill disjoint parts of the container concurrently.

use crate::{PraatError, Result, Sound};

/// Time grid of a frame-sampled object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampledDomain {
    /// Start of the time domain
    pub xmin: f64,
    /// End of the time domain
    pub xmax: f64,
    /// Number of frames
    pub nx: usize,
    /// Time step between frame centres
    pub dx: f64,
    /// Time of the first frame centre
    pub x1: f64,
}

impl SampledDomain {
    /// Create a domain, validating that `nx` frames of spacing `dx` fit
    pub fn new(xmin: f64, xmax: f64, nx: usize, dx: f64, x1: f64) -> Result<Self> {
        if !(xmax > xmin) {
            return Err(PraatError::InvalidParameter(format!(
                "xmax ({}) must be greater than xmin ({})",
                xmax, xmin
            )));
        }
        if !dx.is_finite() || dx <= 0.0 {
            return Err(PraatError::InvalidParameter(format!(
                "frame step must be positive, got {}",
                dx
            )));
        }
        Ok(Self {
            xmin,
            xmax,
            nx,
            dx,
            x1,
        })
    }

    /// Frame layout for a short-term analysis of `sound`
    ///
    /// Fits as many frames of `window_duration` as possible into the sound,
    /// `time_step` apart, and centres the frame train in the sound's domain:
    ///
    /// - numberOfFrames = floor((duration - windowDuration) / timeStep) + 1
    /// - x1 = midTime - 0.5 * (numberOfFrames - 1) * timeStep
    ///
    /// # Errors
    /// [`PraatError::InvalidParameter`] if the step is not positive or the
    /// window is longer than the sound.
    pub fn short_term_analysis(sound: &Sound, window_duration: f64, time_step: f64) -> Result<Self> {
        if !time_step.is_finite() || time_step <= 0.0 {
            return Err(PraatError::InvalidParameter(format!(
                "time step must be positive, got {}",
                time_step
            )));
        }
        let my_duration = sound.duration();
        if !(window_duration > 0.0) || window_duration > my_duration {
            return Err(PraatError::InvalidParameter(format!(
                "window of {} s does not fit in a sound of {} s",
                window_duration, my_duration
            )));
        }

        let nx = ((my_duration - window_duration) / time_step).floor() as usize + 1;
        let our_mid_time = sound.xmin() + 0.5 * my_duration;
        let thy_duration = nx as f64 * time_step;
        let x1 = our_mid_time - 0.5 * thy_duration + 0.5 * time_step;

        Self::new(sound.xmin(), sound.xmax(), nx, time_step, x1)
    }

    /// Time of the centre of frame `index` (0-based)
    pub fn index_to_x(&self, index: usize) -> f64 {
        self.x1 + index as f64 * self.dx
    }

    /// Nearest frame index for a time, if it falls on the grid
    pub fn x_to_index(&self, x: f64) -> Option<usize> {
        let position = ((x - self.x1) / self.dx).round();
        if position < 0.0 || position >= self.nx as f64 {
            return None;
        }
        Some(position as usize)
    }
}

/// A frame value that can be marked as undefined when its analysis fails
pub trait AnalysisFrame: Send {
    /// Overwrite the frame with an "undefined" sentinel
    fn set_undefined(&mut self);

    /// Whether the frame currently holds the sentinel
    fn is_undefined(&self) -> bool;
}

impl AnalysisFrame for f64 {
    fn set_undefined(&mut self) {
        *self = f64::NAN;
    }

    fn is_undefined(&self) -> bool {
        self.is_nan()
    }
}

impl AnalysisFrame for Vec<f64> {
    fn set_undefined(&mut self) {
        self.fill(f64::NAN);
    }

    /// An empty vector holds no sentinel and counts as defined
    fn is_undefined(&self) -> bool {
        !self.is_empty() && self.iter().all(|v| v.is_nan())
    }
}

/// Frame-indexed destination of an analysis
#[derive(Debug, Clone, PartialEq)]
pub struct SampledFrames<F> {
    domain: SampledDomain,
    frames: Vec<F>,
}

impl<F: Clone> SampledFrames<F> {
    /// Create a container with every frame set to `value`
    ///
    /// Frames that carry their own storage (e.g. coefficient vectors) should
    /// be given at full size here; analyses write into them in place.
    pub fn filled(domain: SampledDomain, value: F) -> Self {
        Self {
            frames: vec![value; domain.nx],
            domain,
        }
    }
}

impl<F> SampledFrames<F> {
    /// Create a container from a per-frame constructor
    pub fn from_fn(domain: SampledDomain, f: impl FnMut(usize) -> F) -> Self {
        Self {
            frames: (0..domain.nx).map(f).collect(),
            domain,
        }
    }

    pub fn domain(&self) -> &SampledDomain {
        &self.domain
    }

    /// Number of frames
    pub fn nx(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[F] {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut [F] {
        &mut self.frames
    }

    pub fn get(&self, index: usize) -> Option<&F> {
        self.frames.get(index)
    }

    /// Time of the centre of frame `index`
    pub fn frame_time(&self, index: usize) -> f64 {
        self.domain.index_to_x(index)
    }

    pub fn into_frames(self) -> Vec<F> {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_short_term_analysis_layout() {
        // 1 s at 10 kHz, 25 ms windows every 10 ms
        let sound = Sound::create_silence(1.0, 10000.0);
        let domain = SampledDomain::short_term_analysis(&sound, 0.025, 0.01).unwrap();

        assert_eq!(domain.nx, 98);
        assert_relative_eq!(domain.dx, 0.01, epsilon = 1e-12);

        // frame train is centred in the sound
        let first = domain.index_to_x(0);
        let last = domain.index_to_x(domain.nx - 1);
        assert_relative_eq!(0.5 * (first + last), 0.5, epsilon = 1e-12);
        assert!(first - 0.0125 >= -1e-12);
        assert!(last + 0.0125 <= 1.0 + 1e-12);
    }

    #[test]
    fn test_short_term_analysis_window_too_long() {
        let sound = Sound::create_silence(0.02, 10000.0);
        assert!(matches!(
            SampledDomain::short_term_analysis(&sound, 0.025, 0.01),
            Err(PraatError::InvalidParameter(_))
        ));
        assert!(SampledDomain::short_term_analysis(&sound, 0.01, 0.0).is_err());
    }

    #[test]
    fn test_x_to_index() {
        let domain = SampledDomain::new(0.0, 1.0, 10, 0.1, 0.05).unwrap();
        assert_eq!(domain.x_to_index(0.05), Some(0));
        assert_eq!(domain.x_to_index(0.96), Some(9));
        assert_eq!(domain.x_to_index(1.2), None);
        assert_eq!(domain.x_to_index(-0.2), None);
    }

    #[test]
    fn test_undefined_frames() {
        let mut value = 3.0;
        value.set_undefined();
        assert!(value.is_undefined());

        let mut coefficients = vec![1.0, 2.0];
        assert!(!coefficients.is_undefined());
        coefficients.set_undefined();
        assert!(coefficients.is_undefined());
        assert_eq!(coefficients.len(), 2);

        let empty: Vec<f64> = Vec::new();
        assert!(!empty.is_undefined());
    }
}
