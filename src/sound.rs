//! Sound type: the time-domain signal an analysis reads from
//!
//! A Sound is a mono sequence of samples on a regular time grid. It follows
//! Praat's `Sampled` conventions: the domain is `[xmin, xmax]`, samples are
//! spaced `dx = 1 / sample_rate` apart and the first sample is centred at
//! `x1 = xmin + 0.5 * dx`.

use std::f64::consts::PI;

use crate::{PraatError, Result};

/// Audio samples with associated sample rate and timing information
#[derive(Debug, Clone, PartialEq)]
pub struct Sound {
    /// Audio samples (mono)
    samples: Vec<f64>,
    /// Sample rate in Hz
    sample_rate: f64,
    /// Start of the time domain (xmin)
    start_time: f64,
}

impl Sound {
    /// Create a Sound from raw samples
    ///
    /// # Example
    /// ```
    /// use praatfan_workspace::Sound;
    ///
    /// let sound = Sound::from_samples(&[0.0, 0.5, 1.0, 0.5], 8000.0);
    /// assert_eq!(sound.num_samples(), 4);
    /// assert_eq!(sound.xmax(), 4.0 / 8000.0);
    /// ```
    pub fn from_samples(samples: &[f64], sample_rate: f64) -> Self {
        Self::from_samples_owned(samples.to_vec(), sample_rate)
    }

    /// Create a Sound from owned samples (avoids cloning)
    pub fn from_samples_owned(samples: Vec<f64>, sample_rate: f64) -> Self {
        Self {
            samples,
            sample_rate,
            start_time: 0.0,
        }
    }

    /// Move the time domain so that it starts at `xmin`
    pub fn with_start_time(mut self, xmin: f64) -> Self {
        self.start_time = xmin;
        self
    }

    /// Create a pure tone (sine wave)
    ///
    /// # Arguments
    /// * `frequency` - Frequency in Hz
    /// * `duration` - Duration in seconds
    /// * `sample_rate` - Sample rate in Hz
    /// * `amplitude` - Peak amplitude
    /// * `phase` - Initial phase in radians
    pub fn create_tone(
        frequency: f64,
        duration: f64,
        sample_rate: f64,
        amplitude: f64,
        phase: f64,
    ) -> Sound {
        let n_samples = (duration * sample_rate).round() as usize;
        let omega = 2.0 * PI * frequency / sample_rate;

        let samples = (0..n_samples)
            .map(|i| amplitude * (omega * i as f64 + phase).sin())
            .collect();

        Self::from_samples_owned(samples, sample_rate)
    }

    /// Create silence
    pub fn create_silence(duration: f64, sample_rate: f64) -> Sound {
        let n_samples = (duration * sample_rate).round() as usize;
        Self::from_samples_owned(vec![0.0; n_samples], sample_rate)
    }

    /// Get the sample rate in Hz
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Get a reference to the audio samples
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Get the number of samples (Praat's `nx`)
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Get the total duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate
    }

    /// Start of the time domain
    pub fn xmin(&self) -> f64 {
        self.start_time
    }

    /// End of the time domain (just after the last sample)
    pub fn xmax(&self) -> f64 {
        self.start_time + self.duration()
    }

    /// Get the sample period (time step between samples)
    pub fn dx(&self) -> f64 {
        1.0 / self.sample_rate
    }

    /// Get the time of the first sample centre
    pub fn x1(&self) -> f64 {
        self.start_time + 0.5 * self.dx()
    }

    /// Get the time corresponding to a sample index
    pub fn index_to_time(&self, index: usize) -> f64 {
        self.x1() + index as f64 * self.dx()
    }

    /// Get the nearest sample index for a time
    ///
    /// May lie outside the valid range if the time is outside the domain.
    pub fn time_to_index(&self, time: f64) -> isize {
        ((time - self.x1()) / self.dx()).round() as isize
    }

    /// Check that `other` lies on exactly the same time grid as `self`
    ///
    /// Compares `xmin`, `xmax`, `nx`, `dx` and `x1` for exact equality; a
    /// workspace bound to `self` can only analyse sounds that pass this check.
    pub fn check_same_domain(&self, other: &Sound) -> Result<()> {
        let checks = [
            ("xmin", self.xmin(), other.xmin()),
            ("xmax", self.xmax(), other.xmax()),
            ("nx", self.num_samples() as f64, other.num_samples() as f64),
            ("dx", self.dx(), other.dx()),
            ("x1", self.x1(), other.x1()),
        ];
        for (field, expected, found) in checks {
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

    /// Apply pre-emphasis filter
    ///
    /// The filter is: y[n] = x[n] - alpha * x[n-1]
    /// where alpha = exp(-2 * pi * from_frequency * dx)
    pub fn pre_emphasis(&self, from_frequency: f64) -> Sound {
        let mut filtered = Sound::from_samples_owned(Vec::new(), self.sample_rate);
        self.pre_emphasis_into(from_frequency, &mut filtered);
        filtered
    }

    /// Apply pre-emphasis into an existing Sound, reusing its sample storage
    ///
    /// `target` takes over this sound's time grid. Once `target` has held a
    /// sound of this length no further allocation happens.
    pub fn pre_emphasis_into(&self, from_frequency: f64, target: &mut Sound) {
        target.sample_rate = self.sample_rate;
        target.start_time = self.start_time;
        target.samples.clear();
        target.samples.extend_from_slice(&self.samples);

        let alpha = (-2.0 * PI * from_frequency * self.dx()).exp();
        for i in (1..target.samples.len()).rev() {
            target.samples[i] -= alpha * target.samples[i - 1];
        }
    }

    /// Get the root-mean-square (RMS) amplitude
    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.samples.iter().map(|&s| s * s).sum();
        (sum_sq / self.samples.len() as f64).sqrt()
    }
}
