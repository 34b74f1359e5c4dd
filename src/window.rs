//! Window shapes for short-time analysis
//!
//! A window shape determines two things: the taper that is multiplied into
//! each analysis frame, and how much signal must be read around a frame
//! centre to reach a requested effective analysis width.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{PraatError, Result};

/// Window shapes available for analysis
///
/// The numbered Gaussian and Kaiser variants follow Praat's naming: a higher
/// number means a narrower effective bell inside the same physical span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WindowShape {
    /// Rectangular window (no tapering)
    Rectangular,
    /// Triangular (Bartlett) window
    Triangular,
    /// Parabolic (Welch) window
    Parabolic,
    /// Hanning window (raised cosine)
    #[default]
    Hanning,
    /// Hamming window
    Hamming,
    Gaussian1,
    Gaussian2,
    Gaussian3,
    Gaussian4,
    Gaussian5,
    Kaiser1,
    Kaiser2,
}

impl WindowShape {
    /// All shapes, in tag order
    pub const ALL: [WindowShape; 12] = [
        WindowShape::Rectangular,
        WindowShape::Triangular,
        WindowShape::Parabolic,
        WindowShape::Hanning,
        WindowShape::Hamming,
        WindowShape::Gaussian1,
        WindowShape::Gaussian2,
        WindowShape::Gaussian3,
        WindowShape::Gaussian4,
        WindowShape::Gaussian5,
        WindowShape::Kaiser1,
        WindowShape::Kaiser2,
    ];

    /// Look a shape up by its numeric tag (position in [`WindowShape::ALL`])
    pub fn from_tag(tag: usize) -> Result<Self> {
        Self::ALL
            .get(tag)
            .copied()
            .ok_or_else(|| PraatError::InvalidWindowShape(format!("tag {}", tag)))
    }

    /// Numeric tag of this shape
    pub fn tag(self) -> usize {
        self as usize
    }

    /// Ratio of physical to effective analysis width
    ///
    /// Shapes that taper only mildly need no extra signal; the bell-shaped
    /// ones (Gaussian, Kaiser) and the parabolic window read twice as much.
    pub fn physical_width_factor(self) -> f64 {
        match self {
            WindowShape::Rectangular
            | WindowShape::Triangular
            | WindowShape::Hanning
            | WindowShape::Hamming => 1.0,
            _ => 2.0,
        }
    }

    /// Compute the window value at a normalized position
    ///
    /// # Arguments
    /// * `phase` - Position in the window, normalized to [-0.5, 0.5]
    ///             where 0 is the center
    ///
    /// # Returns
    /// The window amplitude at the given position (0.0 outside the window)
    pub fn value_at(self, phase: f64) -> f64 {
        if phase.abs() > 0.5 {
            return 0.0;
        }

        match self {
            WindowShape::Rectangular => 1.0,
            WindowShape::Triangular => 1.0 - 2.0 * phase.abs(),
            WindowShape::Parabolic => 1.0 - 4.0 * phase * phase,
            WindowShape::Hanning => 0.5 + 0.5 * (2.0 * PI * phase).cos(),
            WindowShape::Hamming => 0.54 + 0.46 * (2.0 * PI * phase).cos(),
            WindowShape::Gaussian1 => gaussian(phase, 1.0),
            WindowShape::Gaussian2 => gaussian(phase, 2.0),
            WindowShape::Gaussian3 => gaussian(phase, 3.0),
            WindowShape::Gaussian4 => gaussian(phase, 4.0),
            WindowShape::Gaussian5 => gaussian(phase, 5.0),
            WindowShape::Kaiser1 => kaiser(phase, 2.0 * PI + 0.5),
            WindowShape::Kaiser2 => kaiser(phase, 2.0 * PI * PI + 0.5),
        }
    }

    /// Fill `window` with this shape, sampled symmetrically over its length
    ///
    /// Writes in place so a window can be computed into preallocated storage.
    pub fn fill(self, window: &mut [f64]) {
        let n = window.len() as f64;
        let imid = 0.5 * (n + 1.0);
        for (i, w) in window.iter_mut().enumerate() {
            let phase = (i as f64 + 1.0 - imid) / n;
            *w = self.value_at(phase);
        }
    }

    /// Generate a complete window of the given size
    pub fn generate(self, size: usize) -> Vec<f64> {
        let mut window = vec![0.0; size];
        self.fill(&mut window);
        window
    }

    fn name(self) -> &'static str {
        match self {
            WindowShape::Rectangular => "rectangular",
            WindowShape::Triangular => "triangular",
            WindowShape::Parabolic => "parabolic",
            WindowShape::Hanning => "Hanning",
            WindowShape::Hamming => "Hamming",
            WindowShape::Gaussian1 => "Gaussian1",
            WindowShape::Gaussian2 => "Gaussian2",
            WindowShape::Gaussian3 => "Gaussian3",
            WindowShape::Gaussian4 => "Gaussian4",
            WindowShape::Gaussian5 => "Gaussian5",
            WindowShape::Kaiser1 => "Kaiser1",
            WindowShape::Kaiser2 => "Kaiser2",
        }
    }
}

impl fmt::Display for WindowShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WindowShape {
    type Err = PraatError;

    /// Parse a shape name, case-insensitively ("Hanning", "hann", "gaussian2", ...)
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        if normalized == "hann" {
            return Ok(WindowShape::Hanning);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|shape| shape.name().to_ascii_lowercase() == normalized)
            .ok_or_else(|| PraatError::InvalidWindowShape(s.to_string()))
    }
}

/// Physical width of signal to read for a given effective analysis width
///
/// # Errors
/// [`PraatError::InvalidWidth`] if `effective_width` is not finite and positive.
///
/// # Example
/// ```
/// use praatfan_workspace::{physical_analysis_width, WindowShape};
///
/// assert_eq!(physical_analysis_width(0.025, WindowShape::Hanning).unwrap(), 0.025);
/// assert_eq!(physical_analysis_width(0.025, WindowShape::Gaussian2).unwrap(), 0.05);
/// ```
pub fn physical_analysis_width(effective_width: f64, shape: WindowShape) -> Result<f64> {
    if !effective_width.is_finite() || effective_width <= 0.0 {
        return Err(PraatError::InvalidWidth(effective_width));
    }
    Ok(effective_width * shape.physical_width_factor())
}

/// Gaussian bell of order k, shifted and scaled to reach zero at the edges
fn gaussian(phase: f64, k: f64) -> f64 {
    let edge = (-3.0 * k * k).exp();
    ((-12.0 * k * k * phase * phase).exp() - edge) / (1.0 - edge)
}

fn kaiser(phase: f64, beta: f64) -> f64 {
    let x = 2.0 * phase;
    let root = (1.0 - x * x).max(0.0).sqrt();
    bessel_i0(beta * root) / bessel_i0(beta)
}

/// Modified Bessel function of order 0 (for Kaiser window)
///
/// Uses polynomial approximation from Abramowitz & Stegun
fn bessel_i0(x: f64) -> f64 {
    let ax = x.abs();

    if ax < 3.75 {
        let y = (x / 3.75).powi(2);
        1.0 + y
            * (3.5156229
                + y * (3.0899424
                    + y * (1.2067492
                        + y * (0.2659732 + y * (0.0360768 + y * 0.0045813)))))
    } else {
        let y = 3.75 / ax;
        (ax.exp() / ax.sqrt())
            * (0.39894228
                + y * (0.01328592
                    + y * (0.00225319
                        + y * (-0.00157565
                            + y * (0.00916281
                                + y * (-0.02057706
                                    + y * (0.02635537
                                        + y * (-0.01647633 + y * 0.00392377))))))))
    }
}
