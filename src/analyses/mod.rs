//! Reference frame analyses built on the workspace
//!
//! - [`IntensityAnalysis`] - window-weighted power in dB
//! - [`BurgLpcAnalysis`] - linear prediction coefficients by Burg's method
//! - [`LpcSpectralEnvelope`] - LPC frames to smoothed spectra (sampled-to-sampled)

pub mod envelope;
pub mod intensity;
pub mod lpc;

pub use envelope::LpcSpectralEnvelope;
pub use intensity::IntensityAnalysis;
pub use lpc::{BurgLpcAnalysis, LpcFrame};
