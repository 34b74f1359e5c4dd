//! praatfan-workspace: multi-threaded short-time analysis of sounds
//!
//! This library provides the engine that turns a time-domain [`Sound`] into a
//! frame-sampled analysis result (intensity, LPC, spectral slices, ...). Every
//! frame is computed by a caller-supplied operation from a windowed slice of
//! the sound, and frames are spread over worker threads that each own a
//! private block of scratch memory, so the steady state allocates nothing.
//!
//! # Core Types
//!
//! - [`Sound`] - Audio samples with sample rate and time domain
//! - [`SampledFrames`] - Destination container, one slot per analysis frame
//! - [`WindowShape`] - Window shapes and their physical analysis widths
//! - [`AnalysisSettings`] - Threading configuration
//! - [`ThreadPlan`] - How frames are divided over workers
//! - [`WorkvectorPool`] - Per-worker reusable scratch vectors
//! - [`SoundFrameAnalysis`] / [`SampledFrameAnalysis`] - The per-frame extension point
//! - [`AnalysisWorkspace`] - Binds everything together and runs the analysis
//!
//! # Example
//! ```
//! use praatfan_workspace::{
//!     AnalysisWorkspace, IntensityAnalysis, SampledDomain, SampledFrames, Sound, WindowShape,
//! };
//!
//! let sound = Sound::create_tone(220.0, 0.5, 16000.0, 0.1, 0.0);
//! let domain = SampledDomain::short_term_analysis(&sound, 0.04, 0.01).unwrap();
//! let destination = SampledFrames::filled(domain, f64::NAN);
//!
//! let analysis = IntensityAnalysis::new();
//! let mut workspace =
//!     AnalysisWorkspace::new(&sound, destination, 0.04, WindowShape::Hanning).unwrap();
//! workspace.init_scratch_pool_for(&analysis).unwrap();
//!
//! let report = workspace.run(&analysis, 0.0).unwrap();
//! assert!(report.is_complete());
//! ```

pub mod sound;
pub mod window;
pub mod sampled;
pub mod settings;
pub mod planner;
pub mod pool;
pub mod operation;
pub mod workspace;

pub mod analyses;

// Re-export main types at crate root
pub use sound::Sound;
pub use window::{physical_analysis_width, WindowShape};
pub use sampled::{AnalysisFrame, SampledDomain, SampledFrames};
pub use settings::AnalysisSettings;
pub use planner::{compute_thread_plan, FrameBlock, ThreadPlan};
pub use pool::{ScratchSlot, VectorDeclaration, WorkvectorPool};
pub use operation::{FrameResult, SampledFrameAnalysis, SoundFrame, SoundFrameAnalysis};
pub use workspace::{AnalysisReport, AnalysisWorkspace, FrameFailure, WorkspaceState};
pub use analyses::{BurgLpcAnalysis, IntensityAnalysis, LpcFrame, LpcSpectralEnvelope};

use thiserror::Error;

/// Errors that can occur while configuring or running an analysis
///
/// Everything except [`PraatError::ThreadSpawn`],
/// [`PraatError::WorkerPanicked`] and [`PraatError::OutOfMemory`] is a caller
/// contract violation and is reported before any worker is started.
#[derive(Error, Debug)]
pub enum PraatError {
    #[error("Invalid window shape: {0}")]
    InvalidWindowShape(String),

    #[error("Invalid analysis width: {0} s (must be positive and fit in the sound)")]
    InvalidWidth(f64),

    #[error("Sound does not match the workspace domain: {field} is {found}, expected {expected}")]
    DomainMismatch {
        field: &'static str,
        expected: f64,
        found: f64,
    },

    #[error("Scratch slot {slot} out of range (pool has {slots} slots)")]
    SlotOutOfRange { slot: usize, slots: usize },

    #[error("Unknown scratch vector declaration: {0}")]
    UnknownDeclaration(String),

    #[error("Scratch vector declared twice: {0}")]
    DuplicateDeclaration(String),

    #[error("Scratch vector {name} holds {capacity} values, {requested} requested")]
    ScratchTooSmall {
        name: String,
        requested: usize,
        capacity: usize,
    },

    #[error("Workspace is {found:?}, operation requires {expected:?}")]
    InvalidState {
        expected: WorkspaceState,
        found: WorkspaceState,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Failed to spawn analysis worker: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    #[error("Analysis worker {worker} panicked")]
    WorkerPanicked { worker: usize },

    #[error("Out of memory: {0}")]
    OutOfMemory(String),
}

pub type Result<T> = std::result::Result<T, PraatError>;

/// Failure of a single frame's analysis
///
/// A frame error never aborts a run: the frame is marked undefined in the
/// destination and the failure is listed in the [`AnalysisReport`].
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame is silent")]
    SilentFrame,

    #[error("degenerate frame: {0}")]
    Degenerate(String),

    #[error("no convergence: {0}")]
    NonConvergence(String),

    #[error("insufficient data: {available} samples available, {required} required")]
    InsufficientData { available: usize, required: usize },

    #[error("scratch access failed: {0}")]
    Scratch(#[from] PraatError),
}
