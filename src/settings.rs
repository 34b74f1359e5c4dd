//! Sampled data analysis settings
//!
//! The threading knobs of an analysis, as an explicit immutable value. A
//! workspace copies its settings at construction; nothing reads ambient
//! global state during a run.

use serde::{Deserialize, Serialize};

/// Praat's default minimum number of frames handed to one thread
pub const DEFAULT_MIN_FRAMES_PER_THREAD: usize = 40;

/// Threading configuration for sampled analyses
///
/// `max_threads == 0` means "as many as the hardware offers" and
/// `max_frames_per_thread == 0` means "no upper bound".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub use_multithreading: bool,
    pub max_threads: usize,
    pub min_frames_per_thread: usize,
    pub max_frames_per_thread: usize,
    /// Log timing and threading details of each run
    pub extra_analysis_info: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            use_multithreading: true,
            max_threads: 0,
            min_frames_per_thread: DEFAULT_MIN_FRAMES_PER_THREAD,
            max_frames_per_thread: 0,
            extra_analysis_info: false,
        }
    }
}

impl AnalysisSettings {
    /// Settings that always analyse on the calling thread
    pub fn single_threaded() -> Self {
        Self {
            use_multithreading: false,
            ..Self::default()
        }
    }

    pub fn with_multithreading(mut self, enabled: bool) -> Self {
        self.use_multithreading = enabled;
        self
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    pub fn with_frames_per_thread(mut self, min: usize, max: usize) -> Self {
        self.min_frames_per_thread = min;
        self.max_frames_per_thread = max;
        self
    }

    pub fn with_extra_analysis_info(mut self, enabled: bool) -> Self {
        self.extra_analysis_info = enabled;
        self
    }

    /// Upper bound on worker threads after resolving "0 = automatic"
    ///
    /// # Arguments
    /// * `hardware_concurrency` - What the machine offers (at least 1 is assumed)
    pub fn thread_limit(&self, hardware_concurrency: usize) -> usize {
        if !self.use_multithreading {
            return 1;
        }
        match self.max_threads {
            0 => hardware_concurrency.max(1),
            n => n,
        }
    }

    /// Frames-per-thread bounds with out-of-range values clamped
    ///
    /// The minimum is at least 1; the maximum is at least the minimum, with
    /// 0 standing for unbounded.
    pub fn frames_per_thread_bounds(&self) -> (usize, usize) {
        let min = self.min_frames_per_thread.max(1);
        let max = match self.max_frames_per_thread {
            0 => usize::MAX,
            n => n.max(min),
        };
        (min, max)
    }
}

/// Number of threads the hardware can run concurrently
pub fn hardware_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
