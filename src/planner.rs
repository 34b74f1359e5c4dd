//! Thread planning: dividing the frames of an analysis over workers
//!
//! Frames go out in contiguous blocks, in increasing frame order, one block
//! per worker. The planner never errors: out-of-range settings are clamped
//! and the result always covers every frame exactly once.

use std::fmt;
use std::ops::Range;

use tracing::debug;

use crate::settings::AnalysisSettings;

/// A contiguous run of frames handled by one worker
///
/// Stored as a half-open range of 0-based frame indices. `Display` uses the
/// 1-based inclusive notation of frame numbers, e.g. `[1, 250]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBlock {
    start: usize,
    end: usize,
}

impl FrameBlock {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// First frame index (0-based, inclusive)
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last frame index
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for FrameBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start + 1, self.end)
    }
}

/// How the frames of one run are divided over worker threads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPlan {
    blocks: Vec<FrameBlock>,
}

impl ThreadPlan {
    /// All frames on one thread (no thread at all for zero frames)
    pub fn single(total_frames: usize) -> Self {
        Self::balanced(total_frames, 1)
    }

    /// `total_frames` split over `number_of_threads` blocks whose sizes
    /// differ by at most one; the larger blocks come last.
    fn balanced(total_frames: usize, number_of_threads: usize) -> Self {
        if total_frames == 0 {
            return Self { blocks: Vec::new() };
        }
        let number_of_threads = number_of_threads.clamp(1, total_frames);
        let base = total_frames / number_of_threads;
        let remainder = total_frames % number_of_threads;
        let first_larger = number_of_threads - remainder;

        let mut blocks = Vec::with_capacity(number_of_threads);
        let mut start = 0;
        for ithread in 0..number_of_threads {
            let len = base + usize::from(ithread >= first_larger);
            blocks.push(FrameBlock::new(start, start + len));
            start += len;
        }
        debug_assert_eq!(start, total_frames);
        Self { blocks }
    }

    pub fn number_of_threads(&self) -> usize {
        self.blocks.len()
    }

    /// Nominal frames per thread: the size of the largest block
    pub fn frames_per_thread(&self) -> usize {
        self.blocks.iter().map(FrameBlock::len).max().unwrap_or(0)
    }

    pub fn total_frames(&self) -> usize {
        self.blocks.last().map_or(0, FrameBlock::end)
    }

    pub fn blocks(&self) -> &[FrameBlock] {
        &self.blocks
    }
}

impl fmt::Display for ThreadPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames on {} thread(s):",
            self.total_frames(),
            self.number_of_threads()
        )?;
        for block in &self.blocks {
            write!(f, " {}", block)?;
        }
        Ok(())
    }
}

/// Decide how many workers to use and which frames each one gets
///
/// # Arguments
/// * `total_frames` - Number of frames in the destination
/// * `settings` - Thread limit and frames-per-thread bounds
/// * `hardware_concurrency` - Used when the settings ask for automatic thread count
///
/// # Algorithm
/// Below the minimum block size, or when only one thread is allowed, all
/// frames go to a single thread. Otherwise the plan uses as many threads as
/// the limit allows while every block keeps at least `min` frames. Blocks
/// only exceed `max` when the thread limit makes that unavoidable.
///
/// # Example
/// ```
/// use praatfan_workspace::{compute_thread_plan, AnalysisSettings};
///
/// let settings = AnalysisSettings::default()
///     .with_max_threads(4)
///     .with_frames_per_thread(100, 500);
/// let plan = compute_thread_plan(1000, &settings, 8);
/// assert_eq!(plan.number_of_threads(), 4);
/// assert_eq!(plan.frames_per_thread(), 250);
/// ```
pub fn compute_thread_plan(
    total_frames: usize,
    settings: &AnalysisSettings,
    hardware_concurrency: usize,
) -> ThreadPlan {
    let limit = settings.thread_limit(hardware_concurrency);
    let (min_frames, max_frames) = settings.frames_per_thread_bounds();

    if limit <= 1 || total_frames < min_frames {
        return ThreadPlan::single(total_frames);
    }

    let number_of_threads = limit.min(total_frames / min_frames).min(total_frames);
    let plan = ThreadPlan::balanced(total_frames, number_of_threads);
    if plan.frames_per_thread() > max_frames {
        debug!(
            "{} threads cannot keep blocks within {} frames; using {} per thread",
            number_of_threads,
            max_frames,
            plan.frames_per_thread()
        );
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(max_threads: usize, min: usize, max: usize) -> AnalysisSettings {
        AnalysisSettings::default()
            .with_max_threads(max_threads)
            .with_frames_per_thread(min, max)
    }

    #[test]
    fn test_even_split() {
        let plan = compute_thread_plan(1000, &settings(4, 100, 500), 8);
        assert_eq!(plan.number_of_threads(), 4);
        assert_eq!(
            plan.blocks(),
            &[
                FrameBlock::new(0, 250),
                FrameBlock::new(250, 500),
                FrameBlock::new(500, 750),
                FrameBlock::new(750, 1000),
            ]
        );
        assert_eq!(plan.to_string(), "1000 frames on 4 thread(s): [1, 250] [251, 500] [501, 750] [751, 1000]");
    }

    #[test]
    fn test_below_minimum_is_single_thread() {
        let plan = compute_thread_plan(50, &settings(4, 100, 500), 8);
        assert_eq!(plan.number_of_threads(), 1);
        assert_eq!(plan.blocks(), &[FrameBlock::new(0, 50)]);
        assert_eq!(plan.blocks()[0].to_string(), "[1, 50]");
    }

    #[test]
    fn test_single_frame() {
        for s in [
            settings(1, 1, 1),
            settings(64, 1, 0),
            settings(0, 0, 0),
            AnalysisSettings::single_threaded(),
        ] {
            let plan = compute_thread_plan(1, &s, 32);
            assert_eq!(plan.number_of_threads(), 1);
            assert_eq!(plan.frames_per_thread(), 1);
        }
    }

    #[test]
    fn test_no_frames() {
        let plan = compute_thread_plan(0, &settings(4, 10, 100), 8);
        assert_eq!(plan.number_of_threads(), 0);
        assert_eq!(plan.frames_per_thread(), 0);
        assert_eq!(plan.total_frames(), 0);
    }

    #[test]
    fn test_multithreading_disabled() {
        let s = settings(8, 1, 10).with_multithreading(false);
        let plan = compute_thread_plan(1000, &s, 8);
        assert_eq!(plan.number_of_threads(), 1);
        assert_eq!(plan.frames_per_thread(), 1000);
    }

    #[test]
    fn test_remainder_goes_to_last_threads() {
        let plan = compute_thread_plan(1003, &settings(4, 100, 500), 8);
        let lengths: Vec<usize> = plan.blocks().iter().map(FrameBlock::len).collect();
        assert_eq!(lengths, vec![250, 251, 251, 251]);
    }

    #[test]
    fn test_minimum_limits_thread_count() {
        // 16 threads allowed, but only 3 blocks of >= 100 frames fit
        let plan = compute_thread_plan(399, &settings(16, 100, 0), 16);
        assert_eq!(plan.number_of_threads(), 3);
        assert!(plan.blocks().iter().all(|b| b.len() >= 100));
    }

    #[test]
    fn test_automatic_thread_count_uses_hardware() {
        let plan = compute_thread_plan(10_000, &settings(0, 40, 0), 6);
        assert_eq!(plan.number_of_threads(), 6);
    }

    #[test]
    fn test_maximum_exceeded_only_when_unavoidable() {
        // 2 threads can't hold 5000 frames in blocks of <= 500
        let plan = compute_thread_plan(5000, &settings(2, 100, 500), 8);
        assert_eq!(plan.number_of_threads(), 2);
        assert_eq!(plan.frames_per_thread(), 2500);
    }
}
