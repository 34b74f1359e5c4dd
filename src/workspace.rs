//! Analysis workspace: binds a sound, a destination, a scratch pool and an
//! operation, and runs the operation over all frames on worker threads.
//!
//! Lifecycle:
//!
//! ```text
//! new / with_settings      -> Configured
//! init_scratch_pool        -> Ready
//! run / run_sampled        -> Running -> Ready
//! replace_sound            (Ready, domain must match)
//! ```
//!
//! Every worker gets a disjoint mutable sub-slice of the destination frames,
//! its own scratch slot and its own frame buffer, so no frame computation
//! ever shares mutable memory with another worker. Frame buffers are only
//! needed to cut frames from the sound; they are allocated on the first
//! [`AnalysisWorkspace::run`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::operation::{
    window_sample_count, FrameResult, SampledFrameAnalysis, SoundFrameAnalysis, SoundFrameExtractor,
};
use crate::planner::{compute_thread_plan, FrameBlock, ThreadPlan};
use crate::pool::{try_zeroed, ScratchSlot, VectorDeclaration, WorkvectorPool};
use crate::sampled::{AnalysisFrame, SampledDomain, SampledFrames};
use crate::settings::{hardware_concurrency, AnalysisSettings};
use crate::window::{physical_analysis_width, WindowShape};
use crate::{FrameError, PraatError, Result, Sound};

/// Where a workspace is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceState {
    /// Bound to a sound and destination, no scratch pool yet
    Configured,
    /// Scratch pool built; runs may start
    Ready,
    /// A run is in progress
    Running,
}

/// A frame whose analysis failed during a run
#[derive(Debug)]
pub struct FrameFailure {
    /// Frame index (0-based)
    pub index: usize,
    pub error: FrameError,
}

/// Outcome of one run
#[derive(Debug)]
pub struct AnalysisReport {
    number_of_frames: usize,
    number_of_threads: usize,
    failures: Vec<FrameFailure>,
    elapsed: Duration,
}

impl AnalysisReport {
    pub fn number_of_frames(&self) -> usize {
        self.number_of_frames
    }

    /// Workers the run used (0 for an empty destination)
    pub fn number_of_threads(&self) -> usize {
        self.number_of_threads
    }

    /// Failed frames in increasing frame order
    pub fn failures(&self) -> &[FrameFailure] {
        &self.failures
    }

    pub fn failed_frames(&self) -> usize {
        self.failures.len()
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }

    /// Whether every frame was analysed successfully
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fraction of frames analysed successfully (1 for an empty run)
    pub fn success_rate(&self) -> f64 {
        if self.number_of_frames == 0 {
            return 1.0;
        }
        1.0 - self.failures.len() as f64 / self.number_of_frames as f64
    }

    /// Wall-clock duration of the run
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Orchestrates a multi-threaded frame analysis of one sound
///
/// The workspace owns the destination while it is bound; take it back with
/// [`AnalysisWorkspace::into_destination`]. The sound is borrowed and never
/// modified: pre-emphasis works on a private copy.
#[derive(Debug)]
pub struct AnalysisWorkspace<'s, F> {
    sound: &'s Sound,
    destination: SampledFrames<F>,
    effective_width: f64,
    physical_width: f64,
    extractor: SoundFrameExtractor,
    settings: AnalysisSettings,
    hardware_concurrency: usize,
    pool: Option<WorkvectorPool>,
    /// One windowed-frame buffer per scratch slot, built by the first `run`
    frame_buffers: Vec<Vec<f64>>,
    /// Pre-emphasized copy of the sound, reused across runs
    emphasized: Option<Sound>,
    buffer_allocations: usize,
    state: WorkspaceState,
}

impl<'s, F: AnalysisFrame> AnalysisWorkspace<'s, F> {
    /// Bind a sound and a destination with default settings
    pub fn new(
        sound: &'s Sound,
        destination: SampledFrames<F>,
        effective_width: f64,
        window_shape: WindowShape,
    ) -> Result<Self> {
        Self::with_settings(sound, destination, effective_width, window_shape, AnalysisSettings::default())
    }

    /// Bind a sound and a destination
    ///
    /// # Arguments
    /// * `sound` - Signal to analyse
    /// * `destination` - One frame per analysis time; its time domain must equal the sound's
    /// * `effective_width` - Effective analysis window duration in seconds
    /// * `window_shape` - Taper applied to every frame
    /// * `settings` - Threading configuration, fixed for the workspace's lifetime
    ///
    /// # Errors
    /// [`PraatError::InvalidWidth`] for a non-positive width or a window
    /// holding more samples than the sound,
    /// [`PraatError::DomainMismatch`] if the destination does not span the sound,
    /// [`PraatError::OutOfMemory`] if the taper cannot be allocated.
    pub fn with_settings(
        sound: &'s Sound,
        destination: SampledFrames<F>,
        effective_width: f64,
        window_shape: WindowShape,
        settings: AnalysisSettings,
    ) -> Result<Self> {
        let physical_width = physical_analysis_width(effective_width, window_shape)?;

        let domain = destination.domain();
        for (field, expected, found) in [
            ("xmin", domain.xmin, sound.xmin()),
            ("xmax", domain.xmax, sound.xmax()),
        ] {
            if expected != found {
                return Err(PraatError::DomainMismatch {
                    field,
                    expected,
                    found,
                });
            }
        }

        match window_sample_count(physical_width, sound.sample_rate()) {
            Some(samples) if samples <= sound.num_samples() => {}
            _ => return Err(PraatError::InvalidWidth(effective_width)),
        }
        let extractor = SoundFrameExtractor::new(physical_width, sound.sample_rate(), window_shape)?;
        debug!(
            "workspace for {} frames: {} window, effective {} s, physical {} s ({} samples)",
            destination.nx(),
            window_shape,
            effective_width,
            physical_width,
            extractor.window_samples()
        );

        Ok(Self {
            sound,
            destination,
            effective_width,
            physical_width,
            extractor,
            settings,
            hardware_concurrency: hardware_concurrency(),
            pool: None,
            frame_buffers: Vec::new(),
            emphasized: None,
            buffer_allocations: 0,
            state: WorkspaceState::Configured,
        })
    }

    /// Subtract the mean of each frame before tapering
    pub fn set_subtract_frame_mean(&mut self, subtract_mean: bool) {
        self.extractor.set_subtract_mean(subtract_mean);
    }

    /// Build a reusable scratch pool, one slot per worker the plan will use
    ///
    /// Everything is allocated here; runs afterwards do not allocate scratch
    /// memory.
    pub fn init_scratch_pool(&mut self, declarations: &[VectorDeclaration]) -> Result<()> {
        self.build_pool(declarations, true)
    }

    /// Build a pool whose vectors are sized on acquisition
    ///
    /// For operations whose scratch sizes vary from frame to frame.
    pub fn init_lazy_scratch_pool(&mut self, declarations: &[VectorDeclaration]) -> Result<()> {
        self.build_pool(declarations, false)
    }

    /// Build a reusable pool sized for a sound-frame operation
    pub fn init_scratch_pool_for<O: SoundFrameAnalysis>(&mut self, operation: &O) -> Result<()> {
        let declarations = operation.scratch_declarations(self.extractor.window_samples());
        self.init_scratch_pool(&declarations)
    }

    fn build_pool(&mut self, declarations: &[VectorDeclaration], reusable: bool) -> Result<()> {
        self.require(WorkspaceState::Configured)?;

        let slots = self.thread_plan().number_of_threads().max(1);
        let pool = WorkvectorPool::new(declarations, slots, reusable)?;

        debug!(
            "scratch pool: {} slot(s), {} declaration(s), {} values{}",
            slots,
            declarations.len(),
            pool.capacity(),
            if reusable { "" } else { " (lazy)" }
        );
        self.pool = Some(pool);
        self.state = WorkspaceState::Ready;
        Ok(())
    }

    /// Bind another sound with exactly the same time grid
    ///
    /// The pool, frame buffers and pre-emphasis copy are kept, so analysing
    /// a series of same-shaped sounds allocates nothing after the first run.
    ///
    /// # Errors
    /// [`PraatError::InvalidState`] before the pool is built,
    /// [`PraatError::DomainMismatch`] if `xmin`, `xmax`, `nx`, `dx` or `x1`
    /// differ. The workspace is unchanged on error.
    pub fn replace_sound(&mut self, sound: &'s Sound) -> Result<()> {
        self.require(WorkspaceState::Ready)?;
        self.sound.check_same_domain(sound)?;
        self.sound = sound;
        Ok(())
    }

    /// Analyse every frame with a sound-frame operation
    ///
    /// With `pre_emphasis_frequency > 0` the frames are cut from a
    /// pre-emphasized copy of the sound. Frames whose analysis fails are set
    /// undefined and listed in the report; they never abort the run.
    ///
    /// # Errors
    /// Configuration errors before any worker starts;
    /// [`PraatError::OutOfMemory`] if the frame buffers cannot be allocated;
    /// [`PraatError::ThreadSpawn`] or [`PraatError::WorkerPanicked`] if a
    /// worker could not run to completion, in which case the destination
    /// contents are unspecified. The workspace is `Ready` again afterwards.
    pub fn run<O>(&mut self, operation: &O, pre_emphasis_frequency: f64) -> Result<AnalysisReport>
    where
        O: SoundFrameAnalysis<Frame = F>,
    {
        if !pre_emphasis_frequency.is_finite() || pre_emphasis_frequency < 0.0 {
            return Err(PraatError::InvalidParameter(format!(
                "pre-emphasis frequency must be finite and non-negative, got {}",
                pre_emphasis_frequency
            )));
        }
        let declarations = operation.scratch_declarations(self.extractor.window_samples());
        self.require(WorkspaceState::Ready)?;
        self.prepare_frame_buffers()?;
        let plan = self.begin(&declarations)?;
        let started = Instant::now();

        if pre_emphasis_frequency > 0.0 {
            self.prepare_emphasis(pre_emphasis_frequency);
        }
        let sound = match &self.emphasized {
            Some(emphasized) if pre_emphasis_frequency > 0.0 => emphasized,
            _ => self.sound,
        };

        let work = SoundWork {
            operation,
            sound,
            extractor: &self.extractor,
            domain: *self.destination.domain(),
        };
        let outcome = match self.pool.as_mut() {
            Some(pool) => execute(
                &plan,
                &work,
                self.destination.frames_mut(),
                pool.slots_mut(),
                &mut self.frame_buffers,
            ),
            None => Err(missing_pool()),
        };
        self.finish(&plan, started, outcome)
    }

    /// Analyse every frame with a sampled-data operation
    ///
    /// Same threading, scratch and failure handling as [`AnalysisWorkspace::run`],
    /// without frame extraction from the sound.
    pub fn run_sampled<O>(&mut self, operation: &O) -> Result<AnalysisReport>
    where
        O: SampledFrameAnalysis<Frame = F>,
    {
        operation.check_destination(self.destination.domain())?;
        let plan = self.begin(&operation.scratch_declarations())?;
        let started = Instant::now();

        let work = SampledWork { operation };
        let outcome = match self.pool.as_mut() {
            Some(pool) => execute(
                &plan,
                &work,
                self.destination.frames_mut(),
                pool.slots_mut(),
                &mut self.frame_buffers,
            ),
            None => Err(missing_pool()),
        };
        self.finish(&plan, started, outcome)
    }

    /// Validate a run and enter `Running`
    fn begin(&mut self, declarations: &[VectorDeclaration]) -> Result<ThreadPlan> {
        self.require(WorkspaceState::Ready)?;
        let pool = self.pool.as_ref().ok_or_else(missing_pool)?;
        pool.check_declarations(declarations)?;

        let plan = self.thread_plan();
        if plan.number_of_threads() > pool.number_of_slots() {
            return Err(PraatError::SlotOutOfRange {
                slot: plan.number_of_threads() - 1,
                slots: pool.number_of_slots(),
            });
        }
        debug!("{}", plan);
        self.state = WorkspaceState::Running;
        Ok(plan)
    }

    fn finish(
        &mut self,
        plan: &ThreadPlan,
        started: Instant,
        outcome: Result<Vec<FrameFailure>>,
    ) -> Result<AnalysisReport> {
        self.state = WorkspaceState::Ready;
        let failures = outcome?;

        let report = AnalysisReport {
            number_of_frames: plan.total_frames(),
            number_of_threads: plan.number_of_threads(),
            failures,
            elapsed: started.elapsed(),
        };
        if let Some(first) = report.failures.first() {
            warn!(
                "{} of {} frames could not be analysed (first: frame {}: {})",
                report.failed_frames(),
                report.number_of_frames,
                first.index + 1,
                first.error
            );
        }
        if self.settings.extra_analysis_info {
            info!(
                "analysed {} frames on {} thread(s) in {:.3} ms",
                report.number_of_frames,
                report.number_of_threads,
                report.elapsed.as_secs_f64() * 1000.0
            );
        }
        Ok(report)
    }

    /// One window-sized buffer per pool slot
    fn prepare_frame_buffers(&mut self) -> Result<()> {
        let slots = self.pool.as_ref().map_or(0, WorkvectorPool::number_of_slots);
        if self.frame_buffers.len() >= slots {
            return Ok(());
        }
        let window_samples = self.extractor.window_samples();
        let mut buffers = Vec::with_capacity(slots);
        for _ in 0..slots {
            buffers.push(try_zeroed(window_samples, "frame buffer")?);
        }
        self.frame_buffers = buffers;
        self.buffer_allocations += slots;
        Ok(())
    }

    fn prepare_emphasis(&mut self, frequency: f64) {
        match &mut self.emphasized {
            Some(target) => {
                if target.num_samples() < self.sound.num_samples() {
                    self.buffer_allocations += 1;
                }
                self.sound.pre_emphasis_into(frequency, target);
            }
            None => {
                self.emphasized = Some(self.sound.pre_emphasis(frequency));
                self.buffer_allocations += 1;
            }
        }
    }

    fn require(&self, expected: WorkspaceState) -> Result<()> {
        if self.state != expected {
            return Err(PraatError::InvalidState {
                expected,
                found: self.state,
            });
        }
        Ok(())
    }

    /// Plan for the bound destination under the workspace settings
    pub fn thread_plan(&self) -> ThreadPlan {
        compute_thread_plan(self.destination.nx(), &self.settings, self.hardware_concurrency)
    }

    /// `(number_of_threads, frames_per_thread)` a run would use with at most
    /// `max_threads` threads (0 = hardware concurrency); nothing is executed
    pub fn threading_info(&self, max_threads: usize) -> (usize, usize) {
        let settings = self.settings.with_max_threads(max_threads);
        let plan = compute_thread_plan(self.destination.nx(), &settings, self.hardware_concurrency);
        (plan.number_of_threads(), plan.frames_per_thread())
    }

    pub fn state(&self) -> WorkspaceState {
        self.state
    }

    pub fn sound(&self) -> &'s Sound {
        self.sound
    }

    pub fn destination(&self) -> &SampledFrames<F> {
        &self.destination
    }

    pub fn destination_mut(&mut self) -> &mut SampledFrames<F> {
        &mut self.destination
    }

    /// Release the workspace and take back the destination
    pub fn into_destination(self) -> SampledFrames<F> {
        self.destination
    }

    pub fn effective_width(&self) -> f64 {
        self.effective_width
    }

    /// Duration of sound read per frame
    pub fn physical_width(&self) -> f64 {
        self.physical_width
    }

    pub fn window_shape(&self) -> WindowShape {
        self.extractor.shape()
    }

    pub fn window_samples(&self) -> usize {
        self.extractor.window_samples()
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn pool(&self) -> Option<&WorkvectorPool> {
        self.pool.as_ref()
    }

    /// Scratch allocations so far: pool vectors, frame buffers and the
    /// pre-emphasis copy
    pub fn scratch_allocations(&self) -> usize {
        self.pool.as_ref().map_or(0, WorkvectorPool::allocations) + self.buffer_allocations
    }
}

fn missing_pool() -> PraatError {
    PraatError::InvalidState {
        expected: WorkspaceState::Ready,
        found: WorkspaceState::Configured,
    }
}

/// One frame of work, chosen once per run
trait FrameWork<F>: Sync {
    fn analyse(&self, index: usize, output: &mut F, scratch: &mut ScratchSlot<'_>, buffer: &mut [f64]) -> FrameResult;
}

struct SoundWork<'a, O> {
    operation: &'a O,
    sound: &'a Sound,
    extractor: &'a SoundFrameExtractor,
    domain: SampledDomain,
}

impl<O: SoundFrameAnalysis> FrameWork<O::Frame> for SoundWork<'_, O> {
    fn analyse(
        &self,
        index: usize,
        output: &mut O::Frame,
        scratch: &mut ScratchSlot<'_>,
        buffer: &mut [f64],
    ) -> FrameResult {
        let time = self.domain.index_to_x(index);
        let in_range = self.extractor.extract(self.sound, time, buffer);
        let frame = self
            .extractor
            .frame(index, time, self.sound.sample_rate(), buffer, in_range);
        self.operation.analyse_sound_frame(&frame, output, scratch)
    }
}

struct SampledWork<'a, O> {
    operation: &'a O,
}

impl<O: SampledFrameAnalysis> FrameWork<O::Frame> for SampledWork<'_, O> {
    fn analyse(
        &self,
        index: usize,
        output: &mut O::Frame,
        scratch: &mut ScratchSlot<'_>,
        _buffer: &mut [f64],
    ) -> FrameResult {
        self.operation.analyse_frame(index, output, scratch)
    }
}

/// Everything one worker owns during a run
struct Job<'a, F> {
    block: FrameBlock,
    frames: &'a mut [F],
    slot: ScratchSlot<'a>,
    /// Empty for sampled-data operations
    buffer: &'a mut [f64],
}

/// Run `work` over every block of `plan`
///
/// A single block runs on the calling thread; more blocks get one scoped
/// thread each. All spawned workers are joined before any error is returned,
/// and a panicking operation is reported as [`PraatError::WorkerPanicked`]
/// whichever thread it ran on.
fn execute<'a, F, W>(
    plan: &ThreadPlan,
    work: &W,
    frames: &'a mut [F],
    slots: Vec<ScratchSlot<'a>>,
    buffers: &'a mut [Vec<f64>],
) -> Result<Vec<FrameFailure>>
where
    F: AnalysisFrame,
    W: FrameWork<F>,
{
    let number_of_slots = slots.len();
    let mut slots = slots.into_iter();
    let mut buffers = buffers.iter_mut();
    let mut rest = frames;

    let mut jobs = Vec::with_capacity(plan.number_of_threads());
    for (worker, block) in plan.blocks().iter().enumerate() {
        let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(block.len());
        rest = tail;
        match slots.next() {
            Some(slot) => jobs.push(Job {
                block: *block,
                frames: chunk,
                slot,
                buffer: buffers.next().map(Vec::as_mut_slice).unwrap_or_default(),
            }),
            None => {
                return Err(PraatError::SlotOutOfRange {
                    slot: worker,
                    slots: number_of_slots,
                })
            }
        }
    }

    if jobs.len() <= 1 {
        return match jobs.pop() {
            Some(job) => catch_unwind(AssertUnwindSafe(|| run_block(work, job)))
                .map_err(|_| PraatError::WorkerPanicked { worker: 0 }),
            None => Ok(Vec::new()),
        };
    }

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(jobs.len());
        let mut spawn_error = None;
        for (worker, job) in jobs.into_iter().enumerate() {
            let spawned = thread::Builder::new()
                .name(format!("praatfan-worker-{}", worker))
                .spawn_scoped(scope, move || run_block(work, job));
            match spawned {
                Ok(handle) => handles.push((worker, handle)),
                Err(e) => {
                    spawn_error = Some(e);
                    break;
                }
            }
        }

        let mut failures = Vec::new();
        let mut panicked = None;
        for (worker, handle) in handles {
            match handle.join() {
                Ok(mut block_failures) => failures.append(&mut block_failures),
                Err(_) => {
                    panicked.get_or_insert(worker);
                }
            }
        }

        if let Some(e) = spawn_error {
            return Err(PraatError::ThreadSpawn(e));
        }
        if let Some(worker) = panicked {
            return Err(PraatError::WorkerPanicked { worker });
        }
        Ok(failures)
    })
}

/// Analyse one block of frames, collecting failures in frame order
fn run_block<F: AnalysisFrame, W: FrameWork<F>>(work: &W, job: Job<'_, F>) -> Vec<FrameFailure> {
    let Job {
        block,
        frames,
        mut slot,
        buffer,
    } = job;
    trace!("slot {} analysing frames {}", slot.index(), block);

    let mut failures = Vec::new();
    for (index, output) in block.range().zip(frames.iter_mut()) {
        if let Err(error) = work.analyse(index, output, &mut slot, buffer) {
            output.set_undefined();
            failures.push(FrameFailure { index, error });
        }
    }
    failures
}
