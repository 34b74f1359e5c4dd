//! End-to-end properties of the analysis workspace
//!
//! These tests drive the public API only: thread planning, parallel runs of
//! the bundled analyses, per-frame failure handling, sound replacement and
//! scratch reuse.

use praatfan_workspace::{
    compute_thread_plan, AnalysisSettings, AnalysisWorkspace, BurgLpcAnalysis, FrameError, FrameResult,
    IntensityAnalysis, LpcFrame, LpcSpectralEnvelope, PraatError, SampledDomain, SampledFrames, ScratchSlot,
    Sound, SoundFrame, SoundFrameAnalysis, VectorDeclaration, WindowShape, WorkspaceState,
};

const SAMPLE_RATE: f64 = 8000.0;

/// A sound with some spectral structure and a slow amplitude change
fn test_sound(fundamental: f64) -> Sound {
    let samples = (0..8000)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE;
            let envelope = 0.5 + 0.4 * (2.0 * std::f64::consts::PI * 1.5 * t).sin();
            let voice: f64 = (1..=5)
                .map(|h| (2.0 * std::f64::consts::PI * fundamental * h as f64 * t).sin() / h as f64)
                .sum();
            envelope * voice
        })
        .collect();
    Sound::from_samples_owned(samples, SAMPLE_RATE)
}

fn settings(max_threads: usize) -> AnalysisSettings {
    AnalysisSettings::default()
        .with_max_threads(max_threads)
        .with_frames_per_thread(1, 0)
}

fn lpc_workspace<'s>(
    sound: &'s Sound,
    analysis: &BurgLpcAnalysis,
    settings: AnalysisSettings,
) -> AnalysisWorkspace<'s, LpcFrame> {
    let domain = SampledDomain::short_term_analysis(sound, 0.025, 0.001).unwrap();
    let destination = SampledFrames::filled(domain, LpcFrame::new(analysis.order()));
    let mut workspace =
        AnalysisWorkspace::with_settings(sound, destination, 0.025, WindowShape::Hanning, settings).unwrap();
    workspace.init_scratch_pool_for(analysis).unwrap();
    workspace
}

/// Sum of the tapered samples; fails on one chosen frame
struct WindowedSum {
    fail_at: Option<usize>,
}

impl SoundFrameAnalysis for WindowedSum {
    type Frame = f64;

    fn scratch_declarations(&self, window_samples: usize) -> Vec<VectorDeclaration> {
        vec![VectorDeclaration::new("squares", window_samples)]
    }

    fn analyse_sound_frame(
        &self,
        frame: &SoundFrame<'_>,
        output: &mut f64,
        scratch: &mut ScratchSlot<'_>,
    ) -> FrameResult {
        if self.fail_at == Some(frame.index()) {
            return Err(FrameError::NonConvergence(format!("frame {}", frame.index() + 1)));
        }
        let squares = scratch.vector("squares")?;
        for (square, s) in squares.iter_mut().zip(frame.samples()) {
            *square = s * s;
        }
        *output = frame.samples().iter().sum::<f64>() + squares.iter().sum::<f64>();
        Ok(())
    }
}

fn windowed_sum_run(sound: &Sound, settings: AnalysisSettings, fail_at: Option<usize>) -> (Vec<f64>, Vec<usize>) {
    let domain = SampledDomain::new(sound.xmin(), sound.xmax(), 1000, 0.001, sound.xmin() + 0.0005).unwrap();
    let analysis = WindowedSum { fail_at };
    let mut workspace = AnalysisWorkspace::with_settings(
        sound,
        SampledFrames::filled(domain, f64::NAN),
        0.025,
        WindowShape::Hanning,
        settings,
    )
    .unwrap();
    workspace.init_scratch_pool_for(&analysis).unwrap();
    let report = workspace.run(&analysis, 0.0).unwrap();
    (workspace.into_destination().into_frames(), report.failed_indices())
}

#[test]
fn test_results_do_not_depend_on_thread_count() {
    let sound = test_sound(140.0);
    let analysis = BurgLpcAnalysis::new(10).unwrap();

    let mut single = lpc_workspace(&sound, &analysis, settings(1));
    let single_report = single.run(&analysis, 50.0).unwrap();
    let mut multi = lpc_workspace(&sound, &analysis, settings(8));
    let multi_report = multi.run(&analysis, 50.0).unwrap();

    assert_eq!(single_report.number_of_threads(), 1);
    assert_eq!(multi_report.number_of_threads(), 8);
    assert_eq!(single_report.failed_indices(), multi_report.failed_indices());

    // bit-identical, including the gains
    for (a, b) in single.destination().frames().iter().zip(multi.destination().frames()) {
        assert_eq!(a.gain.to_bits(), b.gain.to_bits());
        assert_eq!(a.coefficients, b.coefficients);
    }
}

#[test]
fn test_intensity_is_thread_independent() {
    let sound = test_sound(200.0);
    let domain = SampledDomain::short_term_analysis(&sound, 0.032, 0.005).unwrap();

    let run = |threads: usize| {
        let mut workspace = AnalysisWorkspace::with_settings(
            &sound,
            SampledFrames::filled(domain, f64::NAN),
            0.032,
            WindowShape::Hamming,
            settings(threads),
        )
        .unwrap();
        workspace.init_scratch_pool_for(&IntensityAnalysis).unwrap();
        workspace.run(&IntensityAnalysis, 0.0).unwrap();
        workspace.into_destination()
    };
    let reference = run(1);
    for threads in [2, 3, 8, 13] {
        assert_eq!(run(threads), reference);
    }
}

#[test]
fn test_partition_covers_every_frame_once() {
    for min in [1usize, 7, 40, 100] {
        for max in [0, 2 * min, 5 * min] {
            for limit in [1usize, 2, 3, 4, 8, 16] {
                let settings = AnalysisSettings::default()
                    .with_max_threads(limit)
                    .with_frames_per_thread(min, max);
                for total in (0..=1200).step_by(7).chain([1, 2, min, 2 * min, 4096]) {
                    let plan = compute_thread_plan(total, &settings, 4);

                    let mut next = 0;
                    for block in plan.blocks() {
                        assert_eq!(block.start(), next);
                        assert!(!block.is_empty());
                        next = block.end();
                    }
                    assert_eq!(next, total);
                    assert!(plan.number_of_threads() <= limit);

                    if total >= min {
                        assert!(plan.blocks().iter().all(|b| b.len() >= min), "{}", plan);
                        if max > 0 && total <= limit * max {
                            assert!(plan.blocks().iter().all(|b| b.len() <= max), "{}", plan);
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn test_single_frame_plan() {
    for max_threads in [0, 1, 2, 64] {
        for (min, max) in [(0, 0), (1, 1), (40, 0), (100, 500)] {
            let settings = AnalysisSettings::default()
                .with_max_threads(max_threads)
                .with_frames_per_thread(min, max);
            let plan = compute_thread_plan(1, &settings, 16);
            assert_eq!(plan.number_of_threads(), 1);
            assert_eq!(plan.frames_per_thread(), 1);
        }
    }
}

#[test]
fn test_documented_scenarios() {
    let sound = Sound::create_silence(1.0, 16000.0);
    let settings = AnalysisSettings::default()
        .with_max_threads(4)
        .with_frames_per_thread(100, 500);

    let workspace_for = |nx: usize| {
        let domain = SampledDomain::new(0.0, 1.0, nx, 1.0 / nx as f64, 0.5 / nx as f64).unwrap();
        AnalysisWorkspace::with_settings(
            &sound,
            SampledFrames::filled(domain, f64::NAN),
            0.025,
            WindowShape::Hanning,
            settings,
        )
        .unwrap()
    };

    let workspace = workspace_for(1000);
    assert_eq!(workspace.threading_info(4), (4, 250));
    assert_eq!(
        workspace.thread_plan().to_string(),
        "1000 frames on 4 thread(s): [1, 250] [251, 500] [501, 750] [751, 1000]"
    );

    let workspace = workspace_for(50);
    assert_eq!(workspace.threading_info(4), (1, 50));
    assert_eq!(workspace.thread_plan().blocks()[0].to_string(), "[1, 50]");
}

#[test]
fn test_failed_frame_leaves_neighbours_intact() {
    let sound = test_sound(120.0);
    let (reference, failures) = windowed_sum_run(&sound, settings(1), None);
    assert!(failures.is_empty());

    for threads in [1, 2, 3, 4, 7, 8, 16] {
        let (frames, failures) = windowed_sum_run(&sound, settings(threads), Some(499));
        assert_eq!(failures, vec![499], "{} threads", threads);
        for (index, (value, expected)) in frames.iter().zip(&reference).enumerate() {
            if index == 499 {
                assert!(value.is_nan());
            } else {
                assert_eq!(value.to_bits(), expected.to_bits(), "frame {} on {} threads", index, threads);
            }
        }
    }
}

#[test]
fn test_replace_sound_checks_domain() {
    let sound = test_sound(140.0);
    let analysis = BurgLpcAnalysis::new(8).unwrap();
    let mut workspace = lpc_workspace(&sound, &analysis, settings(4));
    workspace.run(&analysis, 0.0).unwrap();
    let before = workspace.destination().clone();

    let resampled = Sound::create_tone(100.0, 1.0, 16000.0, 0.5, 0.0);
    let shifted = test_sound(140.0).with_start_time(0.25);
    let shorter = Sound::create_tone(100.0, 0.9, SAMPLE_RATE, 0.5, 0.0);

    for (candidate, field) in [(&resampled, "nx"), (&shifted, "xmin"), (&shorter, "xmax")] {
        match workspace.replace_sound(candidate) {
            Err(PraatError::DomainMismatch { field: found, .. }) => assert_eq!(found, field),
            other => panic!("expected a domain mismatch, got {:?}", other),
        }
        assert_eq!(workspace.state(), WorkspaceState::Ready);
        assert!(std::ptr::eq(workspace.sound(), &sound));
    }

    workspace.run(&analysis, 0.0).unwrap();
    assert_eq!(workspace.destination(), &before);
}

#[test]
fn test_steady_state_does_not_allocate_scratch() {
    let first = test_sound(140.0);
    let second = test_sound(95.0);
    let analysis = BurgLpcAnalysis::new(12).unwrap();
    let mut workspace = lpc_workspace(&first, &analysis, settings(4));

    workspace.run(&analysis, 50.0).unwrap();
    let allocations = workspace.scratch_allocations();
    let capacity = workspace.pool().map(|p| p.capacity());

    workspace.replace_sound(&second).unwrap();
    workspace.run(&analysis, 50.0).unwrap();
    workspace.replace_sound(&first).unwrap();
    workspace.run(&analysis, 50.0).unwrap();

    assert_eq!(workspace.scratch_allocations(), allocations);
    assert_eq!(workspace.pool().map(|p| p.capacity()), capacity);
}

#[test]
fn test_lazy_pool_settles_after_first_run() {
    let sound = test_sound(140.0);
    let analysis = BurgLpcAnalysis::new(8).unwrap();
    let domain = SampledDomain::short_term_analysis(&sound, 0.025, 0.002).unwrap();
    let mut workspace = AnalysisWorkspace::with_settings(
        &sound,
        SampledFrames::filled(domain, LpcFrame::new(8)),
        0.025,
        WindowShape::Hanning,
        settings(3),
    )
    .unwrap();
    let declarations = analysis.scratch_declarations(workspace.window_samples());
    workspace.init_lazy_scratch_pool(&declarations).unwrap();
    assert_eq!(workspace.pool().map(|p| p.allocations()), Some(0));

    workspace.run(&analysis, 0.0).unwrap();
    let allocations = workspace.scratch_allocations();
    workspace.run(&analysis, 0.0).unwrap();
    assert_eq!(workspace.scratch_allocations(), allocations);
}

#[test]
fn test_lpc_envelopes_from_workspace_output() {
    let sound = test_sound(150.0);
    let analysis = BurgLpcAnalysis::new(10).unwrap();
    let mut workspace = lpc_workspace(&sound, &analysis, settings(0));
    let report = workspace.run(&analysis, 50.0).unwrap();
    assert!(report.is_complete());
    let lpc = workspace.into_destination();

    let envelope = LpcSpectralEnvelope::new(&lpc, 129, SAMPLE_RATE).unwrap();
    let mut spectra = AnalysisWorkspace::with_settings(
        &sound,
        SampledFrames::filled(*lpc.domain(), vec![f64::NAN; 129]),
        0.025,
        WindowShape::Hanning,
        settings(0),
    )
    .unwrap();
    spectra.init_scratch_pool(&[VectorDeclaration::new("envelope power", 129)]).unwrap();
    let report = spectra.run_sampled(&envelope).unwrap();

    assert!(report.is_complete());
    assert_eq!(report.number_of_frames(), lpc.nx());
    assert!(spectra.destination().frames().iter().flatten().all(|v| v.is_finite()));
}

#[test]
fn test_settings_from_config() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::new("praatfan_workspace=debug"))
        .try_init();

    let settings: AnalysisSettings = serde_json::from_str(
        r#"{
            "max_threads": 3,
            "min_frames_per_thread": 50,
            "max_frames_per_thread": 400,
            "extra_analysis_info": true
        }"#,
    )
    .unwrap();

    let sound = test_sound(140.0);
    let (frames, failures) = windowed_sum_run(&sound, settings, Some(0));
    assert_eq!(failures, vec![0]);
    assert_eq!(frames.len(), 1000);

    let plan = compute_thread_plan(1000, &settings, 1);
    assert_eq!(plan.number_of_threads(), 3);
    assert_eq!(plan.frames_per_thread(), 334);
}
