//! Engine lifecycle against offline and recording backends

mod audio_test_utils;

use audio_test_utils::{calculate_rms, recording_factory, render_seconds, Recorded, Recording};
use geodrone::backend::{AudioBackend, BackendState, OfflineBackendFactory};
use geodrone::config::{EngineConfig, ReverbConfig};
use geodrone::envelope::RampCurve;
use geodrone::error::{BackendError, BackendResult, EngineError};
use geodrone::mapper::{MappingStrategy, ParameterMapper};
use geodrone::scheduler::PulseProfile;
use geodrone::snapshot::EnvironmentalSnapshot;
use geodrone::{EngineStatus, EnvironmentalAudioEngine};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SAMPLE_RATE: f32 = 8000.0;

/// Small, reproducible graph: no reverb, no vibrato, no retry pause
fn test_config() -> EngineConfig {
    EngineConfig {
        seed: Some(42),
        vibrato: false,
        reverb: ReverbConfig {
            enabled: false,
            ..ReverbConfig::default()
        },
        resume_retry_delay_ms: 0,
        ..EngineConfig::default()
    }
}

fn recording_engine(config: EngineConfig) -> (EnvironmentalAudioEngine, Recording) {
    let (factory, recording) = recording_factory(OfflineBackendFactory::new(SAMPLE_RATE));
    let engine = EnvironmentalAudioEngine::new(config, factory).unwrap();
    (engine, recording)
}

/// Channel gain nodes: whatever a started oscillator feeds (vibrato off)
fn channel_gain_nodes(commands: &[Recorded]) -> HashSet<usize> {
    let started: HashSet<usize> = commands
        .iter()
        .filter_map(|c| match c {
            Recorded::Start(id) => Some(*id),
            _ => None,
        })
        .collect();
    commands
        .iter()
        .filter_map(|c| match c {
            Recorded::Connect(from, to) if started.contains(from) => Some(*to),
            _ => None,
        })
        .collect()
}

#[test]
fn test_start_and_stop_are_idempotent() {
    let offline = OfflineBackendFactory::new(SAMPLE_RATE);
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let factory = move || -> BackendResult<Box<dyn AudioBackend>> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(offline.build()))
    };
    let mut engine = EnvironmentalAudioEngine::new(test_config(), factory).unwrap();

    engine.start().unwrap();
    engine.start().unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(engine.status(), EngineStatus::Running);
    assert_eq!(engine.frequencies().len(), 8);

    engine.stop().unwrap();
    engine.stop().unwrap();
    assert_eq!(engine.status(), EngineStatus::Stopped);
    assert!(engine.frequencies().is_empty());
    assert!(engine.targets().is_none());

    engine.start().unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 2);
    assert_eq!(engine.status(), EngineStatus::Running);
}

#[test]
fn test_missing_backend_is_reported_once() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let factory = move || -> BackendResult<Box<dyn AudioBackend>> {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::Unavailable("no output device".into()))
    };
    let mut engine = EnvironmentalAudioEngine::new(test_config(), factory).unwrap();

    let err = engine.start().unwrap_err();
    assert!(matches!(err, EngineError::BackendUnavailable(_)), "{}", err);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(engine.status(), EngineStatus::Stopped);
    assert!(engine.stop().is_ok());
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = EngineConfig {
        channel_count: 0,
        ..test_config()
    };
    let result = EnvironmentalAudioEngine::new(config, OfflineBackendFactory::new(SAMPLE_RATE));
    assert!(matches!(result, Err(EngineError::Config(_))));
}

#[test]
fn test_suspended_backend_resumes_on_second_attempt() {
    let offline = OfflineBackendFactory::new(SAMPLE_RATE).simulate_suspended(1);
    let handle = offline.render_handle();
    let mut engine = EnvironmentalAudioEngine::new(test_config(), offline).unwrap();

    engine.start().unwrap();
    assert_eq!(engine.status(), EngineStatus::Running);
    assert_eq!(handle.state(), BackendState::Running);
}

#[test]
fn test_stubborn_suspension_runs_silent_until_resumed() {
    let offline = OfflineBackendFactory::new(SAMPLE_RATE).simulate_suspended(5);
    let handle = offline.render_handle();
    let config = EngineConfig {
        pulse: PulseProfile::drone(),
        ..test_config()
    };
    let mut engine = EnvironmentalAudioEngine::new(config, offline).unwrap();

    // Both start attempts fail; the graph is built anyway
    engine.start().unwrap();
    assert_eq!(engine.status(), EngineStatus::Suspended);
    assert_eq!(engine.frequencies().len(), 8);

    let silent = render_seconds(&handle, 0.5);
    assert_eq!(calculate_rms(&silent), 0.0);
    assert_eq!(handle.current_time(), 0.0);

    for _ in 0..3 {
        assert_eq!(engine.retry_resume().unwrap(), EngineStatus::Suspended);
    }
    assert_eq!(engine.retry_resume().unwrap(), EngineStatus::Running);

    let audible = render_seconds(&handle, 3.0);
    assert!(calculate_rms(&audible) > 0.01);
}

#[test]
fn test_snapshot_set_while_stopped_applies_on_start() {
    let config = EngineConfig {
        strategy: MappingStrategy::IndependentDrift,
        ..test_config()
    };
    let mut engine = EnvironmentalAudioEngine::new(config, OfflineBackendFactory::new(SAMPLE_RATE))
        .unwrap();

    let snapshot = EnvironmentalSnapshot::new(64.1, -21.9, 12.0, -3.0, 0.8).with_humidity(90.0);
    engine.set_environmental_data(snapshot).unwrap();
    assert_eq!(engine.status(), EngineStatus::Stopped);
    assert!(engine.frequencies().is_empty());
    assert_eq!(engine.snapshot(), &snapshot);

    engine.start().unwrap();
    let expected = ParameterMapper::new(MappingStrategy::IndependentDrift, 8)
        .map(&snapshot, &mut StdRng::seed_from_u64(0));
    assert_eq!(engine.frequencies(), expected.frequencies);
    assert_eq!(engine.targets().unwrap().reverb, expected.reverb);
}

#[test]
fn test_observer_sees_every_recomputation() {
    let mut engine =
        EnvironmentalAudioEngine::new(test_config(), OfflineBackendFactory::new(SAMPLE_RATE))
            .unwrap();
    let seen: Arc<Mutex<Vec<Vec<f32>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine.register_observer(move |frequencies: &[f32]| sink.lock().push(frequencies.to_vec()));

    engine.start().unwrap();
    engine
        .set_environmental_data(EnvironmentalSnapshot::new(10.0, 20.0, 1.0, 25.0, 0.3))
        .unwrap();
    {
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], engine.frequencies());
    }

    // A second registration replaces the first
    let (tx, rx) = crossbeam::channel::bounded(4);
    engine.register_observer(tx);
    engine
        .set_environmental_data(EnvironmentalSnapshot::new(-33.9, 151.2, 0.0, 18.0, 0.7))
        .unwrap();
    assert_eq!(seen.lock().len(), 2);
    assert_eq!(rx.try_recv().unwrap(), engine.frequencies());

    engine.clear_observer();
    engine
        .set_environmental_data(EnvironmentalSnapshot::default())
        .unwrap();
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_pulses_fade_channel_gains() {
    let (mut engine, recording) = recording_engine(test_config());
    engine.start().unwrap();
    let gain_nodes = channel_gain_nodes(&recording.commands());
    assert_eq!(gain_nodes.len(), 8);

    // Pulsed channels stay silent until their first fade-in
    assert!(recording.ramps().iter().all(|r| match r {
        Recorded::Ramp { node, .. } => !gain_nodes.contains(node),
        _ => true,
    }));

    recording.clear();
    let mut fades = 0;
    for _ in 0..40 {
        render_seconds(&recording.handle, 0.5);
        fades += engine.tick().unwrap();
    }
    assert!(fades > 0);

    let gain_ramps: Vec<Recorded> = recording
        .ramps()
        .into_iter()
        .filter(|r| matches!(r, Recorded::Ramp { node, .. } if gain_nodes.contains(node)))
        .collect();
    assert_eq!(gain_ramps.len(), fades);
    for ramp in gain_ramps {
        if let Recorded::Ramp { target, curve, .. } = ramp {
            assert_eq!(curve, RampCurve::Linear);
            assert!((0.0..=0.3).contains(&target));
        }
    }
}

#[test]
fn test_drone_channels_get_nominal_gain_on_start() {
    let config = EngineConfig {
        pulse: PulseProfile::drone(),
        ..test_config()
    };
    let (mut engine, recording) = recording_engine(config);
    engine.start().unwrap();

    let commands = recording.commands();
    let gain_nodes = channel_gain_nodes(&commands);
    let mut targets: Vec<f32> = commands
        .iter()
        .filter_map(|c| match c {
            Recorded::Ramp { node, target, .. } if gain_nodes.contains(node) => Some(*target),
            _ => None,
        })
        .collect();
    targets.sort_by(|a, b| b.total_cmp(a));
    assert_eq!(targets.len(), 8);
    assert!((targets[0] - 0.3).abs() < 1e-6);
    assert!((targets[7] - 0.3 / 8.0).abs() < 1e-6);
    assert!(engine.next_deadline().is_none());
}

#[test]
fn test_nothing_fades_after_stop() {
    let (mut engine, recording) = recording_engine(test_config());
    engine.start().unwrap();
    let generation = engine.scheduler().generation();
    render_seconds(&recording.handle, 10.0);

    recording.clear();
    engine.stop().unwrap();
    let teardown = recording.commands();
    assert!(teardown.iter().all(|c| matches!(c, Recorded::Stop(_))));
    assert_eq!(teardown.len(), 8);

    recording.clear();
    assert_eq!(engine.tick().unwrap(), 0);
    assert_eq!(engine.tick_with_generation(generation).unwrap(), 0);
    engine
        .set_environmental_data(EnvironmentalSnapshot::new(45.0, 7.0, 3.0, 10.0, 0.2))
        .unwrap();
    assert!(recording.commands().is_empty());
    assert!(engine.next_deadline().is_none());
}

#[test]
fn test_stale_timer_after_restart_is_dropped() {
    let (mut engine, recording) = recording_engine(test_config());
    engine.start().unwrap();
    let stale = engine.scheduler().generation();
    engine.stop().unwrap();
    engine.start().unwrap();
    assert_ne!(engine.scheduler().generation(), stale);

    // Every channel's idle window has passed
    render_seconds(&recording.handle, 17.0);
    recording.clear();
    assert_eq!(engine.tick_with_generation(stale).unwrap(), 0);
    assert!(recording.commands().is_empty());

    assert_eq!(engine.tick().unwrap(), 8);
}

#[test]
fn test_backend_fault_leaves_engine_stoppable() {
    let (mut engine, recording) = recording_engine(test_config());
    engine.start().unwrap();

    recording.set_fail_ramps(true);
    let err = engine
        .set_environmental_data(EnvironmentalSnapshot::new(1.0, 2.0, 3.0, 4.0, 0.5))
        .unwrap_err();
    assert!(matches!(err, EngineError::Backend(BackendError::Stream(_))));
    assert_eq!(engine.status(), EngineStatus::Running);

    recording.set_fail_ramps(false);
    engine.stop().unwrap();
    assert_eq!(engine.status(), EngineStatus::Stopped);
}

#[test]
fn test_failed_start_releases_backend() {
    let (mut engine, recording) = recording_engine(test_config());
    recording.set_fail_ramps(true);
    assert!(engine.start().is_err());
    assert_eq!(engine.status(), EngineStatus::Stopped);
    assert_eq!(recording.handle.state(), BackendState::Closed);

    recording.set_fail_ramps(false);
    engine.start().unwrap();
    assert_eq!(engine.status(), EngineStatus::Running);
}

#[test]
fn test_running_engine_is_audible() {
    let config = EngineConfig {
        pulse: PulseProfile::drone(),
        ..test_config()
    };
    let offline = OfflineBackendFactory::new(SAMPLE_RATE);
    let handle = offline.render_handle();
    let mut engine = EnvironmentalAudioEngine::new(config, offline).unwrap();
    engine.start().unwrap();

    let audio = render_seconds(&handle, 3.0);
    let rms = calculate_rms(&audio[audio.len() / 2..]);
    assert!(rms > 0.01, "rms {}", rms);
    assert!(audio.iter().all(|s| s.is_finite()));
}
