// Controller threads - Timing source, step dispatcher and stop() under real time

use crossbeam_channel::{Receiver, unbounded};
use metronome_engine::audio::output::{AudioBackend, AudioError, AudioOutput, NoteEvent, RenderError};
use metronome_engine::sequencer::transport::EngineError;
use metronome_engine::{
    EngineConfig, Measure, PlaybackController, PlaybackDefaults, STOPPED_STEP, Settings,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(3);

/// Output whose clock is the wall clock since it was opened
struct WallClockOutput {
    origin: Instant,
    notes: Arc<Mutex<Vec<f64>>>,
}

impl AudioOutput for WallClockOutput {
    fn current_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn render_note(&mut self, note: &NoteEvent<'_>) -> Result<(), RenderError> {
        self.notes.lock().unwrap().push(note.time);
        Ok(())
    }

    fn ramp_master_gain(&mut self, _target: f32, _ramp_secs: f64) -> Result<(), RenderError> {
        Ok(())
    }
}

#[derive(Default, Clone)]
struct WallClockBackend {
    notes: Arc<Mutex<Vec<f64>>>,
    opens: Arc<AtomicUsize>,
}

impl AudioBackend for WallClockBackend {
    fn open(&mut self) -> Result<Box<dyn AudioOutput>, AudioError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(WallClockOutput {
            origin: Instant::now(),
            notes: Arc::clone(&self.notes),
        }))
    }
}

struct NoDeviceBackend;

impl AudioBackend for NoDeviceBackend {
    fn open(&mut self) -> Result<Box<dyn AudioOutput>, AudioError> {
        Err(AudioError::NoDevice)
    }
}

/// 240 BPM quarter notes: one step every 250ms
fn fast(looping: bool, beats: u32) -> Settings {
    Settings::new(
        PlaybackDefaults {
            bpm: 240.0,
            looping,
            ..PlaybackDefaults::default()
        },
        vec![Measure::with_default_pattern(beats, 1)],
    )
}

fn controller(backend: WallClockBackend) -> (PlaybackController, Receiver<(i64, Instant)>) {
    let (tx, rx) = unbounded();
    let controller = PlaybackController::with_backend(
        EngineConfig::default(),
        Box::new(backend),
        move |step| {
            let _ = tx.send((step, Instant::now()));
        },
    )
    .unwrap();
    (controller, rx)
}

#[test]
fn test_steps_reach_observer_in_order_at_their_time() {
    let backend = WallClockBackend::default();
    let (controller, rx) = controller(backend.clone());
    controller.update_settings(fast(true, 4)).unwrap();

    let started = Instant::now();
    controller.start(0).unwrap();
    assert!(controller.is_running());

    let received: Vec<(i64, Instant)> = (0..5).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
    let steps: Vec<i64> = received.iter().map(|(step, _)| *step).collect();
    assert_eq!(steps, vec![0, 1, 2, 3, 0]);

    // Step 4 of the run sounds 50ms + 4 * 250ms after start
    let last = received[4].1.duration_since(started);
    assert!(last >= Duration::from_millis(950), "last step after {:?}", last);
    assert!(last < Duration::from_millis(1600), "last step after {:?}", last);

    controller.stop();
    assert!(!controller.is_running());
    let stop_signal = rx
        .iter()
        .find(|(step, _)| *step == STOPPED_STEP)
        .map(|(step, _)| step);
    assert_eq!(stop_signal, Some(STOPPED_STEP));
    assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stop_right_after_start() {
    let backend = WallClockBackend::default();
    let (controller, rx) = controller(backend.clone());
    controller.update_settings(fast(true, 4)).unwrap();

    controller.start(0).unwrap();
    controller.stop();

    assert!(backend.notes.lock().unwrap().len() <= 1);
    assert_eq!(rx.recv_timeout(WAIT).unwrap().0, STOPPED_STEP);
    // The first step was due 50ms after start; its signal belongs to a dead session
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
}

#[test]
fn test_stop_from_inside_the_observer() {
    let slot: Arc<OnceLock<Weak<PlaybackController>>> = Arc::new(OnceLock::new());
    let (tx, rx) = unbounded();

    let observer_slot = Arc::clone(&slot);
    let controller = Arc::new(
        PlaybackController::with_backend(
            EngineConfig::default(),
            Box::new(WallClockBackend::default()),
            move |step| {
                let _ = tx.send(step);
                if step == 2
                    && let Some(controller) = observer_slot.get().and_then(Weak::upgrade)
                {
                    controller.stop();
                }
            },
        )
        .unwrap(),
    );
    let _ = slot.set(Arc::downgrade(&controller));

    controller.update_settings(fast(true, 8)).unwrap();
    controller.start(0).unwrap();

    let mut seen = Vec::new();
    while let Ok(step) = rx.recv_timeout(WAIT) {
        seen.push(step);
        if step == STOPPED_STEP {
            break;
        }
    }
    assert_eq!(seen, vec![0, 1, 2, STOPPED_STEP]);
    assert!(!controller.is_running());
    assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());
}

#[test]
fn test_non_looping_sequence_ends_and_can_restart() {
    let backend = WallClockBackend::default();
    let (controller, rx) = controller(backend.clone());
    controller.update_settings(fast(false, 2)).unwrap();

    controller.start(0).unwrap();
    let first_run: Vec<i64> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap().0).collect();
    assert_eq!(first_run, vec![0, 1, STOPPED_STEP]);

    // The transport stops itself at the end of the last step
    let deadline = Instant::now() + WAIT;
    while controller.is_running() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(!controller.is_running());

    controller.start(0).unwrap();
    let second_run: Vec<i64> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap().0).collect();
    assert_eq!(second_run, vec![0, 1, STOPPED_STEP]);
    assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
}

#[test]
fn test_device_failure_leaves_transport_stopped() {
    let (tx, rx) = unbounded();
    let controller = PlaybackController::with_backend(
        EngineConfig::default(),
        Box::new(NoDeviceBackend),
        move |step| {
            let _ = tx.send(step);
        },
    )
    .unwrap();
    controller.update_settings(fast(true, 4)).unwrap();

    assert!(matches!(
        controller.start(0),
        Err(EngineError::Audio(AudioError::NoDevice))
    ));
    assert!(!controller.is_running());

    controller.stop();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = EngineConfig {
        tick_interval_ms: 0,
        ..EngineConfig::default()
    };
    let result =
        PlaybackController::with_backend(config, Box::new(WallClockBackend::default()), |_| {});
    assert!(matches!(result, Err(EngineError::Config(_))));
}

#[test]
fn test_settings_accessors_follow_updates() {
    let (controller, _rx) = controller(WallClockBackend::default());
    let settings = fast(true, 3);
    assert!(controller.update_settings(settings.clone()).unwrap());
    assert!(!controller.update_settings(settings.clone()).unwrap());

    assert_eq!(controller.settings(), settings);
    assert_eq!(controller.resolution_passes(), 1);
    assert_eq!(controller.preview_params().bpm, 240.0);
}
