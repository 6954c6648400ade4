// Transport - Start/stop protocol, settings diffing and the scheduler tick
//
// Single-threaded core: the controller serializes every call. Owns the cursor,
// the scheduler, the applied settings snapshot and the audio output.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::audio::output::{AudioBackend, AudioError, AudioOutput};
use crate::config::{ConfigError, EngineConfig};
use crate::sequencer::cursor::SequenceCursor;
use crate::sequencer::scheduler::{NoteScheduler, ScheduleContext};
use crate::sequencer::settings::{EffectiveParams, Settings, SettingsError};
use crate::timing::dispatcher::{StepSignal, StepSink};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Nothing to play: the sequence has no playable measure")]
    NothingToPlay,

    #[error("Failed to spawn engine thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    /// Every step of a non-looping sequence is queued; stops once the audio
    /// clock passes `end_time`
    Ending { end_time: f64 },
}

impl TransportState {
    pub fn is_running(&self) -> bool {
        !matches!(self, TransportState::Stopped)
    }
}

pub struct Transport {
    config: EngineConfig,
    backend: Box<dyn AudioBackend>,
    /// Opened on the first start and kept for the next ones
    output: Option<Box<dyn AudioOutput>>,
    steps: Box<dyn StepSink>,
    /// Bumped on every start and stop; UI signals from older sessions are dropped
    session: Arc<AtomicU64>,
    current_session: u64,

    settings: Settings,
    params: Vec<EffectiveParams>,
    /// Measure 0 parameters, refreshed on every settings change for UI preview
    preview: EffectiveParams,
    resolution_passes: u64,

    cursor: SequenceCursor,
    scheduler: NoteScheduler,
    state: TransportState,
}

impl Transport {
    pub fn new(
        config: EngineConfig,
        backend: Box<dyn AudioBackend>,
        steps: Box<dyn StepSink>,
        session: Arc<AtomicU64>,
    ) -> Self {
        let settings = Settings::default();
        let preview = EffectiveParams::resolve(None, &settings.defaults);
        let scheduler = NoteScheduler::new(config.lookahead_secs());

        Self {
            config,
            backend,
            output: None,
            steps,
            current_session: session.load(Ordering::Acquire),
            session,
            settings,
            params: Vec::new(),
            preview,
            resolution_passes: 0,
            cursor: SequenceCursor::new(),
            scheduler,
            state: TransportState::Stopped,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Parameters of the first measure (or the globals for an empty sequence)
    pub fn preview_params(&self) -> &EffectiveParams {
        &self.preview
    }

    /// Number of times effective parameters were recomputed
    pub fn resolution_passes(&self) -> u64 {
        self.resolution_passes
    }

    pub fn cursor(&self) -> &SequenceCursor {
        &self.cursor
    }

    pub fn next_note_time(&self) -> f64 {
        self.scheduler.next_note_time()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start playback at `start_measure`; no-op when already running
    ///
    /// The first note is scheduled right here at `now + start_safety`, the cursor
    /// advanced once and the next note time seeded, so the first click never
    /// depends on the first scheduler tick.
    pub fn start(&mut self, start_measure: usize) -> Result<(), EngineError> {
        if self.is_running() {
            return Ok(());
        }
        if !self.settings.has_playable_measure() {
            return Err(EngineError::NothingToPlay);
        }

        if self.output.is_none() {
            let output = self.backend.open()?;
            self.output = Some(output);
        }
        let Some(output) = self.output.as_deref_mut() else {
            return Err(EngineError::Audio(AudioError::InitAborted));
        };

        if !self.cursor.reset(&self.settings, start_measure) {
            return Err(EngineError::NothingToPlay);
        }
        self.current_session = self.session.fetch_add(1, Ordering::AcqRel) + 1;

        let now = output.current_time();
        if let Err(e) =
            output.ramp_master_gain(self.settings.defaults.master_volume, self.config.gain_ramp_secs())
        {
            log::warn!("Could not ramp master gain up: {}", e);
        }

        let first_note_time = now + self.config.start_safety_secs();
        self.scheduler.set_next_note_time(first_note_time);

        let mut ctx = ScheduleContext {
            settings: &self.settings,
            params: &self.params,
            cursor: &mut self.cursor,
            output,
            steps: self.steps.as_mut(),
            session: self.current_session,
        };
        self.scheduler.schedule_one(&mut ctx, now);

        self.state = if self.cursor.is_finished() {
            TransportState::Ending {
                end_time: self.scheduler.next_note_time(),
            }
        } else {
            TransportState::Playing
        };

        log::info!(
            "Playback started at measure {} (first note at {:.3}s)",
            start_measure,
            first_note_time
        );
        Ok(())
    }

    /// One timing-source tick; returns false once playback is over
    pub fn tick(&mut self) -> bool {
        let Some(output) = self.output.as_deref_mut() else {
            return false;
        };

        if self.state.is_running() && output.device_status().is_failed() {
            log::error!("Audio device failed, stopping playback");
            self.stop();
            // Reopened on the next start
            self.output = None;
            return false;
        }
        let now = output.current_time();

        match self.state {
            TransportState::Stopped => false,
            TransportState::Ending { end_time } => {
                if now >= end_time {
                    log::info!("Sequence finished");
                    self.stop();
                    false
                } else {
                    true
                }
            }
            TransportState::Playing => {
                let mut ctx = ScheduleContext {
                    settings: &self.settings,
                    params: &self.params,
                    cursor: &mut self.cursor,
                    output,
                    steps: self.steps.as_mut(),
                    session: self.current_session,
                };
                self.scheduler.fill(&mut ctx, now);

                if self.cursor.is_finished() {
                    let end_time = self.scheduler.next_note_time();
                    log::debug!("Last step queued, ending at {:.3}s", end_time);
                    self.state = TransportState::Ending { end_time };
                }
                true
            }
        }
    }

    /// Stop playback; returns false if it was not running
    ///
    /// Sounding clicks fade out; queued notes that have not started yet are
    /// dropped. The UI gets exactly one `Stopped` signal and pending step
    /// signals are invalidated.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }

        if let Some(output) = self.output.as_deref_mut() {
            if let Err(e) = output.ramp_master_gain(0.0, self.config.gain_ramp_secs()) {
                log::warn!("Could not ramp master gain down: {}", e);
            }
            if let Err(e) = output.cancel_pending() {
                log::warn!("Could not cancel queued notes: {}", e);
            }
        }

        self.session.fetch_add(1, Ordering::AcqRel);
        self.cursor.stop();
        self.state = TransportState::Stopped;
        self.steps.send(StepSignal::Stopped);

        log::info!("Playback stopped");
        true
    }

    /// Apply a settings value; returns false when it equals the applied snapshot
    ///
    /// While running the new sequence is picked up between steps, and a master
    /// volume change is ramped in live. Turning looping on after the last step
    /// was queued resumes at the loop restart instead of stopping.
    pub fn update_settings(&mut self, settings: Settings) -> Result<bool, SettingsError> {
        settings.validate()?;
        if settings == self.settings {
            log::debug!("Settings unchanged, skipping");
            return Ok(false);
        }

        let master_changed = settings.defaults.master_volume != self.settings.defaults.master_volume;
        self.settings = settings;
        self.params = EffectiveParams::resolve_all(&self.settings);
        self.preview = EffectiveParams::resolve(self.settings.measures.first(), &self.settings.defaults);
        self.resolution_passes += 1;
        log::debug!(
            "Settings applied: {} measures, {} steps",
            self.settings.measures.len(),
            self.settings.total_steps()
        );

        if self.is_running()
            && master_changed
            && let Some(output) = self.output.as_deref_mut()
            && let Err(e) =
                output.ramp_master_gain(self.settings.defaults.master_volume, self.config.gain_ramp_secs())
        {
            log::warn!("Could not apply master volume: {}", e);
        }

        // Looping switched back on while the last notes ring out: keep the
        // queued time and carry on from the loop restart
        if let TransportState::Ending { .. } = self.state
            && self.settings.defaults.looping
        {
            let restart = self.settings.loop_restart_index();
            if self.cursor.reset(&self.settings, restart) {
                log::debug!(
                    "Looping resumed at measure {} ({:.3}s)",
                    self.cursor.measure_index(),
                    self.scheduler.next_note_time()
                );
                self.state = TransportState::Playing;
            }
        }

        Ok(true)
    }
}
