// Playback controller - Public start/stop/settings API
//
// Wires the transport to its two threads: the timing source that ticks the
// scheduler and the dispatcher that delivers UI steps. Every method takes &self
// and returns quickly; stop() can be called from the step observer or any
// other thread.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::AtomicU64;

use crate::audio::engine::CpalBackend;
use crate::audio::output::AudioBackend;
use crate::config::EngineConfig;
use crate::sequencer::settings::{EffectiveParams, Settings, SettingsError};
use crate::sequencer::transport::{EngineError, Transport, TransportState};
use crate::timing::dispatcher::StepDispatcher;
use crate::timing::ticker::TimingSource;

/// A poisoned lock only means a panic elsewhere; the transport state is still usable
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct PlaybackController {
    transport: Arc<Mutex<Transport>>,
    ticker: Mutex<Option<TimingSource>>,
    config: EngineConfig,
    _dispatcher: StepDispatcher,
}

impl PlaybackController {
    /// Controller on the system output device
    ///
    /// `observer` receives the global step index of every step as it sounds, and
    /// -1 when playback stops.
    pub fn new<F>(config: EngineConfig, observer: F) -> Result<Self, EngineError>
    where
        F: FnMut(i64) + Send + 'static,
    {
        let backend = CpalBackend::new(config.audio.clone());
        Self::with_backend(config, Box::new(backend), observer)
    }

    pub fn with_backend<F>(
        config: EngineConfig,
        backend: Box<dyn AudioBackend>,
        observer: F,
    ) -> Result<Self, EngineError>
    where
        F: FnMut(i64) + Send + 'static,
    {
        config.validate()?;

        let session = Arc::new(AtomicU64::new(0));
        let dispatcher = StepDispatcher::spawn(Box::new(observer), Arc::clone(&session))?;
        let transport = Transport::new(
            config.clone(),
            backend,
            Box::new(dispatcher.sink()),
            session,
        );

        Ok(Self {
            transport: Arc::new(Mutex::new(transport)),
            ticker: Mutex::new(None),
            config,
            _dispatcher: dispatcher,
        })
    }

    /// Start at `start_measure`; no-op when already running
    ///
    /// Opens the audio device on first use. Fails when the device cannot be
    /// opened or the sequence has nothing playable; the transport then stays
    /// stopped.
    pub fn start(&self, start_measure: usize) -> Result<(), EngineError> {
        let mut ticker = lock(&self.ticker);
        {
            let mut transport = lock(&self.transport);
            if transport.is_running() {
                return Ok(());
            }
            transport.start(start_measure)?;
        }

        // A source left over from a natural end has already exited
        if let Some(mut finished) = ticker.take() {
            finished.stop();
        }

        let transport = Arc::clone(&self.transport);
        match TimingSource::start(self.config.tick_interval(), move || lock(&transport).tick()) {
            Ok(source) => {
                *ticker = Some(source);
                Ok(())
            }
            Err(e) => {
                lock(&self.transport).stop();
                Err(EngineError::Thread(e))
            }
        }
    }

    /// Fade out, halt the timing source and report -1 to the observer
    pub fn stop(&self) {
        let was_running = lock(&self.transport).stop();

        // Join outside both locks: the tick callback needs the transport
        let source = lock(&self.ticker).take();
        if let Some(mut source) = source {
            source.stop();
        }

        if !was_running {
            log::debug!("stop() while not running");
        }
    }

    /// Apply a settings value; returns false when nothing changed
    pub fn update_settings(&self, settings: Settings) -> Result<bool, SettingsError> {
        lock(&self.transport).update_settings(settings)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.transport).is_running()
    }

    pub fn state(&self) -> TransportState {
        lock(&self.transport).state()
    }

    /// Effective parameters of the first measure, for a paused UI
    pub fn preview_params(&self) -> EffectiveParams {
        lock(&self.transport).preview_params().clone()
    }

    pub fn settings(&self) -> Settings {
        lock(&self.transport).settings().clone()
    }

    pub fn resolution_passes(&self) -> u64 {
        lock(&self.transport).resolution_passes()
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}
