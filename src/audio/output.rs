// Audio output contract - What the scheduler needs from a sound renderer
//
// The transport only ever talks to `AudioOutput`: read the audio clock, queue a
// note ahead of time, ramp the master gain. `CommandOutput` implements it on
// top of the lock-free command queue and is shared by the live engine and the
// offline renderer.

use ringbuf::traits::Producer;

use crate::audio::clock::AudioClock;
use crate::audio::status::DeviceStatus;
use crate::messaging::channels::CommandProducer;
use crate::messaging::command::AudioCommand;
use crate::sequencer::settings::StepKind;
use crate::synth::click::ClickSound;

/// One note handed to the renderer, well before it has to sound
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent<'a> {
    pub sound_id: &'a str,
    pub kind: StepKind,
    /// Audio-clock time in seconds
    pub time: f64,
    /// Bus level for this step kind, before master gain
    pub volume: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Unknown sound id '{0}'")]
    UnknownSound(String),

    #[error("Audio command queue is full")]
    QueueFull,
}

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("No audio output device found")]
    NoDevice,

    #[error("Audio output device '{0}' not found")]
    DeviceNotFound(String),

    #[error("Failed to query device configuration: {0}")]
    Config(String),

    #[error("Unsupported sample format: {0}. Supported formats: F32, I16, U16")]
    UnsupportedFormat(String),

    #[error("Failed to build output stream: {0}")]
    BuildStream(String),

    #[error("Failed to start output stream: {0}")]
    PlayStream(String),

    #[error("Failed to spawn audio thread: {0}")]
    Thread(#[from] std::io::Error),

    #[error("Audio initialization aborted")]
    InitAborted,
}

/// Sound renderer as seen by the transport
pub trait AudioOutput: Send {
    /// Current audio-clock time in seconds
    fn current_time(&self) -> f64;

    /// Queue one note; must be callable ahead of `note.time`
    fn render_note(&mut self, note: &NoteEvent<'_>) -> Result<(), RenderError>;

    /// Move the master gain to `target` over `ramp_secs`, starting now
    fn ramp_master_gain(&mut self, target: f32, ramp_secs: f64) -> Result<(), RenderError>;

    /// Drop queued notes that have not started sounding yet
    fn cancel_pending(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    /// Health of the underlying device; outputs without one never fail
    fn device_status(&self) -> DeviceStatus {
        DeviceStatus::Running
    }
}

/// Opens the audio device; called once, on the first start
pub trait AudioBackend: Send {
    fn open(&mut self) -> Result<Box<dyn AudioOutput>, AudioError>;
}

/// `AudioOutput` that turns notes into queued `AudioCommand`s
pub struct CommandOutput {
    producer: CommandProducer,
    clock: AudioClock,
}

impl CommandOutput {
    pub fn new(producer: CommandProducer, clock: AudioClock) -> Self {
        Self { producer, clock }
    }

    /// Push a raw command (used to cut voices on shutdown)
    pub fn send(&mut self, command: AudioCommand) -> Result<(), RenderError> {
        self.producer
            .try_push(command)
            .map_err(|_| RenderError::QueueFull)
    }
}

impl AudioOutput for CommandOutput {
    fn current_time(&self) -> f64 {
        self.clock.seconds()
    }

    fn render_note(&mut self, note: &NoteEvent<'_>) -> Result<(), RenderError> {
        let sound = ClickSound::from_id(note.sound_id)
            .ok_or_else(|| RenderError::UnknownSound(note.sound_id.to_string()))?;

        self.send(AudioCommand::TriggerClick {
            start_sample: self.clock.seconds_to_samples(note.time),
            sound,
            accent: note.kind == StepKind::AccentedBeat,
            gain: note.volume,
        })
    }

    fn ramp_master_gain(&mut self, target: f32, ramp_secs: f64) -> Result<(), RenderError> {
        let ramp_samples = self.clock.seconds_to_samples(ramp_secs).min(u32::MAX as u64) as u32;
        self.send(AudioCommand::RampGain {
            target,
            ramp_samples,
        })
    }

    fn cancel_pending(&mut self) -> Result<(), RenderError> {
        self.send(AudioCommand::CancelPending)
    }
}
