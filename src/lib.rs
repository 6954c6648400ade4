// Metronome Engine - Library exports for the demo binary, tests and benchmarks

pub mod audio;
pub mod config;
pub mod messaging;
pub mod sequencer;
pub mod synth;
pub mod timing;

// Re-export commonly used types for convenience
pub use audio::engine::{AudioEngine, CpalBackend};
pub use audio::export::{ExportError, ExportSettings, OfflineRenderer, export_wav, render_to_buffer};
pub use audio::output::{AudioBackend, AudioError, AudioOutput, NoteEvent, RenderError};
pub use audio::status::DeviceStatus;
pub use config::{AudioConfig, ConfigError, EngineConfig};
pub use messaging::channels::create_command_channel;
pub use sequencer::{
    EffectiveParams, EngineError, Measure, PlaybackController, PlaybackDefaults, Settings,
    SettingsError, StepKind, TransportState,
};
pub use synth::click::ClickSound;
pub use timing::dispatcher::STOPPED_STEP;
