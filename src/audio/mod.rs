// Module audio - Output device, sample clock, click mixer and offline export

pub mod clock;
pub mod device;
pub mod dsp_utils;
pub mod engine;
pub mod export;
pub mod mixer;
pub mod output;
pub mod status;

pub use clock::AudioClock;
pub use engine::{AudioEngine, CpalBackend};
pub use export::{ExportError, ExportSettings, OfflineRenderer, export_wav, render_to_buffer};
pub use mixer::ClickMixer;
pub use output::{AudioBackend, AudioError, AudioOutput, CommandOutput, NoteEvent, RenderError};
pub use status::{DeviceStatus, StreamHealth};
