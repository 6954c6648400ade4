// Sequencer module - Measure sequence, swing timing and the lookahead transport

pub mod controller;
pub mod cursor;
pub mod scheduler;
pub mod settings;
pub mod swing;
pub mod transport;

pub use controller::PlaybackController;
pub use cursor::SequenceCursor;
pub use scheduler::{NoteScheduler, ScheduleContext};
pub use settings::{EffectiveParams, Measure, PlaybackDefaults, Settings, SettingsError, StepKind};
pub use transport::{EngineError, Transport, TransportState};
