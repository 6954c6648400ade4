// Audio commands - Scheduler → render callback

use crate::synth::click::ClickSound;

/// Commands sent to the render callback through the lock-free queue
/// Positions are absolute frame indices on the shared audio clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioCommand {
    /// Start a click at an exact frame (played immediately if already late)
    TriggerClick {
        start_sample: u64,
        sound: ClickSound,
        accent: bool,
        gain: f32,
    },
    /// Linear master gain ramp, starting when the command is drained
    RampGain { target: f32, ramp_samples: u32 },
    /// Drop clicks whose start frame has not been reached
    CancelPending,
    /// Cut every voice
    Silence,
}
