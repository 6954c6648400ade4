// Stream health - Failure flag raised from the cpal error callback and polled by
// the transport on every tick

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Stream being built on the host thread
    Opening,
    Running,
    /// The backend reported an error; the stream no longer produces sound
    Failed,
    Closed,
}

impl DeviceStatus {
    pub fn is_failed(self) -> bool {
        self == DeviceStatus::Failed
    }

    fn to_bits(self) -> u8 {
        match self {
            DeviceStatus::Opening => 0,
            DeviceStatus::Running => 1,
            DeviceStatus::Failed => 2,
            DeviceStatus::Closed => 3,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => DeviceStatus::Opening,
            1 => DeviceStatus::Running,
            2 => DeviceStatus::Failed,
            _ => DeviceStatus::Closed,
        }
    }
}

/// Shared between the stream host thread, its error callback and the engine
#[derive(Clone, Debug)]
pub struct StreamHealth {
    status: Arc<AtomicU8>,
}

impl StreamHealth {
    pub fn new() -> Self {
        Self {
            status: Arc::new(AtomicU8::new(DeviceStatus::Opening.to_bits())),
        }
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus::from_bits(self.status.load(Ordering::Acquire))
    }

    pub fn mark_running(&self) {
        self.status
            .store(DeviceStatus::Running.to_bits(), Ordering::Release);
    }

    /// Returns true only on the first failure
    pub fn mark_failed(&self) -> bool {
        self.status
            .swap(DeviceStatus::Failed.to_bits(), Ordering::AcqRel)
            != DeviceStatus::Failed.to_bits()
    }

    /// Stream dropped; a failure stays visible
    pub fn mark_closed(&self) {
        let _ = self.status.compare_exchange(
            DeviceStatus::Running.to_bits(),
            DeviceStatus::Closed.to_bits(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

impl Default for StreamHealth {
    fn default() -> Self {
        Self::new()
    }
}
