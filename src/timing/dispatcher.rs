// Step dispatcher - Deferred UI step notifications
//
// The scheduler runs ~100ms ahead of the audio; each step notification is held
// until the moment its click sounds. Pending steps sit in a deadline-ordered
// heap on a dedicated thread. Steps tagged with an outdated session are dropped
// so nothing fires after stop().

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Step index reported to the observer when playback stops
pub const STOPPED_STEP: i64 = -1;

/// UI step callback: global step index, or `STOPPED_STEP`
pub type StepObserver = Box<dyn FnMut(i64) + Send>;

/// What the transport emits towards the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSignal {
    /// `global_step` starts sounding `delay` from now
    Step {
        global_step: u64,
        delay: Duration,
        session: u64,
    },
    Stopped,
}

/// Destination of step signals
pub trait StepSink: Send {
    fn send(&mut self, signal: StepSignal);
}

/// Discards everything (offline rendering)
#[derive(Debug, Default)]
pub struct NullSink;

impl StepSink for NullSink {
    fn send(&mut self, _signal: StepSignal) {}
}

/// Raw channel sink, delivers signals undelayed
impl StepSink for Sender<StepSignal> {
    fn send(&mut self, signal: StepSignal) {
        let _ = Sender::send(self, signal);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PendingStep {
    deadline: Instant,
    seq: u64,
    global_step: u64,
    session: u64,
}

enum DispatchRequest {
    Step(PendingStep),
    Stopped,
    Shutdown,
}

/// Sink feeding a `StepDispatcher`
///
/// Converts delays into absolute deadlines, clamped so they never go backwards:
/// steps are delivered in the order they were scheduled.
pub struct DispatcherSink {
    tx: Sender<DispatchRequest>,
    last_deadline: Option<Instant>,
    seq: u64,
}

impl StepSink for DispatcherSink {
    fn send(&mut self, signal: StepSignal) {
        let request = match signal {
            StepSignal::Step {
                global_step,
                delay,
                session,
            } => {
                let mut deadline = Instant::now() + delay;
                if let Some(last) = self.last_deadline {
                    deadline = deadline.max(last);
                }
                self.last_deadline = Some(deadline);
                self.seq += 1;
                DispatchRequest::Step(PendingStep {
                    deadline,
                    seq: self.seq,
                    global_step,
                    session,
                })
            }
            StepSignal::Stopped => {
                self.last_deadline = None;
                DispatchRequest::Stopped
            }
        };
        let _ = self.tx.send(request);
    }
}

/// Owns the notification thread
pub struct StepDispatcher {
    tx: Sender<DispatchRequest>,
    thread: Option<JoinHandle<()>>,
}

impl StepDispatcher {
    /// Spawn the thread; only steps whose session matches `session` at delivery time fire
    pub fn spawn(observer: StepObserver, session: Arc<AtomicU64>) -> std::io::Result<Self> {
        let (tx, rx) = unbounded();
        let worker = DispatchWorker {
            rx,
            pending: BinaryHeap::new(),
            observer,
            session,
        };
        let thread = thread::Builder::new()
            .name("step-dispatcher".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            tx,
            thread: Some(thread),
        })
    }

    pub fn sink(&self) -> DispatcherSink {
        DispatcherSink {
            tx: self.tx.clone(),
            last_deadline: None,
            seq: 0,
        }
    }
}

impl Drop for StepDispatcher {
    fn drop(&mut self) {
        let _ = self.tx.send(DispatchRequest::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

struct DispatchWorker {
    rx: Receiver<DispatchRequest>,
    pending: BinaryHeap<Reverse<PendingStep>>,
    observer: StepObserver,
    session: Arc<AtomicU64>,
}

impl DispatchWorker {
    fn run(mut self) {
        loop {
            self.fire_due();

            let received = match self.pending.peek() {
                Some(Reverse(next)) => self.rx.recv_deadline(next.deadline),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(DispatchRequest::Step(step)) => self.pending.push(Reverse(step)),
                Ok(DispatchRequest::Stopped) => {
                    self.pending.clear();
                    (self.observer)(STOPPED_STEP);
                }
                Ok(DispatchRequest::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    fn fire_due(&mut self) {
        let now = Instant::now();
        while let Some(Reverse(next)) = self.pending.peek() {
            if next.deadline > now {
                break;
            }
            let step = *next;
            self.pending.pop();
            if step.session == self.session.load(Ordering::Acquire) {
                (self.observer)(step.global_step as i64);
            }
        }
    }
}
