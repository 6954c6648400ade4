// Timing source - Periodic wake-up thread for the scheduler
//
// Carries no payload: every tick just invokes the callback. The thread is
// independent from any UI loop so scheduling survives a starved main thread.

use crossbeam_channel::{Sender, bounded, select, tick};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct TimingSource {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TimingSource {
    /// Start ticking every `interval`
    ///
    /// The callback returns false to end the thread on its own (natural end
    /// of a non-looping sequence).
    pub fn start<F>(interval: Duration, mut on_tick: F) -> std::io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticker = tick(interval);

        let thread = thread::Builder::new()
            .name("timing-source".to_string())
            .spawn(move || {
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            if !on_tick() {
                                log::debug!("Timing source finished");
                                break;
                            }
                        }
                    }
                }
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Stop ticking and wait for the thread; safe to call from the tick callback itself
    pub fn stop(&mut self) {
        // Dropping the sender wakes the select! even if the thread already exited
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                return;
            }
            let _ = thread.join();
        }
    }
}

impl Drop for TimingSource {
    fn drop(&mut self) {
        self.stop();
    }
}
