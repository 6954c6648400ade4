// Module timing - Scheduler wake-ups and deferred UI step notifications

pub mod dispatcher;
pub mod ticker;

pub use dispatcher::{
    DispatcherSink, NullSink, STOPPED_STEP, StepDispatcher, StepObserver, StepSignal, StepSink,
};
pub use ticker::TimingSource;
