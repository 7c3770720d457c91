//! Dwell-time accumulation: the per-session counter, the sampling loop that
//! feeds it, and the controller that starts a session and flushes it.

pub mod accumulator;
pub mod controller;
pub mod loop_worker;

pub use accumulator::{AccrualPolicy, DwellAccumulator};
pub use controller::{FlushReport, SessionController, SessionStatus};
pub use loop_worker::{LoopConfig, LoopOutcome, StopReason};
