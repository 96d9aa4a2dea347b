//! Runtime helpers shared by the stages and the audit dispatcher.

pub mod runtime;

pub use runtime::{call_with_timeout, run_with_timeout, TimedResult};
