//! Structured concurrency: every thread and subprocess the engine spawns is
//! owned by a `ConcurrencyGroup` scope, so a command boundary can cancel and
//! join everything it started in one place.

mod executor;
mod group;
mod process;

pub use executor::ConcurrencyGroupExecutor;
pub use group::{ConcurrencyGroup, ConcurrencyGroupHandle, JoinOutcome};
pub use process::{run_process_to_completion, ProcessOutput};
