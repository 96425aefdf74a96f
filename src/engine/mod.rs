//! Work-item lifecycle engine: population and processing runs over the queue.

pub mod populate;
pub mod process;
pub mod queue;

pub use populate::{PopulationOutcome, Populator};
pub use process::{ProcessReport, Processor};
pub use queue::{ClaimedItem, WorkIter, WorkQueue};
