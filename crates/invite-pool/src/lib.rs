//! Concurrent submission engine
//!
//! Keeps a bounded pool of submission tasks saturated with freshly generated,
//! exclusively claimed tokens until the run is cancelled or the credential is
//! rejected.
//!
//! Token lifecycle:
//! 1. `Generate` produces a candidate
//! 2. `ClaimStore::try_claim` reserves it (fails if used or known invalid)
//! 3. A submission task runs it through the `RetryPolicy`
//! 4. The scheduler applies the `Outcome`: success is kept and recorded,
//!    invalid is excluded forever, anything exhausted is released
//! 5. A replacement token is dispatched unless the run is stopping

pub mod aggregator;
pub mod claims;
pub mod error;
pub mod generator;
pub mod ledger;
pub mod outcome;
pub mod retry;
pub mod scheduler;
pub mod task;

pub use aggregator::{Aggregator, Counters, Summary};
pub use claims::{ClaimSizes, ClaimStore};
pub use error::{Error, Result};
pub use generator::{Generate, RandomGenerator};
pub use ledger::{Ledger, RecordPaths, load_tokens};
pub use outcome::{Cause, Outcome};
pub use retry::RetryPolicy;
pub use scheduler::{Disposition, Scheduler, SchedulerConfig, disposition};
pub use task::{WorkItem, run_submission};
