//! Run monitoring
//!
//! [`RunPoller`] fetches a run's vendor status and folds it into the
//! iteration's progress mark; [`StopDetector`] classifies the result and
//! decides whether an automatic recovery is allowed.

mod detector;
mod poller;

pub use detector::{Assessment, RecoveryDecision, RunClass, StopDetector};
pub use poller::{Observation, RunPoller};
