pub mod initial_sync;
pub mod poller;
pub mod run_loop;

pub use initial_sync::{InitialSyncOutcome, InitialSyncService, StopReason};
pub use poller::{PollOutcome, Poller};
pub use run_loop::{CancellationToken, RunLoop, UserLocks};
