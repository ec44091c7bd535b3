//! Inbound reply synchronization.
//!
//! The [`Scheduler`] decides when a run happens and what window it covers;
//! the [`SyncEngine`] performs the run against a [`Mailbox`]:
//!
//! ```text
//! connect → lock(inbox) → messages → unlock → lock(sent) → messages → unlock → logout
//! ```

mod clock;
mod engine;
pub mod ingest;
mod mailbox;
mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{FolderSummary, SyncEngine, SyncRun};
pub use mailbox::{FolderInfo, ImapConnector, Mailbox, MailboxConnector, MailboxMessage};
pub use scheduler::{
    RunOutcome, RunSummary, Scheduler, SchedulerState, SchedulerStatus, Trigger, TriggerResult,
};
