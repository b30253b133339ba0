//! Per-tab client core: credential storage, the session watchdog, cross-tab
//! synchronization and the incremental list fetcher.

pub mod credential;
pub mod fetch;
pub mod machine;
pub mod storage;
pub mod sync;
pub mod watchdog;

pub use credential::{CredentialStore, SharedSession};
pub use fetch::{FetchCoordinator, FetchOutcome, PageSource, PageTicket, Precheck, ScrollMetrics};
pub use machine::{
    ActivitySignal, ExpiryReason, SessionEvent, SessionMachine, SessionSnapshot, SessionState,
    WatchdogError, WatchdogSettings,
};
pub use storage::{SharedStorage, TabStorage};
pub use watchdog::{AnchoredClock, Clock, SystemClock, WatchdogHandle};
