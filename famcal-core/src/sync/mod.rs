//! The feed-to-bucket sync pipeline.

pub mod bucket;
pub mod engine;
pub mod normalize;
pub mod protocol;
pub mod reconcile;
pub mod recurrence;
pub mod timezone;
pub mod window;
pub mod writer;

pub use engine::{SyncEngine, SyncFailure, SyncPhase, SyncSettings};
pub use protocol::{
    BatchSyncRequest, BatchSyncResponse, CalendarSyncOutcome, SyncRequest, SyncResponse, SyncTarget,
};
pub use reconcile::{MonthReconciliation, ReconcileStats, reconcile_month};
pub use timezone::TimeNormalization;
pub use window::SyncWindow;
