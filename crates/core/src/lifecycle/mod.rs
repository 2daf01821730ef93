//! Acquisition records and their state machine.

mod sqlite_store;
mod state;
mod store;
mod types;

pub use sqlite_store::SqliteLifecycleStore;
pub use state::RecordState;
pub use store::LifecycleStore;
pub use types::{AcquisitionRecord, NewRecord, RecordFilter};
