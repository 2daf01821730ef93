//! Lifecycle storage trait.

use super::{AcquisitionRecord, NewRecord, RecordFilter, RecordState};
use crate::store::StoreError;

/// Durable table of acquisition records.
///
/// Transitions are validated against [`RecordState::can_transition_to`];
/// the store is the single place the state graph is enforced.
pub trait LifecycleStore: Send + Sync {
    /// Insert a record. Fails with `InvalidInput` for an initial state other
    /// than `pending`, `pushing` or `failed`.
    fn create(&self, record: NewRecord) -> Result<AcquisitionRecord, StoreError>;

    fn get(&self, id: &str) -> Result<Option<AcquisitionRecord>, StoreError>;

    /// Whether the account already has a record for this tracker item.
    fn exists_for_item(&self, account_id: &str, item_id: &str) -> Result<bool, StoreError>;

    /// Most recent record on a backend carrying this hash.
    fn find_by_hash(
        &self,
        backend_id: &str,
        info_hash: &str,
    ) -> Result<Option<AcquisitionRecord>, StoreError>;

    /// Records matching the filter, oldest first.
    fn list(&self, filter: &RecordFilter) -> Result<Vec<AcquisitionRecord>, StoreError>;

    fn count(&self, filter: &RecordFilter) -> Result<i64, StoreError>;

    /// Move a record along the state graph. Re-applying the current state
    /// is a no-op that returns the record unchanged.
    fn transition(&self, id: &str, to: RecordState) -> Result<AcquisitionRecord, StoreError>;

    /// Set the content hash. Setting the same value again is accepted;
    /// a different value is a `HashConflict`.
    fn set_hash(&self, id: &str, info_hash: &str) -> Result<AcquisitionRecord, StoreError>;
}
