//! Operator overrides saved in the directory store and reapplied when the
//! engine starts. Values are JSON under fixed keys.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::directory::DirectoryStore;
use crate::store::StoreError;

pub(crate) const INTERVALS: &str = "engine.intervals";
pub(crate) const AUTO_DELETE: &str = "engine.auto_delete";
pub(crate) const SCHEDULE: &str = "engine.schedule";

/// Saved value for `key`. Unreadable or unparsable values are logged and
/// treated as absent.
pub(crate) fn load<T: DeserializeOwned>(store: &dyn DirectoryStore, key: &str) -> Option<T> {
    let raw = match store.get_setting(key) {
        Ok(raw) => raw?,
        Err(e) => {
            warn!(key, error = %e, "failed to read saved setting");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "ignoring unparsable saved setting");
            None
        }
    }
}

pub(crate) fn save<T: Serialize>(
    store: &dyn DirectoryStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    store.put_setting(key, &raw)
}
