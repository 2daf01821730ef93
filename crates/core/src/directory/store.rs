//! Directory storage trait.

use super::{Account, AccountStats, Backend, NewAccount, NewBackend, NewRule, Rule};
use crate::store::StoreError;

/// Durable CRUD over accounts, rules and backends, plus the engine
/// settings operators change at runtime.
pub trait DirectoryStore: Send + Sync {
    fn create_account(&self, request: NewAccount) -> Result<Account, StoreError>;

    fn get_account(&self, id: &str) -> Result<Option<Account>, StoreError>;

    fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Overwrite cached traffic stats. Only the refresh job calls this.
    fn update_account_stats(&self, id: &str, stats: &AccountStats) -> Result<(), StoreError>;

    /// Create a rule. The owning account must exist.
    fn create_rule(&self, request: NewRule) -> Result<Rule, StoreError>;

    fn get_rule(&self, id: &str) -> Result<Option<Rule>, StoreError>;

    fn list_rules(&self) -> Result<Vec<Rule>, StoreError>;

    /// Enabled rules in creation order.
    fn list_enabled_rules(&self) -> Result<Vec<Rule>, StoreError>;

    fn create_backend(&self, request: NewBackend) -> Result<Backend, StoreError>;

    fn get_backend(&self, id: &str) -> Result<Option<Backend>, StoreError>;

    fn list_backends(&self) -> Result<Vec<Backend>, StoreError>;

    /// Saved JSON value for a setting key.
    fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or replace a setting.
    fn put_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
