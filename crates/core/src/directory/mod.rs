//! Tracker accounts, acquisition rules and download backend descriptors.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteDirectoryStore;
pub use store::DirectoryStore;
pub use types::{
    Account, AccountStats, Backend, BackendKind, NewAccount, NewBackend, NewRule, Rule, RuleMode,
};
