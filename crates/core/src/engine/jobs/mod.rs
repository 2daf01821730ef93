//! The four policy jobs.

pub mod acquisition;
pub mod eviction;
pub mod expiry;
pub mod refresh;
