//! Tracker site client.

mod cached;
mod mteam;
mod types;

pub use cached::CachedTracker;
pub use mteam::MTeamClient;
pub use types::{
    Credentials, ItemDetail, Profile, PromotionFilter, SearchPage, SearchRequest, TrackerClient,
    TrackerError, TrackerItem,
};
