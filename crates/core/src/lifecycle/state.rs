//! Acquisition record state graph.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of an acquisition record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Fetched but not handed to a backend yet.
    Pending,
    /// Handed to a backend; no live status observed yet.
    Pushing,
    Downloading,
    Paused,
    Queued,
    /// Complete and uploading.
    Seeding,
    Completed,
    /// Backend no longer knows the item, or an operator removed it.
    Deleted,
    /// Push failed.
    Failed,
    /// Removed because its promotion ended.
    ExpiredDeleted,
    /// Removed to reclaim disk space.
    DynamicDeleted,
}

impl RecordState {
    pub const ALL: [RecordState; 11] = [
        RecordState::Pending,
        RecordState::Pushing,
        RecordState::Downloading,
        RecordState::Paused,
        RecordState::Queued,
        RecordState::Seeding,
        RecordState::Completed,
        RecordState::Deleted,
        RecordState::Failed,
        RecordState::ExpiredDeleted,
        RecordState::DynamicDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordState::Pending => "pending",
            RecordState::Pushing => "pushing",
            RecordState::Downloading => "downloading",
            RecordState::Paused => "paused",
            RecordState::Queued => "queued",
            RecordState::Seeding => "seeding",
            RecordState::Completed => "completed",
            RecordState::Deleted => "deleted",
            RecordState::Failed => "failed",
            RecordState::ExpiredDeleted => "expired_deleted",
            RecordState::DynamicDeleted => "dynamic_deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == value)
    }

    /// Terminal states have no outgoing edges.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecordState::Completed
                | RecordState::Deleted
                | RecordState::Failed
                | RecordState::ExpiredDeleted
                | RecordState::DynamicDeleted
        )
    }

    /// States the expiry scan considers.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            RecordState::Pending
                | RecordState::Pushing
                | RecordState::Downloading
                | RecordState::Paused
                | RecordState::Queued
        )
    }

    fn is_transfer(&self) -> bool {
        matches!(
            self,
            RecordState::Downloading | RecordState::Paused | RecordState::Queued
        )
    }

    /// Whether `self -> next` is an edge of the graph.
    pub fn can_transition_to(&self, next: RecordState) -> bool {
        use RecordState::*;

        if self.is_terminal() || *self == next {
            return false;
        }
        if matches!(next, Deleted | Failed | ExpiredDeleted | DynamicDeleted) {
            return true;
        }
        match self {
            Pending => next == Pushing,
            Pushing => next.is_transfer() || matches!(next, Seeding | Completed),
            Downloading | Paused | Queued => {
                next.is_transfer() || matches!(next, Seeding | Completed)
            }
            Seeding => next == Completed,
            _ => false,
        }
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path() {
        assert!(RecordState::Pending.can_transition_to(RecordState::Pushing));
        assert!(RecordState::Pushing.can_transition_to(RecordState::Downloading));
        assert!(RecordState::Downloading.can_transition_to(RecordState::Paused));
        assert!(RecordState::Queued.can_transition_to(RecordState::Seeding));
        assert!(RecordState::Seeding.can_transition_to(RecordState::Completed));
    }

    #[test]
    fn test_no_backward_edges() {
        assert!(!RecordState::Pushing.can_transition_to(RecordState::Pending));
        assert!(!RecordState::Downloading.can_transition_to(RecordState::Pushing));
        assert!(!RecordState::Seeding.can_transition_to(RecordState::Downloading));
        assert!(!RecordState::Pending.can_transition_to(RecordState::Downloading));
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        for from in RecordState::ALL.iter().filter(|s| s.is_terminal()) {
            for to in RecordState::ALL {
                assert!(
                    !from.can_transition_to(to),
                    "{} -> {} should be rejected",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_removed_states_never_reach_completed_or_seeding() {
        for from in [
            RecordState::ExpiredDeleted,
            RecordState::DynamicDeleted,
            RecordState::Deleted,
            RecordState::Failed,
        ] {
            assert!(!from.can_transition_to(RecordState::Completed));
            assert!(!from.can_transition_to(RecordState::Seeding));
        }
    }

    #[test]
    fn test_escape_edges_from_every_live_state() {
        for from in RecordState::ALL.iter().filter(|s| !s.is_terminal()) {
            for to in [
                RecordState::Deleted,
                RecordState::Failed,
                RecordState::ExpiredDeleted,
                RecordState::DynamicDeleted,
            ] {
                assert!(from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_parse_roundtrip() {
        for state in RecordState::ALL {
            assert_eq!(RecordState::parse(state.as_str()), Some(state));
        }
        assert_eq!(RecordState::parse("bogus"), None);
        assert!(!RecordState::Seeding.is_in_flight());
        assert!(RecordState::Pushing.is_in_flight());
    }
}
