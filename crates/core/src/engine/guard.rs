//! Per-class overlap guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tracks whether a job class is running. A second acquisition while the
/// first [`RunGuard`] is alive fails, so the overlapping run is skipped.
#[derive(Debug, Clone, Default)]
pub struct OverlapGuard {
    is_running: Arc<AtomicBool>,
}

impl OverlapGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard {
                flag: Arc::clone(&self.is_running),
            })
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

/// Releases the running flag when dropped, including on panic.
#[derive(Debug)]
pub struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
