//! Online/offline tracking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared online flag. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct Connectivity {
    online: Arc<AtomicBool>,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Returns `true` when this call moved the state from offline to online.
    pub fn set_online(&self, online: bool) -> bool {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online != online {
            tracing::info!(online, "Connectivity changed");
        }
        online && !was_online
    }
}
