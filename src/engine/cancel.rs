// src/engine/cancel.rs
// =============================================================================
// A cloneable cancel switch for a batch run.
//
// The UI side keeps one clone (e.g. wired to Ctrl-C) and hands another to
// the dispatcher. Cancelling is one-way: once set it stays set.
// =============================================================================

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self { state: Arc::new(state) }
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once `cancel` has been called (immediately if it already was).
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in self, so the channel cannot close under us
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
