use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::MediaError;

/// Token for cooperative interruption, tripped from a signal handler.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(Interrupted)` once cancellation was requested.
    pub fn check(&self) -> Result<(), MediaError> {
        if self.is_cancelled() {
            return Err(MediaError::Interrupted);
        }
        Ok(())
    }
}

/// `check` for an optional token.
pub(crate) fn check(token: Option<&CancellationToken>) -> Result<(), MediaError> {
    token.map_or(Ok(()), CancellationToken::check)
}
