use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::api::ApiError;

/// Cooperative cancellation shared between a caller and an in-flight request.
/// Clones observe the same flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // Sender lives in self, so wait_for only fails if it is dropped.
        let _ = rx.wait_for(|flag| *flag).await;
    }

    /// Races `fut` against cancellation. The future is dropped on cancel.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        if self.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(ApiError::Cancelled),
            out = fut => out,
        }
    }
}
