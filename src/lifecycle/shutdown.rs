//! Shutdown coordination for the proxy.

use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Every request and WebSocket session runs under a child token, so one
/// trigger stops the accept loop and all in-flight copies together.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for one unit of work; cancelled when shutdown triggers.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }
}
