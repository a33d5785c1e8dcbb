#![allow(dead_code)]

//! Explicit cancellation for in-flight worker invocations.
//!
//! Cancellation is opt-in only: dropping an invocation handle or ceasing to
//! observe an invocation never cancels the underlying process.

use std::sync::Arc;
use tokio::sync::watch;

/// Cancellation token for a worker invocation.
///
/// Cloned tokens share state: cancelling any clone cancels them all.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Create a new, uncancelled token.
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Cancel the token.
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until cancelled.
    pub async fn cancelled(&mut self) {
        while !*self.receiver.borrow() {
            if self.receiver.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire SIGINT/SIGTERM (Ctrl+C elsewhere) to a token so an operator can
/// cancel a foreground invocation.
pub async fn wire_signals(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("received SIGINT, cancelling invocation");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, cancelling invocation");
            }
        }

        token.cancel();
    }

    #[cfg(not(unix))]
    {
        use tokio::signal::ctrl_c;

        ctrl_c().await.expect("failed to install Ctrl+C handler");
        tracing::info!("received Ctrl+C, cancelling invocation");
        token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_to_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();

        token.cancel();

        assert!(token.is_cancelled());
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = CancellationToken::new();
        let mut waiter = token.clone();

        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });

        token.cancel();
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_if_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();

        let mut waiter = token.clone();
        waiter.cancelled().await;
    }
}
