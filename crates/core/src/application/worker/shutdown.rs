// Shutdown Token for background loops

use tokio::sync::watch;

/// Shutdown signal for graceful termination
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal (returns immediately if already signalled)
    pub async fn wait(&mut self) {
        // Sender dropped also counts as shutdown
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every loop holding a token
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    /// Another token for a newly spawned loop
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_after_signal_returns_immediately() {
        let (tx, mut token) = shutdown_channel();
        let late = tx.token();
        tx.shutdown();

        assert!(token.is_shutdown());
        tokio::time::timeout(Duration::from_millis(100), token.wait())
            .await
            .unwrap();
        assert!(late.is_shutdown());
    }
}
