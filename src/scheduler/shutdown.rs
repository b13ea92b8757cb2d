use std::time::Duration;

use futures::future;
use tokio::select;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

/// Process-wide SIGINT/SIGTERM notification, cheap to clone into every loop that sleeps.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<Option<&'static str>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            rx: spawn_shutdown_listener(),
        }
    }

    pub fn requested(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Name of the signal that requested the shutdown, if any.
    pub fn reason(&self) -> Option<&'static str> {
        *self.rx.borrow()
    }

    /// Resolves once a shutdown is requested.
    pub async fn wait(&mut self) {
        if self.rx.wait_for(Option::is_some).await.is_err() {
            // Listener gone without a signal: nothing will ever be requested.
            future::pending::<()>().await;
        }
    }

    /// Sleeps for `duration`; returns `false` if interrupted by a shutdown request.
    pub async fn sleep_or_shutdown(&mut self, duration: Duration) -> bool {
        if self.requested() {
            return false;
        }
        select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.wait() => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn channel() -> (watch::Sender<Option<&'static str>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_shutdown_listener() -> watch::Receiver<Option<&'static str>> {
    let (shutdown_tx, shutdown_rx) = watch::channel(None);

    tokio::spawn(async move {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).ok();

        let term_future = async {
            if let Some(ref mut sigterm) = sigterm {
                sigterm.recv().await;
                Some("SIGTERM")
            } else {
                future::pending::<Option<&'static str>>().await
            }
        };

        select! {
            res = signal::ctrl_c() => {
                if res.is_ok() {
                    info!("Received SIGINT.");
                    let _ = shutdown_tx.send(Some("SIGINT"));
                } else {
                    warn!("Failed to listen for SIGINT: {:?}", res.err());
                }
            }
            _ = term_future => {
                info!("Received SIGTERM.");
                let _ = shutdown_tx.send(Some("SIGTERM"));
            }
        }

        // Keep the sender alive so receivers never observe a closed channel.
        shutdown_tx.closed().await;
    });

    shutdown_rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_signal() {
        let (_tx, mut shutdown) = Shutdown::channel();
        assert!(shutdown.sleep_or_shutdown(Duration::from_secs(30)).await);
        assert!(!shutdown.requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_signal() {
        let (tx, mut shutdown) = Shutdown::channel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(Some("SIGTERM")).unwrap();
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        assert!(!shutdown.sleep_or_shutdown(Duration::from_secs(30)).await);
        assert_eq!(shutdown.reason(), Some("SIGTERM"));
        assert!(!shutdown.sleep_or_shutdown(Duration::from_secs(30)).await);
    }
}
