//! Background refresh.
//!
//! [`AutoRefresh`] calls [`OidcClient::refresh`] right away and then again
//! after a small fraction of the remaining access token lifetime, publishing
//! the current access token to subscribers. Since `refresh` logs in when there
//! are no credentials, a logged-out client gets an interactive login from here.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::OidcClient;

/// Scheduling for [`AutoRefresh`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoRefreshOptions {
    /// Fraction of the remaining lifetime to wait between checks.
    pub wait_multiplier: f64,
    /// Shortest wait between checks.
    pub min_interval: Duration,
}

impl Default for AutoRefreshOptions {
    fn default() -> Self {
        Self {
            wait_multiplier: 1.0 / 250.0,
            min_interval: Duration::from_secs(1),
        }
    }
}

impl AutoRefreshOptions {
    /// Set the wait multiplier.
    #[must_use]
    pub fn wait_multiplier(mut self, multiplier: f64) -> Self {
        self.wait_multiplier = multiplier;
        self
    }

    /// Set the minimum interval.
    #[must_use]
    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Wait before the next check, given the remaining access token lifetime.
    pub fn next_wait(&self, remaining: Duration) -> Duration {
        Duration::try_from_secs_f64(remaining.as_secs_f64() * self.wait_multiplier)
            .unwrap_or(self.min_interval)
            .max(self.min_interval)
    }
}

/// Handle to a running background refresher.
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct AutoRefresh {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    token: watch::Receiver<Option<String>>,
}

impl AutoRefresh {
    /// Start refreshing `client` with default scheduling.
    pub fn spawn(client: Arc<OidcClient>) -> Self {
        Self::spawn_with(client, AutoRefreshOptions::default(), CancellationToken::new())
    }

    /// Start refreshing `client`; cancelling `cancel` stops the task.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn_with(
        client: Arc<OidcClient>,
        options: AutoRefreshOptions,
        cancel: CancellationToken,
    ) -> Self {
        let initial = client.snapshot().map(|c| c.access_token.encoded);
        let (tx, token) = watch::channel(initial);
        let handle = tokio::spawn(run(client, options, tx, cancel.clone()));
        Self {
            cancel,
            handle,
            token,
        }
    }

    /// Receiver that sees every new access token.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.token.clone()
    }

    /// Most recently published access token.
    pub fn current(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    /// Check if the task is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the task and wait for it to exit.
    ///
    /// A login or exchange in flight is abandoned.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.handle).await {
            if e.is_panic() {
                tracing::error!(error = %e, "Auto-refresh task panicked");
            }
        }
    }
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    client: Arc<OidcClient>,
    options: AutoRefreshOptions,
    tx: watch::Sender<Option<String>>,
    cancel: CancellationToken,
) {
    tracing::debug!(?options, "Auto-refresh started");
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = client.refresh() => result,
        };
        match result {
            Ok(outcome) => tracing::debug!(?outcome, "Auto-refresh check"),
            Err(e) => tracing::warn!(error = %e, "Auto-refresh failed"),
        }

        let snapshot = client.snapshot();
        let token = snapshot.as_ref().map(|c| c.access_token.encoded.clone());
        tx.send_if_modified(|current| {
            if *current == token {
                return false;
            }
            *current = token;
            true
        });

        let remaining = snapshot
            .map(|c| c.remaining(Utc::now()))
            .unwrap_or_default();
        let wait = options.next_wait(remaining);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }
    tracing::debug!("Auto-refresh stopped");
}
