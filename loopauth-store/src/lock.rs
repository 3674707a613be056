//! Advisory lock files.
//!
//! A lock is a sibling file (`credentials.json` → `credentials.lock`) created
//! with `create_new`, so only one participant can hold it at a time. Its
//! content records the owning process id and a per-acquisition token; release
//! refuses to delete a lock whose record differs from the one written.
//!
//! This is cooperative locking. It only excludes processes that follow the
//! same protocol; anything else can still read or write the credential file.
//! A lock left behind by a crashed process is never broken automatically: it
//! surfaces as [`AuthError::LockTimeout`] until someone removes it.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use loopauth_core::{AuthError, Result};
use tokio::io::AsyncWriteExt;

/// Lock acquisition backoff.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Give up after this long.
    pub timeout: Duration,
    /// First delay between attempts.
    pub initial_delay: Duration,
    /// Delay cap.
    pub max_delay: Duration,
    /// Multiplier for each attempt.
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(250),
            multiplier: 2.0,
            jitter: 0.5,
        }
    }
}

impl LockOptions {
    /// Create default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the acquisition timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set initial delay.
    #[must_use]
    pub fn initial_delay(mut self, d: Duration) -> Self {
        self.initial_delay = d;
        self
    }

    /// Set max delay.
    #[must_use]
    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_delay = d;
        self
    }

    /// Calculate delay before the next attempt.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt.min(32) as i32);
        let jitter = base_delay * self.jitter * rand_jitter();
        let delay = (base_delay + jitter).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(delay.max(0.0))
    }
}

fn rand_jitter() -> f64 {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    rng.gen_range(-1.0..1.0)
}

/// Lock file path guarding `target`.
///
/// A `target` that already has the `lock` extension maps onto itself; such a
/// path cannot be guarded and [`LockGuard::acquire`] rejects it.
pub fn lock_path(target: &Path) -> PathBuf {
    target.with_extension("lock")
}

/// Longest owner record excerpt carried in a [`AuthError::LockOwnership`].
const FOUND_EXCERPT_CHARS: usize = 80;

fn excerpt(found: &str) -> String {
    found
        .lines()
        .next()
        .unwrap_or_default()
        .chars()
        .take(FOUND_EXCERPT_CHARS)
        .collect()
}

/// A held lock. Release it with [`LockGuard::release`].
///
/// Dropping an unreleased guard makes a best-effort release.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    owner: String,
    released: bool,
}

impl LockGuard {
    /// Acquire the lock guarding `target`, retrying until `options.timeout`.
    pub async fn acquire(target: &Path, options: &LockOptions) -> Result<Self> {
        let path = lock_path(target);
        if path == target {
            return Err(AuthError::Configuration(format!(
                "{} cannot be guarded: it is its own lock file",
                target.display()
            )));
        }
        let owner = format!("OWNED BY PID {} ({})", std::process::id(), uuid::Uuid::new_v4());
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    let written = async {
                        file.write_all(owner.as_bytes()).await?;
                        file.flush().await
                    };
                    if let Err(e) = written.await {
                        let _ = tokio::fs::remove_file(&path).await;
                        return Err(e.into());
                    }
                    tracing::debug!(lock = %path.display(), attempt, "Lock acquired");
                    return Ok(Self {
                        path,
                        owner,
                        released: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }

            let waited = start.elapsed();
            if waited >= options.timeout {
                return Err(AuthError::LockTimeout { path, waited });
            }
            let delay = options.calculate_delay(attempt).min(options.timeout - waited);
            tracing::debug!(lock = %path.display(), attempt, ?delay, "Lock busy, backing off");
            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }

    /// Lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Owner record written into the lock file.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Verify ownership and delete the lock file.
    ///
    /// A lock whose record does not match (or that vanished) is left alone and
    /// reported as [`AuthError::LockOwnership`], carrying the first line of the
    /// record found.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        let found = match tokio::fs::read_to_string(&self.path).await {
            Ok(found) => found,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        if found != self.owner {
            return Err(AuthError::LockOwnership {
                path: self.path.clone(),
                expected: self.owner.clone(),
                found: excerpt(&found),
            });
        }
        tokio::fs::remove_file(&self.path).await?;
        tracing::debug!(lock = %self.path.display(), "Lock released");
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::read_to_string(&self.path) {
            Ok(found) if found == self.owner => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    tracing::warn!(lock = %self.path.display(), error = %e, "Failed to remove abandoned lock");
                }
            }
            Ok(_) => {
                tracing::warn!(lock = %self.path.display(), "Abandoned lock is owned by someone else; leaving it");
            }
            Err(_) => {}
        }
    }
}
