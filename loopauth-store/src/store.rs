//! Credential persistence: JSON file guarded by an advisory lock.
//!
//! Every read, write and delete runs under the [`LockGuard`] of the credential
//! path, including within a single process: two stores pointed at the same
//! file serialize through the lock file just like two processes do.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use loopauth_core::{AuthError, Result, UserCredentials};

use crate::lock::{lock_path, LockGuard, LockOptions};

/// File-backed store for one user's credentials.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    lock: LockOptions,
}

impl CredentialStore {
    /// Create a store for `path` with default lock options.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: LockOptions::default(),
        }
    }

    /// Set lock acquisition options.
    #[must_use]
    pub fn with_lock_options(mut self, lock: LockOptions) -> Self {
        self.lock = lock;
        self
    }

    /// Credential file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lock file path.
    pub fn lock_path(&self) -> PathBuf {
        lock_path(&self.path)
    }

    /// Check if a credential file is present.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Persist `credentials`, replacing any previous file.
    pub async fn save(&self, credentials: &UserCredentials) -> Result<()> {
        let json = serde_json::to_string_pretty(credentials)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        self.locked(|| write_atomic(&self.path, json)).await?;
        tracing::debug!(path = %self.path.display(), "Credentials saved");
        Ok(())
    }

    /// Read and parse the credential file.
    pub async fn load(&self) -> Result<UserCredentials> {
        let contents = self
            .locked(|| async { Ok(tokio::fs::read_to_string(&self.path).await?) })
            .await?;
        serde_json::from_str(&contents).map_err(|e| AuthError::corrupt(&self.path, e.to_string()))
    }

    /// Delete the credential file. Returns whether a file was removed.
    pub async fn remove(&self) -> Result<bool> {
        self.locked(|| async {
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Delete the credential file only while it still holds `refresh_token`.
    ///
    /// Returns the stored credentials, untouched, when the file holds a
    /// different refresh token, and `None` once no file remains. An unreadable
    /// file is deleted.
    pub async fn remove_if_refresh_token(&self, refresh_token: &str) -> Result<Option<UserCredentials>> {
        self.locked(|| async {
            let contents = match tokio::fs::read_to_string(&self.path).await {
                Ok(contents) => contents,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_str::<UserCredentials>(&contents) {
                Ok(stored) if stored.refresh_token.encoded != refresh_token => {
                    tracing::debug!(path = %self.path.display(), "Credential file holds a newer refresh token");
                    return Ok(Some(stored));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "Removing unreadable credential file");
                }
            }
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(None),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Run `op` while holding the lock. The lock is released whether or not
    /// `op` succeeds; an error from `op` takes precedence over a release error.
    async fn locked<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let guard = LockGuard::acquire(&self.path, &self.lock).await?;
        let result = op().await;
        let released = guard.release().await;
        let value = result?;
        released?;
        Ok(value)
    }
}

/// Write to a unique temp file next to `path`, then rename it into place.
async fn write_atomic(path: &Path, contents: String) -> Result<()> {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let write = async {
        use tokio::io::AsyncWriteExt;
        let mut file = options.open(&tmp_path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp_path, path).await
    };

    if let Err(e) = write.await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    Ok(())
}
