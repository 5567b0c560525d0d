//! Delegated proxy credentials.
//!
//! The credential is opaque to the engine: it is written verbatim to a file
//! that Condor-G hands to the grid gateway as `x509userproxy`.

use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// A delegated credential together with the time it stops being valid.
#[derive(Clone)]
pub struct Credential {
    data: Vec<u8>,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(data: impl Into<Vec<u8>>, expires_at: DateTime<Utc>) -> Self {
        Self {
            data: data.into(),
            expires_at,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Seconds of validity left at `now`, zero once expired.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("len", &self.data.len())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Write credential bytes readable by the owner only.
pub async fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;

    // The mode only applies on creation; tighten a file left by an older run.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}

/// Read a stored credential, `None` if it was never written or was removed.
pub async fn read_stored(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
