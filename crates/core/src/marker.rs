// PIA Status - Kill-switch carry-over marker
// Durable "restore the kill switch afterwards" flag; existence is the value

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct CarryOverMarker {
    path: PathBuf,
}

impl CarryOverMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record that the kill switch must be restored
    pub async fn set(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, b"").await?;
        info!("Kill-switch carry-over recorded at {}", self.path.display());
        Ok(())
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Remove the marker; removing an absent marker is not an error
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Removed kill-switch carry-over: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
