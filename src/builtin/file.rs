use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, warn};

use crate::{
    error::TaskError,
    task::{Context, Provision, Provisioner},
    util::hash_file,
};

/// Copies a file. Skipped when the destination is already in place; a
/// failed or cancelled copy removes the partial destination.
#[derive(Debug, Clone)]
pub struct FileCopy {
    source: PathBuf,
    destination: PathBuf,
    checksum: bool,
}

impl FileCopy {
    /// Skips the copy whenever the destination exists.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Provision<Self> {
        Provision::new(Self {
            source: source.into(),
            destination: destination.into(),
            checksum: false,
        })
    }

    /// Skips the copy only when source and destination have the same
    /// BLAKE3 digest.
    pub fn checksummed(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Provision<Self> {
        Provision::new(Self {
            source: source.into(),
            destination: destination.into(),
            checksum: true,
        })
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

#[async_trait]
impl Provisioner for FileCopy {
    async fn expect(&self) -> Result<bool, TaskError> {
        if !self.checksum {
            return Ok(tokio::fs::try_exists(&self.destination).await?);
        }

        let source = hash_file(&self.source).await?;
        let destination = match hash_file(&self.destination).await {
            Ok(hash) => hash,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        Ok(source == destination)
    }

    async fn start(&self, ctx: Context) -> Result<(), TaskError> {
        debug!(
            source = %self.source.display(),
            destination = %self.destination.display(),
            "copying file"
        );
        let mut input = File::open(&self.source).await?;
        let mut output = File::create(&self.destination).await?;
        let mut buf = vec![0u8; 32 * 1024];

        loop {
            let n = tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    return Err(std::io::Error::new(ErrorKind::Interrupted, "copy cancelled").into());
                }
                n = input.read(&mut buf) => n?,
            };
            if n == 0 {
                break;
            }
            output.write_all(&buf[..n]).await?;
        }

        output.flush().await?;
        Ok(())
    }

    fn abort(&self) {
        if let Err(e) = std::fs::remove_file(&self.destination) {
            if e.kind() != ErrorKind::NotFound {
                warn!(
                    destination = %self.destination.display(),
                    error = %e,
                    "failed to remove partial copy"
                );
            }
        }
    }
}
