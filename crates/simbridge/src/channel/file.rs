//! File-backed slots.
//!
//! Path layout mirrors the simulation script's configuration: the command slot
//! is the script's *input* file, the response slot its *output* file.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use super::ChannelStorage;
use crate::slot::{SlotKind, write_atomic};

#[derive(Debug, Clone)]
pub struct FileChannel {
    command_path: PathBuf,
    response_path: PathBuf,
}

impl FileChannel {
    pub fn new(command_path: impl Into<PathBuf>, response_path: impl Into<PathBuf>) -> Self {
        Self {
            command_path: command_path.into(),
            response_path: response_path.into(),
        }
    }

    pub fn path(&self, slot: SlotKind) -> &Path {
        match slot {
            SlotKind::Command => &self.command_path,
            SlotKind::Response => &self.response_path,
        }
    }
}

#[async_trait]
impl ChannelStorage for FileChannel {
    async fn write(&self, slot: SlotKind, data: &[u8]) -> io::Result<()> {
        let path = self.path(slot);
        tracing::trace!(%slot, path = %path.display(), bytes = data.len(), "Writing slot");
        write_atomic(path, data).await
    }

    async fn read(&self, slot: SlotKind) -> io::Result<Bytes> {
        match tokio::fs::read(self.path(slot)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Bytes::new()),
            Err(e) => Err(e),
        }
    }

    async fn is_empty(&self, slot: SlotKind) -> io::Result<bool> {
        match tokio::fs::metadata(self.path(slot)).await {
            Ok(meta) if meta.is_dir() => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} slot path is a directory", slot),
            )),
            Ok(meta) => Ok(meta.len() == 0),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e),
        }
    }
}
