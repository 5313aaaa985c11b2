//! Slot semantics for the two shared mailbox files.
//!
//! A slot holds at most one item. Zero-length content means "no item present"
//! and is the only synchronization signal exchanged with the simulation: no
//! lock file, no flag file.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Which of the two mailboxes an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    /// Written by the bridge, cleared by the simulation once consumed.
    Command,
    /// Written by the simulation, only ever read by the bridge.
    Response,
}

impl SlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Response => "response",
        }
    }
}

impl std::fmt::Display for SlotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed state of a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotContent {
    Empty,
    Occupied(Bytes),
}

impl SlotContent {
    pub fn from_bytes(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            Self::Empty
        } else {
            Self::Occupied(bytes)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Empty => None,
            Self::Occupied(bytes) => Some(bytes),
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Occupied(bytes) => bytes,
        }
    }
}

impl From<Bytes> for SlotContent {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

/// Sibling path used for staging a write: `{dir}/.{name}.{uuid}.tmp`.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "slot".to_string());
    let staged = format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple());
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(staged),
        _ => PathBuf::from(staged),
    }
}

/// Staging file that is removed on drop unless it was renamed into place.
struct StagingFile {
    path: PathBuf,
    committed: bool,
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staging file");
        }
    }
}

fn write_staged(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut staged = StagingFile {
        path: staging_path(path),
        committed: false,
    };

    let mut file = std::fs::File::create(&staged.path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&staged.path, path)?;
    staged.committed = true;
    Ok(())
}

/// Replace the whole content of `path` with `data`.
///
/// The data is staged in a sibling file and renamed over the target, so a
/// concurrent reader sees either the previous content or the new content,
/// never a prefix of it. The staged write runs on the blocking pool and
/// finishes even if this future is dropped, so the staging file is always
/// either renamed or removed.
pub async fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let target = path.to_path_buf();
    let data = data.to_vec();

    tokio::task::spawn_blocking(move || write_staged(&target, &data))
        .await
        .map_err(io::Error::other)?
        .inspect_err(|e| {
            tracing::debug!(path = %path.display(), error = %e, "Staged slot write failed");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn zero_length_is_empty() {
        assert_eq!(SlotContent::from_bytes(Bytes::new()), SlotContent::Empty);
        assert!(SlotContent::from(Bytes::new()).is_empty());
    }

    #[test]
    fn non_empty_is_occupied() {
        let content = SlotContent::from_bytes(Bytes::from_static(b"{}"));
        assert!(!content.is_empty());
        assert_eq!(content.as_bytes().map(|b| b.as_ref()), Some(&b"{}"[..]));
        assert_eq!(content.into_bytes(), Bytes::from_static(b"{}"));
    }

    #[test]
    fn slot_kind_display() {
        assert_eq!(SlotKind::Command.to_string(), "command");
        assert_eq!(SlotKind::Response.to_string(), "response");
    }

    #[test]
    fn staging_path_is_hidden_sibling() {
        let staged = staging_path(Path::new("/srv/sim/simutrans_input.json"));
        assert_eq!(staged.parent(), Some(Path::new("/srv/sim")));
        let name = staged.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".simutrans_input.json."));
        assert!(name.ends_with(".tmp"));
    }

    #[tokio::test]
    async fn write_atomic_replaces_whole_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slot.json");

        write_atomic(&path, b"{\"id\":\"first-and-longer\"}").await.unwrap();
        write_atomic(&path, b"{\"id\":\"2\"}").await.unwrap();

        let content = tokio::fs::read(&path).await.unwrap();
        assert_eq!(content, b"{\"id\":\"2\"}");

        // Only the target remains; no staging files left behind.
        let mut entries = std::fs::read_dir(dir.path()).unwrap();
        assert!(entries.next().is_some());
        assert!(entries.next().is_none());
    }

    fn staging_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "tmp"))
            .collect()
    }

    #[test]
    fn uncommitted_staging_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".slot.json.abc.tmp");
        std::fs::write(&path, b"partial").unwrap();

        drop(StagingFile {
            path: path.clone(),
            committed: false,
        });
        assert!(!path.exists());

        std::fs::write(&path, b"kept").unwrap();
        drop(StagingFile {
            path: path.clone(),
            committed: true,
        });
        assert!(path.exists());
    }

    #[tokio::test]
    async fn abandoned_write_still_finishes_without_staging_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slot.json");
        let data = vec![b'x'; 1 << 20];

        // Dropped after its first poll, while the blocking write is in flight.
        let abandoned =
            tokio::time::timeout(Duration::ZERO, write_atomic(&path, &data)).await;
        drop(abandoned);

        let mut settled = false;
        for _ in 0..200 {
            if staging_files(dir.path()).is_empty() && path.exists() {
                settled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(settled, "staging file left behind: {:?}", staging_files(dir.path()));
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[tokio::test]
    async fn write_atomic_into_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("slot.json");

        let err = write_atomic(&path, b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
