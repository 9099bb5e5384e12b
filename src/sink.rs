use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use futures_util::stream::{Stream, TryStreamExt};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::form::{FileRecord, Stored};
use crate::helpers;
use crate::part::FilePart;

/// Reads one file part to its end and produces its record.
///
/// With a save directory the bytes go straight to a freshly created file
/// there; otherwise they are buffered in memory.
pub(crate) async fn sink<S>(part: FilePart<S>, save: Option<PathBuf>) -> crate::Result<FileRecord>
where
    S: Stream<Item = Result<Bytes, crate::Error>> + Unpin,
{
    match save {
        Some(dir) => save_to_disk(part, &dir).await,
        None => buffer_in_memory(part).await,
    }
}

async fn save_to_disk<S>(mut part: FilePart<S>, dir: &Path) -> crate::Result<FileRecord>
where
    S: Stream<Item = Result<Bytes, crate::Error>> + Unpin,
{
    let descriptor = part.descriptor().clone();
    let filename = descriptor.file_name.unwrap_or_default();
    let path = dir.join(helpers::random_file_name(&filename));

    let save_failed = |cause: std::io::Error| crate::Error::SaveFailed {
        path: path.clone(),
        cause,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
        .map_err(save_failed)?;
    let mut guard = PartialFile {
        path: path.clone(),
        keep: false,
    };

    while let Some(chunk) = part.try_next().await? {
        file.write_all(&chunk).await.map_err(save_failed)?;
    }

    // Hand the stream back to the tokenizer before the final flush.
    let truncated = part.truncated();
    drop(part);

    file.flush().await.map_err(save_failed)?;
    guard.keep = true;
    log::debug!("saved file part '{}' to {:?}", descriptor.field_name, path);

    Ok(FileRecord {
        filename,
        encoding: descriptor.transfer_encoding,
        mime_type: descriptor.mime_type,
        stored: Stored::Disk(path),
        truncated,
    })
}

/// Removes a file whose save did not complete.
struct PartialFile {
    path: PathBuf,
    keep: bool,
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.keep {
            if let Err(err) = std::fs::remove_file(&self.path) {
                log::warn!("could not remove partial file {:?}: {}", self.path, err);
            }
        }
    }
}

async fn buffer_in_memory<S>(mut part: FilePart<S>) -> crate::Result<FileRecord>
where
    S: Stream<Item = Result<Bytes, crate::Error>> + Unpin,
{
    let mut buf = BytesMut::new();

    while let Some(chunk) = part.try_next().await? {
        buf.extend_from_slice(&chunk);
    }

    let descriptor = part.descriptor().clone();

    Ok(FileRecord {
        filename: descriptor.file_name.unwrap_or_default(),
        encoding: descriptor.transfer_encoding,
        mime_type: descriptor.mime_type,
        stored: Stored::Memory(buf.freeze()),
        truncated: part.truncated(),
    })
}
