use std::path::PathBuf;

use bytes::Bytes;
use serde::Serialize;

use crate::accumulate::FormMap;

/// The decoded content of a request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Form {
    /// Plain field values, nested by bracket notation.
    pub vars: FormMap<String>,
    /// Uploaded files by field name.
    pub files: FormMap<FileRecord>,
}

impl Form {
    /// Creates an empty form.
    pub fn new() -> Form {
        Form::default()
    }

    /// Returns `true` when no field and no file was collected.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.files.is_empty()
    }
}

/// One uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    /// The client supplied filename.
    pub filename: String,
    /// The part's `Content-Transfer-Encoding`, `7bit` when absent.
    pub encoding: String,
    /// The part's `Content-Type`, `text/plain` when absent.
    pub mime_type: String,
    /// Where the content ended up.
    pub stored: Stored,
    /// Set when the file was cut short by [`Limits::file_size`](crate::Limits::file_size).
    pub truncated: bool,
}

impl FileRecord {
    /// The on-disk location, for files persisted to a save directory.
    pub fn path(&self) -> Option<&PathBuf> {
        match &self.stored {
            Stored::Disk(path) => Some(path),
            Stored::Memory(_) => None,
        }
    }

    /// The raw bytes, for files buffered in memory.
    pub fn content(&self) -> Option<&Bytes> {
        match &self.stored {
            Stored::Memory(content) => Some(content),
            Stored::Disk(_) => None,
        }
    }
}

/// The storage of a [`FileRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stored {
    Disk(PathBuf),
    Memory(Bytes),
}
