//! Watched directories and their subdirectories.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A top-level directory watched by a local collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct Directory {
    /// Storage row id (`ROWID`), `-1` until persisted
    pub id: i64,
    pub path: String,
}

impl Directory {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id: -1,
            path: path.into(),
        }
    }
}

/// A directory below a watched [`Directory`], remembered with its mtime so
/// a rescan can skip unchanged trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct Subdirectory {
    pub directory_id: i64,
    pub path: String,
    /// `0` means the subdirectory no longer exists and should be forgotten
    pub mtime: i64,
}

impl Subdirectory {
    pub fn new(directory_id: i64, path: impl Into<String>, mtime: i64) -> Self {
        Self {
            directory_id,
            path: path.into(),
            mtime,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.mtime == 0
    }
}

pub type DirectoryList = Vec<Directory>;
pub type SubdirectoryList = Vec<Subdirectory>;
