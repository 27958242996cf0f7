//! Change notifications emitted by a collection backend.
//!
//! Every notification is sent after the transaction that caused it has
//! committed, so a consumer reacting to one observes a consistent database.

use crate::directory::{Directory, SubdirectoryList};
use crate::song::SongList;
use core_runtime::events::{BusEvent, EventSeverity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum CollectionEvent {
    /// A directory is known, with its remembered subdirectories.
    DirectoryDiscovered {
        directory: Directory,
        subdirs: SubdirectoryList,
    },
    DirectoryDeleted { directory: Directory },
    /// Reply to `get_all_songs`; `id` echoes the caller's request id.
    GotSongs { songs: SongList, id: u64 },
    SongsDiscovered { songs: SongList },
    SongsDeleted { songs: SongList },
    /// Play statistics changed; no tag changed.
    SongsStatisticsChanged { songs: SongList },
    SongsRatingChanged { songs: SongList },
    /// Every row was dropped.
    DatabaseReset,
    TotalSongCountUpdated { count: i64 },
    TotalArtistCountUpdated { count: i64 },
    TotalAlbumCountUpdated { count: i64 },
    /// The backend closed its pool after draining queued work.
    ExitFinished,
    Error { message: String },
}

impl CollectionEvent {
    /// Songs carried by the event, if any.
    pub fn songs(&self) -> Option<&SongList> {
        match self {
            CollectionEvent::GotSongs { songs, .. }
            | CollectionEvent::SongsDiscovered { songs }
            | CollectionEvent::SongsDeleted { songs }
            | CollectionEvent::SongsStatisticsChanged { songs }
            | CollectionEvent::SongsRatingChanged { songs } => Some(songs),
            _ => None,
        }
    }
}

impl BusEvent for CollectionEvent {
    fn description(&self) -> &str {
        match self {
            CollectionEvent::DirectoryDiscovered { .. } => "Directory discovered",
            CollectionEvent::DirectoryDeleted { .. } => "Directory deleted",
            CollectionEvent::GotSongs { .. } => "Songs loaded",
            CollectionEvent::SongsDiscovered { .. } => "Songs discovered",
            CollectionEvent::SongsDeleted { .. } => "Songs deleted",
            CollectionEvent::SongsStatisticsChanged { .. } => "Song statistics changed",
            CollectionEvent::SongsRatingChanged { .. } => "Song rating changed",
            CollectionEvent::DatabaseReset => "Collection database reset",
            CollectionEvent::TotalSongCountUpdated { .. } => "Total song count updated",
            CollectionEvent::TotalArtistCountUpdated { .. } => "Total artist count updated",
            CollectionEvent::TotalAlbumCountUpdated { .. } => "Total album count updated",
            CollectionEvent::ExitFinished => "Collection backend exited",
            CollectionEvent::Error { .. } => "Collection error",
        }
    }

    fn severity(&self) -> EventSeverity {
        match self {
            CollectionEvent::Error { .. } => EventSeverity::Error,
            CollectionEvent::DatabaseReset | CollectionEvent::DirectoryDeleted { .. } => {
                EventSeverity::Warning
            }
            CollectionEvent::TotalSongCountUpdated { .. }
            | CollectionEvent::TotalArtistCountUpdated { .. }
            | CollectionEvent::TotalAlbumCountUpdated { .. } => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::Song;

    #[test]
    fn test_severity() {
        let error = CollectionEvent::Error {
            message: "boom".to_string(),
        };
        assert_eq!(error.severity(), EventSeverity::Error);
        assert_eq!(
            CollectionEvent::TotalSongCountUpdated { count: 1 }.severity(),
            EventSeverity::Debug
        );
        assert_eq!(error.description(), "Collection error");
    }

    #[test]
    fn test_songs_accessor() {
        let event = CollectionEvent::SongsDeleted {
            songs: vec![Song::default()],
        };
        assert_eq!(event.songs().map(Vec::len), Some(1));
        assert!(CollectionEvent::DatabaseReset.songs().is_none());
    }

    #[test]
    fn test_serialization_is_tagged() {
        let json = serde_json::to_value(CollectionEvent::TotalAlbumCountUpdated { count: 3 }).unwrap();
        assert_eq!(json["type"], "TotalAlbumCountUpdated");
        assert_eq!(json["payload"]["count"], 3);
    }
}
