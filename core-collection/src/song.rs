//! Song record as stored in a collection songs table.
//!
//! A [`Song`] is consumed, not owned, by the collection: tag readers and
//! streaming clients fill it in, the backend persists the columns listed in
//! [`Song::COLUMNS`], and the model copies it into leaf nodes.

use crate::sql::QueryValue;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

pub type SongList = Vec<Song>;

/// Where a song comes from. Stored as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Source {
    #[default]
    Unknown,
    LocalFile,
    Collection,
    Cdda,
    Device,
    Stream,
    Tidal,
    Subsonic,
    Qobuz,
    SomaFm,
    RadioParadise,
}

impl Source {
    pub fn code(self) -> i64 {
        match self {
            Source::Unknown => 0,
            Source::LocalFile => 1,
            Source::Collection => 2,
            Source::Cdda => 3,
            Source::Device => 4,
            Source::Stream => 5,
            Source::Tidal => 6,
            Source::Subsonic => 7,
            Source::Qobuz => 8,
            Source::SomaFm => 9,
            Source::RadioParadise => 10,
        }
    }

    /// Stable lowercase name, used in cache keys.
    pub fn text(self) -> &'static str {
        match self {
            Source::Unknown => "unknown",
            Source::LocalFile => "file",
            Source::Collection => "collection",
            Source::Cdda => "cd",
            Source::Device => "device",
            Source::Stream => "stream",
            Source::Tidal => "tidal",
            Source::Subsonic => "subsonic",
            Source::Qobuz => "qobuz",
            Source::SomaFm => "somafm",
            Source::RadioParadise => "radioparadise",
        }
    }
}

impl From<i64> for Source {
    fn from(code: i64) -> Self {
        match code {
            1 => Source::LocalFile,
            2 => Source::Collection,
            3 => Source::Cdda,
            4 => Source::Device,
            5 => Source::Stream,
            6 => Source::Tidal,
            7 => Source::Subsonic,
            8 => Source::Qobuz,
            9 => Source::SomaFm,
            10 => Source::RadioParadise,
            _ => Source::Unknown,
        }
    }
}

/// Container/codec of the underlying file. Stored as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FileType {
    #[default]
    Unknown,
    Wav,
    Flac,
    WavPack,
    OggFlac,
    OggVorbis,
    OggOpus,
    OggSpeex,
    Mpeg,
    Mp4,
    Asf,
    Aiff,
    Mpc,
    TrueAudio,
    Dsf,
    Dsdiff,
    Pcm,
    Ape,
    Cdda,
    Stream,
}

impl FileType {
    pub fn code(self) -> i64 {
        match self {
            FileType::Unknown => 0,
            FileType::Wav => 1,
            FileType::Flac => 2,
            FileType::WavPack => 3,
            FileType::OggFlac => 4,
            FileType::OggVorbis => 5,
            FileType::OggOpus => 6,
            FileType::OggSpeex => 7,
            FileType::Mpeg => 8,
            FileType::Mp4 => 9,
            FileType::Asf => 10,
            FileType::Aiff => 11,
            FileType::Mpc => 12,
            FileType::TrueAudio => 13,
            FileType::Dsf => 14,
            FileType::Dsdiff => 15,
            FileType::Pcm => 16,
            FileType::Ape => 17,
            FileType::Cdda => 90,
            FileType::Stream => 91,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            FileType::Unknown => "Unknown",
            FileType::Wav => "Wav",
            FileType::Flac => "FLAC",
            FileType::WavPack => "WavPack",
            FileType::OggFlac => "Ogg FLAC",
            FileType::OggVorbis => "Ogg Vorbis",
            FileType::OggOpus => "Ogg Opus",
            FileType::OggSpeex => "Ogg Speex",
            FileType::Mpeg => "MP3",
            FileType::Mp4 => "MP4 AAC",
            FileType::Asf => "Windows Media audio",
            FileType::Aiff => "AIFF",
            FileType::Mpc => "Musepack",
            FileType::TrueAudio => "TrueAudio",
            FileType::Dsf => "DSD Stream File",
            FileType::Dsdiff => "DSD Interchange File Format",
            FileType::Pcm => "PCM",
            FileType::Ape => "Monkey's Audio",
            FileType::Cdda => "CDDA",
            FileType::Stream => "Stream",
        }
    }
}

impl From<i64> for FileType {
    fn from(code: i64) -> Self {
        match code {
            1 => FileType::Wav,
            2 => FileType::Flac,
            3 => FileType::WavPack,
            4 => FileType::OggFlac,
            5 => FileType::OggVorbis,
            6 => FileType::OggOpus,
            7 => FileType::OggSpeex,
            8 => FileType::Mpeg,
            9 => FileType::Mp4,
            10 => FileType::Asf,
            11 => FileType::Aiff,
            12 => FileType::Mpc,
            13 => FileType::TrueAudio,
            14 => FileType::Dsf,
            15 => FileType::Dsdiff,
            16 => FileType::Pcm,
            17 => FileType::Ape,
            90 => FileType::Cdda,
            91 => FileType::Stream,
            _ => FileType::Unknown,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// One row of a songs table.
///
/// Integer fields use `-1` for "unknown", matching the column defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Song {
    /// Storage row id (`ROWID`), `-1` until persisted
    pub id: i64,
    pub title: String,
    pub album: String,
    pub artist: String,
    pub albumartist: String,
    pub track: i32,
    pub disc: i32,
    pub year: i32,
    pub originalyear: i32,
    pub genre: String,
    pub compilation: bool,
    pub composer: String,
    pub performer: String,
    pub grouping: String,
    pub comment: String,
    pub artist_id: String,
    pub album_id: String,
    /// Source-stable identifier, empty for local files
    pub song_id: String,
    /// Offset into the file in nanoseconds, for cue-carved tracks
    pub beginning: i64,
    pub length_nanosec: i64,
    pub bitrate: i32,
    pub samplerate: i32,
    pub bitdepth: i32,
    #[sqlx(try_from = "i64")]
    pub source: Source,
    pub directory_id: i64,
    pub url: String,
    #[sqlx(try_from = "i64")]
    pub filetype: FileType,
    pub filesize: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub unavailable: bool,
    pub fingerprint: String,
    pub playcount: i32,
    pub skipcount: i32,
    pub lastplayed: i64,
    pub lastseen: i64,
    pub compilation_detected: bool,
    pub compilation_on: bool,
    pub compilation_off: bool,
    pub compilation_effective: bool,
    pub art_automatic: String,
    pub art_manual: String,
    pub cue_path: String,
    pub rating: f64,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            id: -1,
            title: String::new(),
            album: String::new(),
            artist: String::new(),
            albumartist: String::new(),
            track: -1,
            disc: -1,
            year: -1,
            originalyear: -1,
            genre: String::new(),
            compilation: false,
            composer: String::new(),
            performer: String::new(),
            grouping: String::new(),
            comment: String::new(),
            artist_id: String::new(),
            album_id: String::new(),
            song_id: String::new(),
            beginning: 0,
            length_nanosec: 0,
            bitrate: -1,
            samplerate: -1,
            bitdepth: -1,
            source: Source::Unknown,
            directory_id: -1,
            url: String::new(),
            filetype: FileType::Unknown,
            filesize: -1,
            mtime: -1,
            ctime: -1,
            unavailable: false,
            fingerprint: String::new(),
            playcount: 0,
            skipcount: 0,
            lastplayed: -1,
            lastseen: -1,
            compilation_detected: false,
            compilation_on: false,
            compilation_off: false,
            compilation_effective: false,
            art_automatic: String::new(),
            art_manual: String::new(),
            cue_path: String::new(),
            rating: -1.0,
        }
    }
}

impl Song {
    /// Persisted columns, in the order [`Song::column_values`] yields them.
    pub const COLUMNS: &'static [&'static str] = &[
        "title",
        "album",
        "artist",
        "albumartist",
        "track",
        "disc",
        "year",
        "originalyear",
        "genre",
        "compilation",
        "composer",
        "performer",
        "grouping",
        "comment",
        "artist_id",
        "album_id",
        "song_id",
        "beginning",
        "length_nanosec",
        "bitrate",
        "samplerate",
        "bitdepth",
        "source",
        "directory_id",
        "url",
        "filetype",
        "filesize",
        "mtime",
        "ctime",
        "unavailable",
        "fingerprint",
        "playcount",
        "skipcount",
        "lastplayed",
        "lastseen",
        "compilation_detected",
        "compilation_on",
        "compilation_off",
        "compilation_effective",
        "art_automatic",
        "art_manual",
        "effective_albumartist",
        "effective_originalyear",
        "cue_path",
        "rating",
    ];

    /// Comma-separated [`Song::COLUMNS`].
    pub fn column_spec() -> String {
        Self::COLUMNS.join(", ")
    }

    /// Column list prefixed with the row id, as read back by `FromRow`.
    pub fn select_spec(table: &str) -> String {
        format!("{}.ROWID AS id, {}", table, Self::column_spec())
    }

    /// Values for [`Song::COLUMNS`], with derived columns recomputed.
    pub fn column_values(&self) -> Vec<QueryValue> {
        vec![
            self.title.as_str().into(),
            self.album.as_str().into(),
            self.artist.as_str().into(),
            self.albumartist.as_str().into(),
            self.track.into(),
            self.disc.into(),
            self.year.into(),
            self.originalyear.into(),
            self.genre.as_str().into(),
            self.compilation.into(),
            self.composer.as_str().into(),
            self.performer.as_str().into(),
            self.grouping.as_str().into(),
            self.comment.as_str().into(),
            self.artist_id.as_str().into(),
            self.album_id.as_str().into(),
            self.song_id.as_str().into(),
            self.beginning.into(),
            self.length_nanosec.into(),
            self.bitrate.into(),
            self.samplerate.into(),
            self.bitdepth.into(),
            self.source.code().into(),
            self.directory_id.into(),
            self.url.as_str().into(),
            self.filetype.code().into(),
            self.filesize.into(),
            self.mtime.into(),
            self.ctime.into(),
            self.unavailable.into(),
            self.fingerprint.as_str().into(),
            self.playcount.into(),
            self.skipcount.into(),
            self.lastplayed.into(),
            self.lastseen.into(),
            self.compilation_detected.into(),
            self.compilation_on.into(),
            self.compilation_off.into(),
            self.is_compilation().into(),
            self.art_automatic.as_str().into(),
            self.art_manual.as_str().into(),
            self.effective_albumartist().into(),
            self.effective_originalyear().into(),
            self.cue_path.as_str().into(),
            QueryValue::Real(self.rating),
        ]
    }

    pub fn is_persisted(&self) -> bool {
        self.id != -1
    }

    /// Album artist, falling back to the track artist.
    pub fn effective_albumartist(&self) -> &str {
        if self.albumartist.is_empty() {
            &self.artist
        } else {
            &self.albumartist
        }
    }

    /// Original release year, falling back to the release year.
    pub fn effective_originalyear(&self) -> i32 {
        if self.originalyear < 0 {
            self.year
        } else {
            self.originalyear
        }
    }

    /// `(compilation OR detected OR forced on) AND NOT forced off`
    pub fn is_compilation(&self) -> bool {
        (self.compilation || self.compilation_detected || self.compilation_on)
            && !self.compilation_off
    }

    pub fn text_for_filetype(&self) -> &'static str {
        self.filetype.text()
    }

    /// Last path component of the URL.
    pub fn basefilename(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(&self.url)
    }

    /// Title for display in a compilation: prefixed with the track artist
    /// unless that artist is itself a "various artists" placeholder.
    pub fn title_with_compilation_artist(&self) -> String {
        let title = if self.title.is_empty() {
            self.basefilename().to_string()
        } else {
            self.title.clone()
        };

        if self.is_compilation()
            && !self.artist.is_empty()
            && !self.artist.to_lowercase().contains("various")
        {
            format!("{} - {}", self.artist, title)
        } else {
            title
        }
    }

    /// Local, persisted, not carved out of a cue sheet.
    pub fn is_editable(&self) -> bool {
        self.is_persisted()
            && !self.unavailable
            && self.url.starts_with("file:")
            && self.cue_path.is_empty()
    }

    /// Compares everything a tag edit or re-scan can change, ignoring
    /// storage identity and play statistics.
    pub fn is_metadata_equal(&self, other: &Song) -> bool {
        self.title == other.title
            && self.album == other.album
            && self.artist == other.artist
            && self.albumartist == other.albumartist
            && self.track == other.track
            && self.disc == other.disc
            && self.year == other.year
            && self.originalyear == other.originalyear
            && self.genre == other.genre
            && self.compilation == other.compilation
            && self.composer == other.composer
            && self.performer == other.performer
            && self.grouping == other.grouping
            && self.comment == other.comment
            && self.artist_id == other.artist_id
            && self.album_id == other.album_id
            && self.song_id == other.song_id
            && self.beginning == other.beginning
            && self.length_nanosec == other.length_nanosec
            && self.bitrate == other.bitrate
            && self.samplerate == other.samplerate
            && self.bitdepth == other.bitdepth
            && self.cue_path == other.cue_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_formula() {
        let mut song = Song::default();
        assert!(!song.is_compilation());

        song.compilation_detected = true;
        assert!(song.is_compilation());

        song.compilation_off = true;
        assert!(!song.is_compilation());

        song.compilation_detected = false;
        song.compilation_off = false;
        song.compilation_on = true;
        assert!(song.is_compilation());
    }

    #[test]
    fn test_effective_fields() {
        let song = Song {
            artist: "Freddie".to_string(),
            year: 1975,
            ..Song::default()
        };
        assert_eq!(song.effective_albumartist(), "Freddie");
        assert_eq!(song.effective_originalyear(), 1975);

        let song = Song {
            artist: "Freddie".to_string(),
            albumartist: "Queen".to_string(),
            year: 2011,
            originalyear: 1975,
            ..Song::default()
        };
        assert_eq!(song.effective_albumartist(), "Queen");
        assert_eq!(song.effective_originalyear(), 1975);
    }

    #[test]
    fn test_column_values_match_columns() {
        let song = Song::default();
        assert_eq!(song.column_values().len(), Song::COLUMNS.len());
    }

    #[test]
    fn test_title_with_compilation_artist() {
        let mut song = Song {
            title: "Heroes".to_string(),
            artist: "David Bowie".to_string(),
            url: "file:///music/heroes.flac".to_string(),
            ..Song::default()
        };
        assert_eq!(song.title_with_compilation_artist(), "Heroes");

        song.compilation_on = true;
        assert_eq!(song.title_with_compilation_artist(), "David Bowie - Heroes");

        song.artist = "Various Artists".to_string();
        assert_eq!(song.title_with_compilation_artist(), "Heroes");

        song.title.clear();
        assert_eq!(song.title_with_compilation_artist(), "heroes.flac");
    }

    #[test]
    fn test_metadata_equality_ignores_statistics() {
        let a = Song {
            title: "Song".to_string(),
            playcount: 3,
            ..Song::default()
        };
        let mut b = a.clone();
        b.id = 99;
        b.playcount = 10;
        b.lastplayed = 1_700_000_000;
        assert!(a.is_metadata_equal(&b));

        b.track = 4;
        assert!(!a.is_metadata_equal(&b));
    }

    #[test]
    fn test_enum_codes_round_trip_through_integers() {
        for filetype in [FileType::Flac, FileType::Mpeg, FileType::Stream] {
            assert_eq!(FileType::from(filetype.code()), filetype);
        }
        assert_eq!(FileType::from(12345), FileType::Unknown);
        assert_eq!(Source::from(Source::Tidal.code()), Source::Tidal);
        assert_eq!(Source::Collection.text(), "collection");
    }

    #[test]
    fn test_editable() {
        let mut song = Song {
            id: 4,
            url: "file:///music/a.flac".to_string(),
            ..Song::default()
        };
        assert!(song.is_editable());

        song.cue_path = "file:///music/a.cue".to_string();
        assert!(!song.is_editable());
    }
}
