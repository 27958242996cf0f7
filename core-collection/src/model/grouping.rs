//! Grouping levels and the text helpers that turn song fields into
//! container keys, display strings, sort keys and divider buckets.

use crate::song::Song;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// Display text for empty fields.
pub const UNKNOWN_TEXT: &str = "Unknown";

/// Display text of the node compilation songs are gathered under.
pub const VARIOUS_ARTISTS_TEXT: &str = "Various artists";

static DISC_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[\(\[]\s*(disc|cd)\s*[0-9]{1,2}[\)\]]$").expect("disc suffix pattern")
});

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w ]").expect("word character pattern"));

/// What one level of the tree groups songs by.
///
/// The integer codes are persisted in settings and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GroupBy {
    #[default]
    None,
    AlbumArtist,
    Artist,
    Album,
    AlbumDisc,
    YearAlbum,
    YearAlbumDisc,
    OriginalYearAlbum,
    OriginalYearAlbumDisc,
    Disc,
    Year,
    OriginalYear,
    Genre,
    Composer,
    Performer,
    Grouping,
    FileType,
    Format,
    Samplerate,
    Bitdepth,
    Bitrate,
}

impl GroupBy {
    pub const ALL: [GroupBy; 21] = [
        GroupBy::None,
        GroupBy::AlbumArtist,
        GroupBy::Artist,
        GroupBy::Album,
        GroupBy::AlbumDisc,
        GroupBy::YearAlbum,
        GroupBy::YearAlbumDisc,
        GroupBy::OriginalYearAlbum,
        GroupBy::OriginalYearAlbumDisc,
        GroupBy::Disc,
        GroupBy::Year,
        GroupBy::OriginalYear,
        GroupBy::Genre,
        GroupBy::Composer,
        GroupBy::Performer,
        GroupBy::Grouping,
        GroupBy::FileType,
        GroupBy::Format,
        GroupBy::Samplerate,
        GroupBy::Bitdepth,
        GroupBy::Bitrate,
    ];

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    /// Compilation songs are redirected to "Various artists" at these levels.
    pub fn is_artist(self) -> bool {
        matches!(self, GroupBy::AlbumArtist | GroupBy::Artist)
    }

    /// Levels whose containers stand for one album and show its cover.
    pub fn is_album(self) -> bool {
        matches!(
            self,
            GroupBy::Album
                | GroupBy::AlbumDisc
                | GroupBy::YearAlbum
                | GroupBy::YearAlbumDisc
                | GroupBy::OriginalYearAlbum
                | GroupBy::OriginalYearAlbumDisc
        )
    }

    /// Song column a `tag:value` filter on a container of this level checks.
    pub fn filter_tag(self) -> Option<&'static str> {
        match self {
            GroupBy::AlbumArtist => Some("albumartist"),
            GroupBy::Artist => Some("artist"),
            GroupBy::Genre => Some("genre"),
            GroupBy::Composer => Some("composer"),
            GroupBy::Performer => Some("performer"),
            GroupBy::Grouping => Some("grouping"),
            GroupBy::FileType => Some("filetype"),
            g if g.is_album() => Some("album"),
            _ => None,
        }
    }
}

/// The up to three levels the tree is built from, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grouping([GroupBy; 3]);

impl Grouping {
    pub fn new(first: GroupBy, second: GroupBy, third: GroupBy) -> Self {
        Self([first, second, third])
    }

    pub fn levels(&self) -> &[GroupBy; 3] {
        &self.0
    }

    /// Persisted form: comma separated integer codes, `"1,4,0"`.
    pub fn to_setting(&self) -> String {
        self.0
            .iter()
            .map(|g| g.code().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse the persisted form; anything but three known codes is rejected.
    pub fn from_setting(value: &str) -> Option<Self> {
        let codes: Vec<GroupBy> = value
            .split(',')
            .map(|part| part.trim().parse::<i64>().ok().and_then(GroupBy::from_code))
            .collect::<Option<_>>()?;
        match codes.as_slice() {
            [first, second, third] => Some(Self::new(*first, *second, *third)),
            _ => None,
        }
    }
}

impl Default for Grouping {
    fn default() -> Self {
        Self::new(GroupBy::AlbumArtist, GroupBy::AlbumDisc, GroupBy::None)
    }
}

impl Index<usize> for Grouping {
    type Output = GroupBy;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_setting())
    }
}

pub fn text_or_unknown(text: &str) -> String {
    if text.is_empty() {
        UNKNOWN_TEXT.to_string()
    } else {
        text.to_string()
    }
}

pub fn pretty_year_album(year: i32, album: &str) -> String {
    if year <= 0 {
        text_or_unknown(album)
    } else {
        format!("{} - {}", year, text_or_unknown(album))
    }
}

/// Album with a disc suffix, unless the album title already carries one.
pub fn pretty_album_disc(album: &str, disc: i32) -> String {
    if disc <= 0 || DISC_SUFFIX.is_match(album) {
        text_or_unknown(album)
    } else {
        format!("{} - (Disc {})", text_or_unknown(album), disc)
    }
}

pub fn pretty_year_album_disc(year: i32, album: &str, disc: i32) -> String {
    let mut text = if year <= 0 {
        text_or_unknown(album)
    } else {
        format!("{} - {}", year, text_or_unknown(album))
    };
    if disc > 0 && !DISC_SUFFIX.is_match(album) {
        text.push_str(&format!(" - (Disc {})", disc));
    }
    text
}

pub fn pretty_disc(disc: i32) -> String {
    format!("Disc {}", disc.max(1))
}

/// Lowercased text with punctuation stripped; empty text sorts first.
pub fn sort_text(text: &str) -> String {
    let lowered = if text.is_empty() {
        " unknown".to_string()
    } else {
        text.to_lowercase()
    };
    NON_WORD.replace_all(&lowered, "").into_owned()
}

/// Like [`sort_text`], with a leading article moved to the end:
/// "The Beatles" sorts as "beatles, the".
pub fn sort_text_for_artist(artist: &str) -> String {
    let text = sort_text(artist);
    for article in ["the ", "a ", "an "] {
        if let Some(rest) = text.strip_prefix(article) {
            return format!("{}, {}", rest, article.trim_end());
        }
    }
    text
}

pub fn sort_text_for_number(number: i32) -> String {
    format!("{:04}", number)
}

/// Disc and track order first, then the URL.
pub fn sort_text_for_song(song: &Song) -> String {
    let position = i64::from(song.disc.max(0)) * 1000 + i64::from(song.track.max(0));
    format!("{:06}{}", position, song.url)
}

/// Format level text: the file type, with sample rate in kHz and bit depth
/// when known.
pub fn format_text(song: &Song) -> String {
    let filetype = song.text_for_filetype();
    if song.samplerate <= 0 {
        return filetype.to_string();
    }
    let khz = f64::from(song.samplerate) / 1000.0;
    if song.bitdepth <= 0 {
        format!("{} ({})", filetype, khz)
    } else {
        format!("{} ({}/{})", filetype, khz, song.bitdepth)
    }
}

/// Key fragment this level contributes for `song`.
///
/// Album levels append the album id when the source provides one, so two
/// albums with the same title stay apart.
pub fn container_key(group_by: GroupBy, song: &Song) -> String {
    match group_by {
        GroupBy::AlbumArtist => text_or_unknown(song.effective_albumartist()),
        GroupBy::Artist => text_or_unknown(&song.artist),
        GroupBy::Album => with_album_id(text_or_unknown(&song.album), song),
        GroupBy::AlbumDisc => with_album_id(pretty_album_disc(&song.album, song.disc), song),
        GroupBy::YearAlbum => with_album_id(pretty_year_album(song.year, &song.album), song),
        GroupBy::YearAlbumDisc => with_album_id(
            pretty_year_album_disc(song.year, &song.album, song.disc),
            song,
        ),
        GroupBy::OriginalYearAlbum => with_album_id(
            pretty_year_album(song.effective_originalyear(), &song.album),
            song,
        ),
        GroupBy::OriginalYearAlbumDisc => with_album_id(
            pretty_year_album_disc(song.effective_originalyear(), &song.album, song.disc),
            song,
        ),
        GroupBy::Disc => pretty_disc(song.disc),
        GroupBy::Year => song.year.max(0).to_string(),
        GroupBy::OriginalYear => song.effective_originalyear().max(0).to_string(),
        GroupBy::Genre => text_or_unknown(&song.genre),
        GroupBy::Composer => text_or_unknown(&song.composer),
        GroupBy::Performer => text_or_unknown(&song.performer),
        GroupBy::Grouping => text_or_unknown(&song.grouping),
        GroupBy::FileType => song.text_for_filetype().to_string(),
        GroupBy::Format => format_text(song),
        GroupBy::Samplerate => song.samplerate.max(0).to_string(),
        GroupBy::Bitdepth => song.bitdepth.max(0).to_string(),
        GroupBy::Bitrate => song.bitrate.max(0).to_string(),
        GroupBy::None => String::new(),
    }
}

fn with_album_id(mut key: String, song: &Song) -> String {
    if !song.album_id.is_empty() {
        key.push('-');
        key.push_str(&song.album_id);
    }
    key
}

/// What a container created for `song` at one level shows and sorts by.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerText {
    pub display_text: String,
    pub sort_text: String,
    /// The song fields this level is about; everything else stays default
    pub metadata: Song,
}

pub fn container_text(group_by: GroupBy, song: &Song) -> ContainerText {
    let mut metadata = Song::default();

    let (display_text, sort_text) = match group_by {
        GroupBy::AlbumArtist => {
            metadata.albumartist = song.effective_albumartist().to_string();
            (
                text_or_unknown(&metadata.albumartist),
                sort_text_for_artist(&metadata.albumartist),
            )
        }
        GroupBy::Artist => {
            metadata.artist = song.artist.clone();
            (
                text_or_unknown(&song.artist),
                sort_text_for_artist(&song.artist),
            )
        }
        GroupBy::Album => {
            copy_album(&mut metadata, song);
            (
                text_or_unknown(&song.album),
                sort_text_for_artist(&song.album),
            )
        }
        GroupBy::AlbumDisc => {
            copy_album(&mut metadata, song);
            metadata.disc = song.disc;
            (
                pretty_album_disc(&song.album, song.disc),
                format!("{}{}", song.album, sort_text_for_number(song.disc.max(0))),
            )
        }
        GroupBy::YearAlbum | GroupBy::OriginalYearAlbum => {
            let year = year_for(group_by, song);
            copy_album(&mut metadata, song);
            metadata.year = year;
            metadata.grouping = song.grouping.clone();
            (
                pretty_year_album(year, &song.album),
                format!(
                    "{}{}{}",
                    sort_text_for_number(year.max(0)),
                    song.grouping,
                    song.album
                ),
            )
        }
        GroupBy::YearAlbumDisc | GroupBy::OriginalYearAlbumDisc => {
            let year = year_for(group_by, song);
            copy_album(&mut metadata, song);
            metadata.year = year;
            metadata.disc = song.disc;
            (
                pretty_year_album_disc(year, &song.album, song.disc),
                format!(
                    "{}{}{}",
                    sort_text_for_number(year.max(0)),
                    song.album,
                    sort_text_for_number(song.disc.max(0))
                ),
            )
        }
        GroupBy::Disc => {
            metadata.disc = song.disc;
            (
                pretty_disc(song.disc),
                sort_text_for_number(song.disc.max(0)),
            )
        }
        GroupBy::Year | GroupBy::OriginalYear => {
            let year = year_for(group_by, song).max(0);
            metadata.year = year;
            (year.to_string(), format!("{} ", sort_text_for_number(year)))
        }
        GroupBy::Genre => {
            metadata.genre = song.genre.clone();
            (text_or_unknown(&song.genre), sort_text_for_artist(&song.genre))
        }
        GroupBy::Composer => {
            metadata.composer = song.composer.clone();
            (
                text_or_unknown(&song.composer),
                sort_text_for_artist(&song.composer),
            )
        }
        GroupBy::Performer => {
            metadata.performer = song.performer.clone();
            (
                text_or_unknown(&song.performer),
                sort_text_for_artist(&song.performer),
            )
        }
        GroupBy::Grouping => {
            metadata.grouping = song.grouping.clone();
            (
                text_or_unknown(&song.grouping),
                sort_text_for_artist(&song.grouping),
            )
        }
        GroupBy::FileType => {
            metadata.filetype = song.filetype;
            let text = song.text_for_filetype().to_string();
            (text.clone(), text)
        }
        GroupBy::Format => {
            metadata.filetype = song.filetype;
            metadata.samplerate = song.samplerate;
            metadata.bitdepth = song.bitdepth;
            let key = format_text(song);
            (key.clone(), key)
        }
        GroupBy::Samplerate => {
            metadata.samplerate = song.samplerate.max(0);
            number_texts(metadata.samplerate)
        }
        GroupBy::Bitdepth => {
            metadata.bitdepth = song.bitdepth.max(0);
            number_texts(metadata.bitdepth)
        }
        GroupBy::Bitrate => {
            metadata.bitrate = song.bitrate.max(0);
            number_texts(metadata.bitrate)
        }
        GroupBy::None => (String::new(), String::new()),
    };

    ContainerText {
        display_text,
        sort_text,
        metadata,
    }
}

fn copy_album(metadata: &mut Song, song: &Song) {
    metadata.album = song.album.clone();
    metadata.album_id = song.album_id.clone();
}

fn year_for(group_by: GroupBy, song: &Song) -> i32 {
    match group_by {
        GroupBy::OriginalYear | GroupBy::OriginalYearAlbum | GroupBy::OriginalYearAlbumDisc => {
            song.effective_originalyear()
        }
        _ => song.year,
    }
}

fn number_texts(value: i32) -> (String, String) {
    (value.to_string(), format!("{} ", sort_text_for_number(value)))
}

/// Bucket a top-level container falls into, or `None` for no divider.
///
/// Text levels bucket by first letter with accents folded away and all
/// digits sharing `"0"`; numeric levels bucket by value (years by decade).
pub fn divider_key(group_by: GroupBy, sort_text: &str, metadata: &Song) -> Option<String> {
    if sort_text.is_empty() {
        return None;
    }

    match group_by {
        GroupBy::AlbumArtist
        | GroupBy::Artist
        | GroupBy::Album
        | GroupBy::AlbumDisc
        | GroupBy::Composer
        | GroupBy::Performer
        | GroupBy::Grouping
        | GroupBy::Disc
        | GroupBy::Genre
        | GroupBy::FileType
        | GroupBy::Format => {
            let first = sort_text.chars().next()?;
            if first.is_numeric() {
                return Some("0".to_string());
            }
            if first == ' ' {
                return None;
            }
            let folded = std::iter::once(first).nfkd().next().unwrap_or(first);
            Some(folded.to_string())
        }
        GroupBy::Year | GroupBy::OriginalYear => {
            Some(sort_text_for_number(metadata.year.max(0) / 10 * 10))
        }
        GroupBy::YearAlbum
        | GroupBy::YearAlbumDisc
        | GroupBy::OriginalYearAlbum
        | GroupBy::OriginalYearAlbumDisc => Some(sort_text_for_number(metadata.year.max(0))),
        GroupBy::Samplerate => Some(sort_text_for_number(metadata.samplerate)),
        GroupBy::Bitdepth => Some(sort_text_for_number(metadata.bitdepth)),
        GroupBy::Bitrate => Some(sort_text_for_number(metadata.bitrate)),
        GroupBy::None => None,
    }
}

/// Heading shown for a divider bucket.
pub fn divider_display_text(group_by: GroupBy, key: &str) -> String {
    match group_by {
        GroupBy::AlbumArtist
        | GroupBy::Artist
        | GroupBy::Album
        | GroupBy::AlbumDisc
        | GroupBy::Composer
        | GroupBy::Performer
        | GroupBy::Disc
        | GroupBy::Grouping
        | GroupBy::Genre
        | GroupBy::FileType
        | GroupBy::Format => {
            if key == "0" {
                "0-9".to_string()
            } else {
                key.to_uppercase()
            }
        }
        GroupBy::YearAlbum
        | GroupBy::YearAlbumDisc
        | GroupBy::OriginalYearAlbum
        | GroupBy::OriginalYearAlbumDisc => {
            if key == "0000" {
                UNKNOWN_TEXT.to_string()
            } else {
                key.to_uppercase()
            }
        }
        GroupBy::Year
        | GroupBy::OriginalYear
        | GroupBy::Samplerate
        | GroupBy::Bitdepth
        | GroupBy::Bitrate => match key.parse::<i64>() {
            Ok(0) | Err(_) => UNKNOWN_TEXT.to_string(),
            Ok(value) => value.to_string(),
        },
        GroupBy::None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song() -> Song {
        Song {
            title: "Bohemian Rhapsody".to_string(),
            album: "A Night at the Opera".to_string(),
            artist: "Queen".to_string(),
            year: 1975,
            disc: 1,
            track: 11,
            url: "file:///music/queen/11.flac".to_string(),
            ..Song::default()
        }
    }

    #[test]
    fn test_group_by_codes_are_stable() {
        assert_eq!(GroupBy::AlbumArtist.code(), 1);
        assert_eq!(GroupBy::AlbumDisc.code(), 4);
        assert_eq!(GroupBy::Bitrate.code(), 20);
        assert_eq!(GroupBy::from_code(13), Some(GroupBy::Composer));
        assert_eq!(GroupBy::from_code(21), None);
        assert_eq!(GroupBy::from_code(-1), None);
    }

    #[test]
    fn test_grouping_setting_form() {
        let grouping = Grouping::default();
        assert_eq!(grouping.to_setting(), "1,4,0");
        assert_eq!(Grouping::from_setting("1,4,0"), Some(grouping));
        assert_eq!(
            Grouping::from_setting("2, 3, 0"),
            Some(Grouping::new(GroupBy::Artist, GroupBy::Album, GroupBy::None))
        );
        assert_eq!(Grouping::from_setting("1,4"), None);
        assert_eq!(Grouping::from_setting("1,4,99"), None);
    }

    #[test]
    fn test_pretty_texts() {
        assert_eq!(pretty_year_album(0, "Album"), "Album");
        assert_eq!(pretty_year_album(1975, "Album"), "1975 - Album");
        assert_eq!(pretty_album_disc("Album", 2), "Album - (Disc 2)");
        assert_eq!(pretty_album_disc("Album [CD 2]", 2), "Album [CD 2]");
        assert_eq!(pretty_album_disc("Album", 0), "Album");
        assert_eq!(
            pretty_year_album_disc(1975, "Album", 2),
            "1975 - Album - (Disc 2)"
        );
        assert_eq!(pretty_disc(-1), "Disc 1");
        assert_eq!(text_or_unknown(""), "Unknown");
    }

    #[test]
    fn test_sort_texts() {
        assert_eq!(sort_text("AC/DC!"), "acdc");
        assert_eq!(sort_text(""), " unknown");
        assert_eq!(sort_text_for_artist("The Beatles"), "beatles, the");
        assert_eq!(sort_text_for_artist("An Artist"), "artist, an");
        assert_eq!(sort_text_for_artist("Theatre"), "theatre");
        assert_eq!(sort_text_for_number(7), "0007");
        assert_eq!(sort_text_for_song(&song()), "001011file:///music/queen/11.flac");
    }

    #[test]
    fn test_container_keys() {
        let mut song = song();
        assert_eq!(container_key(GroupBy::AlbumArtist, &song), "Queen");
        assert_eq!(
            container_key(GroupBy::AlbumDisc, &song),
            "A Night at the Opera - (Disc 1)"
        );
        assert_eq!(container_key(GroupBy::Genre, &song), "Unknown");
        assert_eq!(container_key(GroupBy::Bitrate, &song), "0");

        song.album_id = "42".to_string();
        assert_eq!(container_key(GroupBy::Album, &song), "A Night at the Opera-42");
    }

    #[test]
    fn test_format_text() {
        let mut song = song();
        song.filetype = crate::song::FileType::Flac;
        assert_eq!(format_text(&song), "FLAC");
        song.samplerate = 44100;
        assert_eq!(format_text(&song), "FLAC (44.1)");
        song.bitdepth = 24;
        song.samplerate = 96000;
        assert_eq!(format_text(&song), "FLAC (96/24)");
    }

    #[test]
    fn test_container_text() {
        let text = container_text(GroupBy::AlbumArtist, &song());
        assert_eq!(text.display_text, "Queen");
        assert_eq!(text.sort_text, "queen");
        assert_eq!(text.metadata.albumartist, "Queen");

        let text = container_text(GroupBy::Year, &song());
        assert_eq!(text.display_text, "1975");
        assert_eq!(text.sort_text, "1975 ");
    }

    #[test]
    fn test_divider_keys() {
        let plain = Song::default();
        assert_eq!(divider_key(GroupBy::Artist, "queen", &plain).as_deref(), Some("q"));
        assert_eq!(divider_key(GroupBy::Artist, "élan", &plain).as_deref(), Some("e"));
        assert_eq!(divider_key(GroupBy::Artist, "2pac", &plain).as_deref(), Some("0"));
        assert_eq!(divider_key(GroupBy::Artist, " unknown", &plain), None);
        assert_eq!(divider_key(GroupBy::Artist, "", &plain), None);

        let dated = Song {
            year: 1975,
            ..Song::default()
        };
        assert_eq!(divider_key(GroupBy::Year, "1975 ", &dated).as_deref(), Some("1970"));
        assert_eq!(
            divider_key(GroupBy::YearAlbum, "1975x", &dated).as_deref(),
            Some("1975")
        );
    }

    #[test]
    fn test_divider_display_text() {
        assert_eq!(divider_display_text(GroupBy::Artist, "q"), "Q");
        assert_eq!(divider_display_text(GroupBy::Artist, "0"), "0-9");
        assert_eq!(divider_display_text(GroupBy::YearAlbum, "0000"), "Unknown");
        assert_eq!(divider_display_text(GroupBy::Year, "1970"), "1970");
        assert_eq!(divider_display_text(GroupBy::Year, "0000"), "Unknown");
        assert_eq!(divider_display_text(GroupBy::Bitdepth, "0024"), "24");
    }
}
