//! Compilation detection and manual overrides.

use super::sqlite::SqliteCollectionBackend;
use crate::error::Result;
use crate::query::QueryOptions;
use crate::song::{Song, SongList};
use crate::sql::SqlStatement;
use sqlx::Connection;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Songs of one album inside one directory.
#[derive(Default)]
struct AlbumGroup {
    artists: BTreeSet<String>,
    songs: Vec<Song>,
}

impl AlbumGroup {
    fn is_compilation(&self) -> bool {
        self.artists.len() > 1
    }
}

/// The URL with its last path component removed.
fn directory_of(url: &str) -> &str {
    match url.rfind('/') {
        Some(pos) => &url[..=pos],
        None => "",
    }
}

impl SqliteCollectionBackend {
    /// Re-run compilation detection over every available song.
    ///
    /// An album spread over more than one effective album artist inside a
    /// single directory is a compilation. Rows whose detected flag is wrong
    /// are rewritten in one transaction; only songs whose effective flag
    /// flipped are announced.
    pub async fn compilations_need_updating(&self) -> Result<()> {
        let result: Result<(SongList, SongList)> = async {
            let mut db = self.session().await?;

            let songs: SongList =
                SqlStatement::new(self.select_songs("WHERE unavailable = 0 ORDER BY album"))
                    .fetch_all_as(&mut db)
                    .await?;

            let mut groups: BTreeMap<(String, String), AlbumGroup> = BTreeMap::new();
            for song in songs {
                if song.album.is_empty() {
                    continue;
                }
                let key = (directory_of(&song.url).to_string(), song.album.clone());
                let group = groups.entry(key).or_default();
                group
                    .artists
                    .insert(song.effective_albumartist().to_string());
                group.songs.push(song);
            }

            let mut deleted = SongList::new();
            let mut added = SongList::new();
            let mut tx = db.begin().await?;

            for group in groups.values() {
                let detected = group.is_compilation();
                for song in group.songs.iter().filter(|s| s.compilation_detected != detected) {
                    let mut updated = song.clone();
                    updated.compilation_detected = detected;
                    updated.compilation_effective = updated.is_compilation();

                    SqlStatement::new(format!(
                        "UPDATE {} SET compilation_detected = ?, compilation_effective = ? \
                         WHERE ROWID = ?",
                        self.songs_table()
                    ))
                    .bind(updated.compilation_detected)
                    .bind(updated.compilation_effective)
                    .bind(song.id)
                    .execute(&mut tx)
                    .await?;

                    if updated.compilation_effective != song.compilation_effective {
                        deleted.push(song.clone());
                        added.push(updated);
                    }
                }
            }

            tx.commit().await?;
            Ok((deleted, added))
        }
        .await;

        let (deleted, added) = self.finish(result)?;
        debug!(changed = added.len(), "Compilation detection finished");
        self.emit_changes(deleted, added);
        Ok(())
    }

    /// Force the songs of `album` by each of `artists` in or out of
    /// compilations. An empty artist matches every artist.
    pub async fn force_compilation(&self, album: &str, artists: &[String], on: bool) -> Result<()> {
        let result: Result<(SongList, SongList)> = async {
            let mut db = self.session().await?;
            let mut tx = db.begin().await?;

            let mut deleted = SongList::new();
            let mut added = SongList::new();

            for artist in artists {
                let mut query = self.new_query(&QueryOptions::default());
                query.add_where("album", album, "=");
                if !artist.is_empty() {
                    query.add_where("artist", artist.as_str(), "=");
                }

                deleted.extend(self.query_songs(&mut tx, query.clone()).await?);

                let mut sql = format!(
                    "UPDATE {} SET compilation_on = ?, compilation_off = ?, \
                     compilation_effective = ((compilation OR compilation_detected OR ?) AND NOT ?) + 0 \
                     WHERE album = ? AND unavailable = 0",
                    self.songs_table()
                );
                if !artist.is_empty() {
                    sql.push_str(" AND artist = ?");
                }
                let mut statement = SqlStatement::new(sql)
                    .bind(on)
                    .bind(!on)
                    .bind(on)
                    .bind(!on)
                    .bind(album);
                if !artist.is_empty() {
                    statement = statement.bind(artist.as_str());
                }
                statement.execute(&mut tx).await?;

                added.extend(self.query_songs(&mut tx, query).await?);
            }

            tx.commit().await?;
            Ok((deleted, added))
        }
        .await;

        let (deleted, added) = self.finish(result)?;
        info!(album, on, songs = added.len(), "Compilation forced");
        self.emit_changes(deleted, added);
        Ok(())
    }
}
