//! Song writes: insert/update, reconciliation by song id, deletes and art.

use super::sqlite::SqliteCollectionBackend;
use super::CollectionBackend;
use crate::error::Result;
use crate::events::CollectionEvent;
use crate::query::QueryOptions;
use crate::song::{Song, SongList};
use crate::sql::{QueryValue, SqlStatement};
use sqlx::{Connection, SqliteConnection};
use std::collections::HashMap;
use tracing::{debug, info};

fn insert_sql(table: &str) -> String {
    let placeholders = vec!["?"; Song::COLUMNS.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        Song::column_spec(),
        placeholders
    )
}

fn update_sql(table: &str) -> String {
    let assignments: Vec<String> = Song::COLUMNS
        .iter()
        .map(|column| format!("{} = ?", column))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE ROWID = ?",
        table,
        assignments.join(", ")
    )
}

/// Copy of `song` as it reads back from storage: stored under `id`, with the
/// derived compilation flag recomputed.
fn stored(song: &Song, id: i64) -> Song {
    let mut copy = song.clone();
    copy.id = id;
    copy.compilation_effective = copy.is_compilation();
    copy
}

/// Collapse songs sharing a song id; the last one wins and keeps the slot of
/// the first.
fn unique_by_song_id(songs: SongList) -> SongList {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut unique = SongList::with_capacity(songs.len());
    for song in songs {
        match slots.get(&song.song_id) {
            Some(&slot) => unique[slot] = song,
            None => {
                slots.insert(song.song_id.clone(), unique.len());
                unique.push(song);
            }
        }
    }
    unique
}

impl SqliteCollectionBackend {
    pub(super) async fn insert_song_in(
        &self,
        conn: &mut SqliteConnection,
        song: &Song,
    ) -> Result<i64> {
        let result = SqlStatement::with_values(insert_sql(self.songs_table()), song.column_values())
            .execute(conn)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub(super) async fn update_song_in(
        &self,
        conn: &mut SqliteConnection,
        song: &Song,
        id: i64,
    ) -> Result<()> {
        let mut values = song.column_values();
        values.push(QueryValue::Int(id));
        SqlStatement::with_values(update_sql(self.songs_table()), values)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Whether the directory a song claims to live in still exists.
    ///
    /// Sources without directory tables accept every song.
    async fn directory_exists_in(&self, conn: &mut SqliteConnection, directory_id: i64) -> Result<bool> {
        let Some(dirs) = self.tables().dirs.as_deref() else {
            return Ok(true);
        };
        let row: Option<(i64,)> =
            SqlStatement::new(format!("SELECT ROWID FROM {} WHERE ROWID = ?", dirs))
                .bind(directory_id)
                .fetch_optional_as(conn)
                .await?;
        Ok(row.is_some())
    }

    /// Insert new songs and update known ones.
    ///
    /// A song is known by its row id when it has one, else by its song id.
    /// Updated songs are announced as deleted (old row) then discovered (new
    /// row, same id). Songs whose directory no longer exists are skipped.
    pub async fn add_or_update_songs(&self, songs: SongList) -> Result<()> {
        let result: Result<(SongList, SongList)> = async {
            let mut db = self.session().await?;
            let mut tx = db.begin().await?;

            let mut added = SongList::new();
            let mut deleted = SongList::new();

            for song in &songs {
                if !self.directory_exists_in(&mut tx, song.directory_id).await? {
                    debug!(
                        url = %song.url,
                        directory_id = song.directory_id,
                        "Skipping song, directory no longer exists"
                    );
                    continue;
                }

                if song.is_persisted() {
                    let Some(old_song) = self.song_by_id_in(&mut tx, song.id).await? else {
                        debug!(id = song.id, "Skipping update, row no longer exists");
                        continue;
                    };
                    self.update_song_in(&mut tx, song, song.id).await?;
                    deleted.push(old_song);
                    added.push(stored(song, song.id));
                    continue;
                }

                if !song.song_id.is_empty() {
                    if let Some(old_song) = self.song_by_song_id_in(&mut tx, &song.song_id).await? {
                        self.update_song_in(&mut tx, song, old_song.id).await?;
                        added.push(stored(song, old_song.id));
                        deleted.push(old_song);
                        continue;
                    }
                }

                let id = self.insert_song_in(&mut tx, song).await?;
                added.push(stored(song, id));
            }

            tx.commit().await?;
            Ok((deleted, added))
        }
        .await;

        let (deleted, added) = self.finish(result)?;
        debug!(
            added = added.len(),
            replaced = deleted.len(),
            "Songs added or updated"
        );
        self.emit_changes(deleted, added);
        self.schedule_count_updates();
        Ok(())
    }

    /// Make the table hold exactly `songs`, matching rows by song id.
    ///
    /// Used by sources whose caller holds the complete current truth. Rows
    /// whose metadata is unchanged are left alone.
    pub async fn update_songs_by_song_id(&self, songs: SongList) -> Result<()> {
        let result: Result<(SongList, SongList)> = async {
            let mut db = self.session().await?;
            let mut tx = db.begin().await?;

            let old_songs: HashMap<String, Song> = self
                .query_songs(&mut tx, self.new_query(&QueryOptions::default()))
                .await?
                .into_iter()
                .map(|song| (song.song_id.clone(), song))
                .collect();
            let songs = unique_by_song_id(songs);
            let new_ids: std::collections::HashSet<&str> =
                songs.iter().map(|song| song.song_id.as_str()).collect();

            let mut added = SongList::new();
            let mut deleted = SongList::new();

            for new_song in &songs {
                match old_songs.get(&new_song.song_id) {
                    Some(old_song) => {
                        if !new_song.is_metadata_equal(old_song) {
                            self.update_song_in(&mut tx, new_song, old_song.id).await?;
                            deleted.push(old_song.clone());
                            added.push(stored(new_song, old_song.id));
                        }
                    }
                    None => {
                        let id = self.insert_song_in(&mut tx, new_song).await?;
                        added.push(stored(new_song, id));
                    }
                }
            }

            let mut removed: Vec<&Song> = old_songs
                .values()
                .filter(|old_song| !new_ids.contains(old_song.song_id.as_str()))
                .collect();
            removed.sort_by_key(|song| song.id);
            for old_song in removed {
                SqlStatement::new(format!("DELETE FROM {} WHERE ROWID = ?", self.songs_table()))
                    .bind(old_song.id)
                    .execute(&mut tx)
                    .await?;
                deleted.push(old_song.clone());
            }

            tx.commit().await?;
            Ok((deleted, added))
        }
        .await;

        let (deleted, added) = self.finish(result)?;
        info!(
            source = self.source().text(),
            added_or_changed = added.len(),
            removed_or_changed = deleted.len(),
            "Source songs reconciled"
        );
        self.emit_changes(deleted, added);
        self.schedule_count_updates();
        Ok(())
    }

    /// Store new mtimes without announcing anything.
    pub async fn update_mtimes_only(&self, songs: &[Song]) -> Result<()> {
        let result: Result<()> = async {
            let mut db = self.session().await?;
            let mut tx = db.begin().await?;
            for song in songs {
                SqlStatement::new(format!(
                    "UPDATE {} SET mtime = ? WHERE ROWID = ?",
                    self.songs_table()
                ))
                .bind(song.mtime)
                .bind(song.id)
                .execute(&mut tx)
                .await?;
            }
            tx.commit().await?;
            Ok(())
        }
        .await;
        self.finish(result)
    }

    pub(super) async fn delete_songs_in(
        &self,
        conn: &mut SqliteConnection,
        songs: &[Song],
    ) -> Result<()> {
        let mut tx = conn.begin().await?;
        for song in songs {
            SqlStatement::new(format!("DELETE FROM {} WHERE ROWID = ?", self.songs_table()))
                .bind(song.id)
                .execute(&mut tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_songs(&self, songs: SongList) -> Result<()> {
        let result = async {
            let mut db = self.session().await?;
            self.delete_songs_in(&mut db, &songs).await
        }
        .await;
        self.finish(result)?;

        debug!(count = songs.len(), "Songs deleted");
        self.emit(CollectionEvent::SongsDeleted { songs });
        self.schedule_count_updates();
        Ok(())
    }

    /// Hide songs (announced as deleted) or bring them back (announced as
    /// discovered) without dropping their rows.
    pub async fn mark_songs_unavailable(&self, songs: SongList, unavailable: bool) -> Result<()> {
        let result: Result<()> = async {
            let mut db = self.session().await?;
            let mut tx = db.begin().await?;
            for song in &songs {
                SqlStatement::new(format!(
                    "UPDATE {} SET unavailable = {} WHERE ROWID = ?",
                    self.songs_table(),
                    i32::from(unavailable)
                ))
                .bind(song.id)
                .execute(&mut tx)
                .await?;
            }
            tx.commit().await?;
            Ok(())
        }
        .await;
        self.finish(result)?;

        let songs: SongList = songs
            .into_iter()
            .map(|mut song| {
                song.unavailable = unavailable;
                song
            })
            .collect();
        if unavailable {
            self.emit(CollectionEvent::SongsDeleted { songs });
        } else {
            self.emit(CollectionEvent::SongsDiscovered { songs });
        }
        self.schedule_count_updates();
        Ok(())
    }

    /// A file moved: store it under its new url, and new directory when the
    /// move crossed into another watched directory.
    pub async fn song_path_changed(
        &self,
        song: &Song,
        new_url: &str,
        new_directory_id: Option<i64>,
    ) -> Result<()> {
        let mut updated = song.clone();
        updated.source = self.source();
        updated.url = new_url.to_string();
        if let Some(directory_id) = new_directory_id {
            if self.tables().dirs.is_some() {
                updated.directory_id = directory_id;
            }
        }
        self.add_or_update_songs(vec![updated]).await
    }

    /// Set the manual cover of an album, optionally clearing the automatic one.
    pub async fn update_manual_album_art(
        &self,
        effective_albumartist: &str,
        album: &str,
        cover_url: &str,
        clear_art_automatic: bool,
    ) -> Result<()> {
        let mut assignments = "art_manual = ?".to_string();
        if clear_art_automatic {
            assignments.push_str(", art_automatic = ''");
        }
        self.update_album_art(effective_albumartist, album, &assignments, cover_url)
            .await
    }

    pub async fn update_automatic_album_art(
        &self,
        effective_albumartist: &str,
        album: &str,
        cover_url: &str,
    ) -> Result<()> {
        self.update_album_art(effective_albumartist, album, "art_automatic = ?", cover_url)
            .await
    }

    async fn update_album_art(
        &self,
        effective_albumartist: &str,
        album: &str,
        assignments: &str,
        cover_url: &str,
    ) -> Result<()> {
        let result: Result<(SongList, SongList)> = async {
            let mut db = self.session().await?;
            let mut tx = db.begin().await?;

            let mut query = self.new_query(&QueryOptions::default());
            query.add_where("effective_albumartist", effective_albumartist, "=");
            query.add_where("album", album, "=");

            let deleted = self.query_songs(&mut tx, query.clone()).await?;

            SqlStatement::new(format!(
                "UPDATE {} SET {} WHERE effective_albumartist = ? AND album = ? AND unavailable = 0",
                self.songs_table(),
                assignments
            ))
            .bind(cover_url)
            .bind(effective_albumartist)
            .bind(album)
            .execute(&mut tx)
            .await?;

            let added = self.query_songs(&mut tx, query).await?;

            tx.commit().await?;
            Ok((deleted, added))
        }
        .await;

        let (deleted, added) = self.finish(result)?;
        self.emit_changes(deleted, added);
        Ok(())
    }

    /// Drop every song of this source.
    pub async fn delete_all(&self) -> Result<()> {
        let result: Result<()> = async {
            let mut db = self.session().await?;
            let mut tx = db.begin().await?;
            SqlStatement::new(format!("DELETE FROM {}", self.songs_table()))
                .execute(&mut tx)
                .await?;
            tx.commit().await?;
            Ok(())
        }
        .await;
        self.finish(result)?;

        info!(songs_table = %self.songs_table(), "Collection reset");
        self.emit(CollectionEvent::DatabaseReset);
        self.schedule_count_updates();
        Ok(())
    }
}
