//! Totals, play statistics and ratings.

use super::sqlite::SqliteCollectionBackend;
use super::CollectionBackend;
use crate::error::Result;
use crate::events::CollectionEvent;
use crate::song::SongList;
use crate::sql::{QueryValue, SqlStatement};
use sqlx::Connection;
use tracing::debug;

impl SqliteCollectionBackend {
    async fn count(&self, sql: String) -> Result<i64> {
        let result = async {
            let mut db = self.session().await?;
            let row: Option<(i64,)> = SqlStatement::new(sql).fetch_optional_as(&mut db).await?;
            Ok(row.map(|(count,)| count).unwrap_or(0))
        }
        .await;
        self.finish(result)
    }

    /// Count available songs and announce the total.
    pub async fn update_total_song_count(&self) -> Result<i64> {
        let count = self
            .count(format!(
                "SELECT COUNT(*) FROM {} WHERE unavailable = 0",
                self.songs_table()
            ))
            .await?;
        self.emit(CollectionEvent::TotalSongCountUpdated { count });
        Ok(count)
    }

    pub async fn update_total_artist_count(&self) -> Result<i64> {
        let count = self
            .count(format!(
                "SELECT COUNT(DISTINCT artist) FROM {} WHERE unavailable = 0",
                self.songs_table()
            ))
            .await?;
        self.emit(CollectionEvent::TotalArtistCountUpdated { count });
        Ok(count)
    }

    pub async fn update_total_album_count(&self) -> Result<i64> {
        let count = self
            .count(format!(
                "SELECT COUNT(*) FROM (SELECT DISTINCT effective_albumartist, album \
                 FROM {} WHERE unavailable = 0)",
                self.songs_table()
            ))
            .await?;
        self.emit(CollectionEvent::TotalAlbumCountUpdated { count });
        Ok(count)
    }

    /// Run `sql` (bound to `values`, then the row id) against one song and
    /// announce the row as re-read afterwards.
    async fn update_statistics(&self, id: i64, sql: String, values: Vec<QueryValue>) -> Result<()> {
        if id == -1 {
            return Ok(());
        }

        let result = async {
            let mut db = self.session().await?;
            let mut values = values;
            values.push(QueryValue::Int(id));
            SqlStatement::with_values(sql, values)
                .execute(&mut db)
                .await?;
            self.song_by_id_in(&mut db, id).await
        }
        .await;

        if let Some(song) = self.finish(result)? {
            self.emit(CollectionEvent::SongsStatisticsChanged { songs: vec![song] });
        }
        Ok(())
    }

    pub async fn increment_play_count(&self, id: i64) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET playcount = playcount + 1, lastplayed = ? WHERE ROWID = ?",
            self.songs_table()
        );
        self.update_statistics(id, sql, vec![QueryValue::Int(self.now())])
            .await
    }

    /// Count a skip. `progress` is how far into the song playback got;
    /// every skip counts regardless.
    pub async fn increment_skip_count(&self, id: i64, progress: f32) -> Result<()> {
        debug!(id, progress, "Song skipped");
        let sql = format!(
            "UPDATE {} SET skipcount = skipcount + 1 WHERE ROWID = ?",
            self.songs_table()
        );
        self.update_statistics(id, sql, Vec::new()).await
    }

    pub async fn reset_statistics(&self, id: i64) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET playcount = 0, skipcount = 0, lastplayed = -1 WHERE ROWID = ?",
            self.songs_table()
        );
        self.update_statistics(id, sql, Vec::new()).await
    }

    /// Import a last-played time for songs matched by tags. Only moves
    /// `lastplayed` forward.
    pub async fn update_last_played(
        &self,
        artist: &str,
        album: &str,
        title: &str,
        lastplayed: i64,
    ) -> Result<()> {
        let result: Result<SongList> = async {
            let mut db = self.session().await?;
            let songs = self.songs_by_in(&mut db, artist, album, title).await?;
            if songs.is_empty() {
                return Ok(songs);
            }

            let mut tx = db.begin().await?;
            for song in songs.iter().filter(|song| song.lastplayed < lastplayed) {
                SqlStatement::new(format!(
                    "UPDATE {} SET lastplayed = ? WHERE ROWID = ?",
                    self.songs_table()
                ))
                .bind(lastplayed)
                .bind(song.id)
                .execute(&mut tx)
                .await?;
            }
            let ids: Vec<i64> = songs.iter().map(|song| song.id).collect();
            let updated = self.songs_by_ids_in(&mut tx, &ids).await?;
            tx.commit().await?;
            Ok(updated)
        }
        .await;

        let songs = self.finish(result)?;
        if songs.is_empty() {
            debug!(artist, album, title, "No matching song for last played import");
            return Ok(());
        }
        self.emit(CollectionEvent::SongsStatisticsChanged { songs });
        Ok(())
    }

    /// Import a play count for songs matched by artist and title.
    pub async fn update_play_count(&self, artist: &str, title: &str, playcount: i32) -> Result<()> {
        let result: Result<SongList> = async {
            let mut db = self.session().await?;
            let songs = self.songs_by_in(&mut db, artist, "", title).await?;
            if songs.is_empty() {
                return Ok(songs);
            }

            let mut tx = db.begin().await?;
            for song in &songs {
                SqlStatement::new(format!(
                    "UPDATE {} SET playcount = ? WHERE ROWID = ?",
                    self.songs_table()
                ))
                .bind(playcount)
                .bind(song.id)
                .execute(&mut tx)
                .await?;
            }
            let ids: Vec<i64> = songs.iter().map(|song| song.id).collect();
            let updated = self.songs_by_ids_in(&mut tx, &ids).await?;
            tx.commit().await?;
            Ok(updated)
        }
        .await;

        let songs = self.finish(result)?;
        if songs.is_empty() {
            debug!(artist, title, "No matching song for play count import");
            return Ok(());
        }
        self.emit(CollectionEvent::SongsStatisticsChanged { songs });
        Ok(())
    }

    pub async fn update_song_rating(&self, id: i64, rating: f64) -> Result<()> {
        if id == -1 {
            return Ok(());
        }
        self.update_songs_rating(&[id], rating).await
    }

    /// Set the same rating on several songs and announce them re-read.
    pub async fn update_songs_rating(&self, ids: &[i64], rating: f64) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let result = async {
            let mut db = self.session().await?;
            let placeholders = vec!["?"; ids.len()].join(",");
            let mut values = vec![QueryValue::Real(rating)];
            values.extend(ids.iter().map(|id| QueryValue::Int(*id)));
            SqlStatement::with_values(
                format!(
                    "UPDATE {} SET rating = ? WHERE ROWID IN ({})",
                    self.songs_table(),
                    placeholders
                ),
                values,
            )
            .execute(&mut db)
            .await?;
            self.songs_by_ids_in(&mut db, ids).await
        }
        .await;

        let songs = self.finish(result)?;
        self.emit(CollectionEvent::SongsRatingChanged { songs });
        Ok(())
    }
}
