//! Song and album lookups.

use super::sqlite::SqliteCollectionBackend;
use super::{Album, AlbumList, CollectionBackend};
use crate::error::Result;
use crate::events::CollectionEvent;
use crate::query::{CollectionQuery, QueryOptions, SONGS_TABLE_PLACEHOLDER};
use crate::song::{FileType, Song, SongList};
use crate::sql::{QueryValue, SqlStatement};
use sqlx::SqliteConnection;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

impl SqliteCollectionBackend {
    /// A query on this backend's songs table.
    pub(super) fn new_query(&self, options: &QueryOptions) -> CollectionQuery {
        CollectionQuery::new(self.songs_table(), options, self.now())
    }

    pub(super) async fn query_songs(
        &self,
        conn: &mut SqliteConnection,
        mut query: CollectionQuery,
    ) -> Result<SongList> {
        query.set_column_spec(Song::select_spec(SONGS_TABLE_PLACEHOLDER));
        query.exec_as(conn).await
    }

    pub(super) async fn songs_by_ids_in(
        &self,
        conn: &mut SqliteConnection,
        ids: &[i64],
    ) -> Result<SongList> {
        if ids.is_empty() {
            return Ok(SongList::new());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let values = ids.iter().map(|id| QueryValue::Int(*id)).collect();
        SqlStatement::with_values(
            self.select_songs(&format!("WHERE ROWID IN ({})", placeholders)),
            values,
        )
        .fetch_all_as(conn)
        .await
    }

    pub(super) async fn song_by_id_in(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Option<Song>> {
        Ok(self.songs_by_ids_in(conn, &[id]).await?.into_iter().next())
    }

    pub(super) async fn songs_by_song_ids_in(
        &self,
        conn: &mut SqliteConnection,
        song_ids: &[String],
    ) -> Result<SongList> {
        if song_ids.is_empty() {
            return Ok(SongList::new());
        }
        let placeholders = vec!["?"; song_ids.len()].join(",");
        let values = song_ids.iter().map(QueryValue::from).collect();
        SqlStatement::with_values(
            self.select_songs(&format!("WHERE song_id IN ({})", placeholders)),
            values,
        )
        .fetch_all_as(conn)
        .await
    }

    pub(super) async fn song_by_song_id_in(
        &self,
        conn: &mut SqliteConnection,
        song_id: &str,
    ) -> Result<Option<Song>> {
        Ok(self
            .songs_by_song_ids_in(conn, &[song_id.to_string()])
            .await?
            .into_iter()
            .next())
    }

    /// Every row, then a `GotSongs` reply carrying `id`.
    ///
    /// A failed read still answers, with an empty list.
    pub async fn get_all_songs(&self, id: u64) -> Result<SongList> {
        let result = async {
            let mut db = self.session().await?;
            SqlStatement::new(self.select_songs(""))
                .fetch_all_as::<Song>(&mut db)
                .await
        }
        .await;

        match self.finish(result) {
            Ok(songs) => {
                debug!(count = songs.len(), id, "Loaded all songs");
                self.emit(CollectionEvent::GotSongs {
                    songs: songs.clone(),
                    id,
                });
                Ok(songs)
            }
            Err(e) => {
                self.emit(CollectionEvent::GotSongs {
                    songs: SongList::new(),
                    id,
                });
                Err(e)
            }
        }
    }

    /// Distinct values of `column` among non-compilation songs.
    pub async fn get_all(&self, column: &str, options: &QueryOptions) -> Result<Vec<String>> {
        let result: Result<Vec<String>> = async {
            let mut db = self.session().await?;
            let mut query = self.new_query(options);
            query.set_column_spec(format!("DISTINCT {}", column));
            query.add_compilation_requirement(false);
            let rows: Vec<(String,)> = query.exec_as(&mut db).await?;
            Ok(rows.into_iter().map(|(value,)| value).collect())
        }
        .await;
        self.finish(result)
    }

    pub async fn get_all_artists(&self, options: &QueryOptions) -> Result<Vec<String>> {
        self.get_all("artist", options).await
    }

    /// Artists having at least one album: album artists, plus track artists
    /// of songs that have no album artist.
    pub async fn get_all_artists_with_albums(&self, options: &QueryOptions) -> Result<Vec<String>> {
        let result: Result<Vec<String>> = async {
            let mut db = self.session().await?;

            let mut with_albumartist = self.new_query(options);
            with_albumartist.set_column_spec("DISTINCT albumartist");
            with_albumartist.add_compilation_requirement(false);
            with_albumartist.add_where("album", "", "!=");
            with_albumartist.add_where("albumartist", "", "!=");

            let mut without_albumartist = self.new_query(options);
            without_albumartist.set_column_spec("DISTINCT artist");
            without_albumartist.add_compilation_requirement(false);
            without_albumartist.add_where("album", "", "!=");
            without_albumartist.add_where("albumartist", "", "=");

            let first: Vec<(String,)> = with_albumartist.exec_as(&mut db).await?;
            let second: Vec<(String,)> = without_albumartist.exec_as(&mut db).await?;

            let artists: BTreeSet<String> = first
                .into_iter()
                .chain(second)
                .map(|(artist,)| artist)
                .collect();
            Ok(artists.into_iter().collect())
        }
        .await;
        self.finish(result)
    }

    pub async fn get_artist_songs(
        &self,
        effective_albumartist: &str,
        options: &QueryOptions,
    ) -> Result<SongList> {
        let mut query = self.new_query(options);
        query.add_compilation_requirement(false);
        query.add_where("effective_albumartist", effective_albumartist, "=");
        self.exec_collection_query(query).await
    }

    pub async fn get_album_songs(
        &self,
        effective_albumartist: &str,
        album: &str,
        options: &QueryOptions,
    ) -> Result<SongList> {
        let mut query = self.new_query(options);
        query.add_compilation_requirement(false);
        query.add_where("effective_albumartist", effective_albumartist, "=");
        query.add_where("album", album, "=");
        self.exec_collection_query(query).await
    }

    pub async fn get_songs_by_album(&self, album: &str, options: &QueryOptions) -> Result<SongList> {
        let mut query = self.new_query(options);
        query.add_compilation_requirement(false);
        query.add_where("album", album, "=");
        self.exec_collection_query(query).await
    }

    pub async fn get_compilation_songs(
        &self,
        album: &str,
        options: &QueryOptions,
    ) -> Result<SongList> {
        let mut query = self.new_query(options);
        query.add_compilation_requirement(true);
        query.add_where("album", album, "=");
        self.exec_collection_query(query).await
    }

    pub async fn exec_collection_query(&self, query: CollectionQuery) -> Result<SongList> {
        let result = async {
            let mut db = self.session().await?;
            self.query_songs(&mut db, query).await
        }
        .await;
        self.finish(result)
    }

    pub async fn get_all_albums(&self, options: &QueryOptions) -> Result<AlbumList> {
        self.get_albums("", false, options).await
    }

    pub async fn get_albums_by_artist(
        &self,
        artist: &str,
        options: &QueryOptions,
    ) -> Result<AlbumList> {
        self.get_albums(artist, false, options).await
    }

    pub async fn get_compilation_albums(&self, options: &QueryOptions) -> Result<AlbumList> {
        self.get_albums("", true, options).await
    }

    /// Albums keyed by (album artist, album, file type), urls merged.
    async fn get_albums(
        &self,
        artist: &str,
        compilation_required: bool,
        options: &QueryOptions,
    ) -> Result<AlbumList> {
        type AlbumRow = (String, String, String, bool, String, String, i64, String);

        let result: Result<AlbumList> = async {
            let mut db = self.session().await?;

            let mut query = self.new_query(options);
            query.set_column_spec(
                "url, effective_albumartist, album, compilation_effective, \
                 art_automatic, art_manual, filetype, cue_path",
            );
            query.set_order_by("effective_albumartist, album, url");

            if compilation_required {
                query.add_compilation_requirement(true);
            } else if !artist.is_empty() {
                query.add_compilation_requirement(false);
                query.add_where("effective_albumartist", artist, "=");
            }

            let rows: Vec<AlbumRow> = query.exec_as(&mut db).await?;

            let mut albums: BTreeMap<String, Album> = BTreeMap::new();
            for (url, albumartist, album, compilation, art_automatic, art_manual, filetype, cue_path) in
                rows
            {
                let filetype = FileType::from(filetype);
                let album_artist = if compilation { String::new() } else { albumartist };

                let mut key = album_artist.clone();
                if !album.is_empty() {
                    if !key.is_empty() {
                        key.push('-');
                    }
                    key.push_str(&album);
                }
                key.push_str(filetype.text());

                albums
                    .entry(key)
                    .or_insert_with(|| Album {
                        album_artist,
                        album,
                        art_automatic,
                        art_manual,
                        urls: Vec::new(),
                        filetype,
                        cue_path,
                    })
                    .urls
                    .push(url);
            }

            Ok(albums.into_values().collect())
        }
        .await;
        self.finish(result)
    }

    /// Art of the first song of an album.
    pub async fn get_album_art(&self, effective_albumartist: &str, album: &str) -> Result<Album> {
        let result: Result<Album> = async {
            let mut db = self.session().await?;

            let mut query = self.new_query(&QueryOptions::default());
            query.set_column_spec("art_automatic, art_manual, url");
            if !effective_albumartist.is_empty() {
                query.add_where("effective_albumartist", effective_albumartist, "=");
            }
            query.add_where("album", album, "=");
            query.set_limit(Some(1));

            let rows: Vec<(String, String, String)> = query.exec_as(&mut db).await?;

            let mut art = Album {
                album_artist: effective_albumartist.to_string(),
                album: album.to_string(),
                ..Album::default()
            };
            if let Some((art_automatic, art_manual, url)) = rows.into_iter().next() {
                art.art_automatic = art_automatic;
                art.art_manual = art_manual;
                art.urls.push(url);
            }
            Ok(art)
        }
        .await;
        self.finish(result)
    }

    pub async fn get_song_by_id(&self, id: i64) -> Result<Option<Song>> {
        let result = async {
            let mut db = self.session().await?;
            self.song_by_id_in(&mut db, id).await
        }
        .await;
        self.finish(result)
    }

    pub async fn get_songs_by_id(&self, ids: &[i64]) -> Result<SongList> {
        let result = async {
            let mut db = self.session().await?;
            self.songs_by_ids_in(&mut db, ids).await
        }
        .await;
        self.finish(result)
    }

    pub async fn get_song_by_song_id(&self, song_id: &str) -> Result<Option<Song>> {
        let result = async {
            let mut db = self.session().await?;
            self.song_by_song_id_in(&mut db, song_id).await
        }
        .await;
        self.finish(result)
    }

    pub async fn get_songs_by_song_id(&self, song_ids: &[String]) -> Result<SongList> {
        let result = async {
            let mut db = self.session().await?;
            self.songs_by_song_ids_in(&mut db, song_ids).await
        }
        .await;
        self.finish(result)
    }

    pub async fn get_song_by_url(&self, url: &str, beginning: i64) -> Result<Option<Song>> {
        let result = async {
            let mut db = self.session().await?;
            SqlStatement::new(
                self.select_songs("WHERE url = ? AND beginning = ? AND unavailable = 0 LIMIT 1"),
            )
            .bind(url)
            .bind(beginning)
            .fetch_optional_as(&mut db)
            .await
        }
        .await;
        self.finish(result)
    }

    pub async fn get_songs_by_url(&self, url: &str, unavailable: bool) -> Result<SongList> {
        let result = async {
            let mut db = self.session().await?;
            SqlStatement::new(self.select_songs("WHERE url = ? AND unavailable = ?"))
                .bind(url)
                .bind(unavailable)
                .fetch_all_as(&mut db)
                .await
        }
        .await;
        self.finish(result)
    }

    pub async fn get_songs_by_fingerprint(&self, fingerprint: &str) -> Result<SongList> {
        let result = async {
            let mut db = self.session().await?;
            SqlStatement::new(self.select_songs("WHERE fingerprint = ?"))
                .bind(fingerprint)
                .fetch_all_as(&mut db)
                .await
        }
        .await;
        self.finish(result)
    }

    /// Case-insensitive match on artist and title, and album when given.
    pub async fn get_songs_by(&self, artist: &str, album: &str, title: &str) -> Result<SongList> {
        let result = async {
            let mut db = self.session().await?;
            self.songs_by_in(&mut db, artist, album, title).await
        }
        .await;
        self.finish(result)
    }

    pub(super) async fn songs_by_in(
        &self,
        conn: &mut SqliteConnection,
        artist: &str,
        album: &str,
        title: &str,
    ) -> Result<SongList> {
        let statement = if album.is_empty() {
            SqlStatement::new(self.select_songs(
                "WHERE artist = ? COLLATE NOCASE AND title = ? COLLATE NOCASE",
            ))
            .bind(artist)
            .bind(title)
        } else {
            SqlStatement::new(self.select_songs(
                "WHERE artist = ? COLLATE NOCASE AND album = ? COLLATE NOCASE \
                 AND title = ? COLLATE NOCASE",
            ))
            .bind(artist)
            .bind(album)
            .bind(title)
        };
        statement.fetch_all_as(conn).await
    }
}
