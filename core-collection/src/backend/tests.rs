use super::*;
use crate::db::{create_test_pool, ensure_source_tables};
use crate::directory::Subdirectory;
use crate::error::CollectionError;
use bridge_traits::time::ManualClock;
use core_runtime::events::EventBus;
use std::collections::BTreeSet;
use std::sync::Arc;

const NOW: i64 = 1_700_000_000;
const DAY: i64 = 86_400;

struct Fixture {
    backend: Arc<SqliteCollectionBackend>,
    events: Receiver<CollectionEvent>,
    clock: Arc<ManualClock>,
}

impl Fixture {
    async fn local() -> Self {
        Self::with_tables(CollectionTables::local()).await
    }

    async fn with_tables(tables: CollectionTables) -> Self {
        let pool = create_test_pool().await.unwrap();
        ensure_source_tables(&pool, &tables).await.unwrap();
        let clock = Arc::new(ManualClock::at(NOW));
        let bus = EventBus::new(256);
        let events = bus.subscribe();
        let backend =
            SqliteCollectionBackend::new(pool, tables, Source::Collection, bus, clock.clone());
        Self {
            backend,
            events,
            clock,
        }
    }

    /// Song notifications received so far; totals are left out.
    fn song_events(&mut self) -> Vec<CollectionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            match event {
                CollectionEvent::TotalSongCountUpdated { .. }
                | CollectionEvent::TotalArtistCountUpdated { .. }
                | CollectionEvent::TotalAlbumCountUpdated { .. } => {}
                other => events.push(other),
            }
        }
        events
    }
}

fn song(directory_id: i64, artist: &str, album: &str, title: &str) -> Song {
    Song {
        directory_id,
        artist: artist.to_string(),
        album: album.to_string(),
        title: title.to_string(),
        url: format!("file:///music/{}/{}.flac", album, title),
        source: Source::Collection,
        filetype: crate::song::FileType::Flac,
        ctime: NOW - 100,
        mtime: NOW - 100,
        ..Song::default()
    }
}

fn titles(songs: &[Song]) -> BTreeSet<String> {
    songs.iter().map(|s| s.title.clone()).collect()
}

#[tokio::test]
async fn test_add_then_update_emits_one_pair() {
    let mut fx = Fixture::local().await;
    let dir = fx.backend.add_directory("/music").await.unwrap();

    fx.backend
        .add_or_update_songs(vec![song(dir.id, "Queen", "Opera", "Love of My Life")])
        .await
        .unwrap();
    let stored = fx.backend.find_songs_in_directory(dir.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    let id = stored[0].id;
    fx.song_events();

    let mut changed = stored[0].clone();
    changed.title = "Bohemian Rhapsody".to_string();
    fx.backend
        .add_or_update_songs(vec![changed.clone()])
        .await
        .unwrap();

    let events = fx.song_events();
    assert_eq!(events.len(), 2);
    match (&events[0], &events[1]) {
        (
            CollectionEvent::SongsDeleted { songs: deleted },
            CollectionEvent::SongsDiscovered { songs: added },
        ) => {
            assert_eq!(deleted.len(), 1);
            assert_eq!(added.len(), 1);
            assert_eq!(deleted[0].title, "Love of My Life");
            assert_eq!(added[0].title, "Bohemian Rhapsody");
            assert_eq!(deleted[0].id, id);
            assert_eq!(added[0].id, id);
        }
        other => panic!("unexpected events: {:?}", other),
    }

    let rows = fx.backend.find_songs_in_directory(dir.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_metadata_equal(&changed));
}

#[tokio::test]
async fn test_song_id_identifies_existing_row() {
    let fx = Fixture::local().await;
    let dir = fx.backend.add_directory("/music").await.unwrap();

    let mut first = song(dir.id, "Queen", "Opera", "Seaside Rendezvous");
    first.song_id = "track-1".to_string();
    fx.backend.add_or_update_songs(vec![first.clone()]).await.unwrap();

    first.track = 9;
    fx.backend.add_or_update_songs(vec![first]).await.unwrap();

    let rows = fx.backend.find_songs_in_directory(dir.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].track, 9);
}

#[tokio::test]
async fn test_orphaned_songs_are_skipped() {
    let mut fx = Fixture::local().await;
    fx.backend
        .add_or_update_songs(vec![song(42, "Queen", "Opera", "Death on Two Legs")])
        .await
        .unwrap();

    let all = fx.backend.get_all_songs(1).await.unwrap();
    assert!(all.is_empty());
    assert!(fx
        .song_events()
        .iter()
        .all(|e| !matches!(e, CollectionEvent::Error { .. })));
}

#[tokio::test]
async fn test_remove_directory_drops_songs_and_signals_once() {
    let mut fx = Fixture::local().await;
    let dir = fx.backend.add_directory("/music").await.unwrap();
    let other = fx.backend.add_directory("/other").await.unwrap();

    fx.backend
        .add_or_update_songs(vec![
            song(dir.id, "Queen", "Opera", "One"),
            song(dir.id, "Queen", "Opera", "Two"),
            song(dir.id, "Queen", "Opera", "Three"),
            song(other.id, "Bowie", "Heroes", "Heroes"),
        ])
        .await
        .unwrap();
    fx.backend
        .add_or_update_subdirs(&[Subdirectory::new(dir.id, "/music/Opera", 10)])
        .await
        .unwrap();
    fx.song_events();

    fx.backend.remove_directory(&dir).await.unwrap();

    assert!(fx.backend.find_songs_in_directory(dir.id).await.unwrap().is_empty());
    assert!(fx.backend.subdirs_in_directory(dir.id).await.unwrap().is_empty());
    assert_eq!(fx.backend.find_songs_in_directory(other.id).await.unwrap().len(), 1);

    let directories = fx.backend.get_all_directories().await.unwrap();
    assert_eq!(directories, vec![other]);

    let events = fx.song_events();
    let deleted_dirs = events
        .iter()
        .filter(|e| matches!(e, CollectionEvent::DirectoryDeleted { .. }))
        .count();
    assert_eq!(deleted_dirs, 1);
    let deleted_songs: usize = events
        .iter()
        .filter_map(|e| match e {
            CollectionEvent::SongsDeleted { songs } => Some(songs.len()),
            _ => None,
        })
        .sum();
    assert_eq!(deleted_songs, 3);
}

#[tokio::test]
async fn test_compilation_detection() {
    let mut fx = Fixture::local().await;
    let dir = fx.backend.add_directory("/music").await.unwrap();

    let mut forced_off = song(dir.id, "Elton John", "Hits", "Rocket Man");
    forced_off.compilation_off = true;
    fx.backend
        .add_or_update_songs(vec![
            song(dir.id, "Queen", "Hits", "Radio Ga Ga"),
            song(dir.id, "David Bowie", "Hits", "Starman"),
            forced_off,
            song(dir.id, "Queen", "Opera", "Prophet's Song"),
        ])
        .await
        .unwrap();
    fx.song_events();

    fx.backend.compilations_need_updating().await.unwrap();

    let rows = fx.backend.find_songs_in_directory(dir.id).await.unwrap();
    for row in &rows {
        if row.album == "Hits" {
            assert!(row.compilation_detected, "{} not detected", row.title);
            assert_eq!(row.compilation_effective, row.is_compilation());
        } else {
            assert!(!row.compilation_detected);
            assert!(!row.compilation_effective);
        }
    }

    let events = fx.song_events();
    assert_eq!(events.len(), 2);
    match &events[1] {
        CollectionEvent::SongsDiscovered { songs } => {
            assert_eq!(
                titles(songs),
                BTreeSet::from(["Radio Ga Ga".to_string(), "Starman".to_string()])
            );
            assert!(songs.iter().all(|s| s.compilation_effective));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    // Nothing left to change
    fx.backend.compilations_need_updating().await.unwrap();
    assert!(fx.song_events().is_empty());
}

#[tokio::test]
async fn test_force_compilation() {
    let fx = Fixture::local().await;
    let dir = fx.backend.add_directory("/music").await.unwrap();
    fx.backend
        .add_or_update_songs(vec![
            song(dir.id, "A", "Mix", "First"),
            song(dir.id, "B", "Mix", "Second"),
        ])
        .await
        .unwrap();

    fx.backend
        .force_compilation("Mix", &["A".to_string()], true)
        .await
        .unwrap();

    let options = QueryOptions::default();
    let compilation = fx.backend.get_compilation_songs("Mix", &options).await.unwrap();
    assert_eq!(titles(&compilation), BTreeSet::from(["First".to_string()]));

    let albums = fx.backend.get_compilation_albums(&options).await.unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].album_artist, "");
    assert_eq!(albums[0].album, "Mix");
}

#[tokio::test]
async fn test_artists_with_albums_falls_back_to_artist() {
    let fx = Fixture::local().await;
    let dir = fx.backend.add_directory("/music").await.unwrap();

    let mut no_album = song(dir.id, "W", "", "Loose Track");
    no_album.albumartist = "Z".to_string();
    fx.backend
        .add_or_update_songs(vec![song(dir.id, "X", "Y", "Track"), no_album])
        .await
        .unwrap();

    let artists = fx
        .backend
        .get_all_artists_with_albums(&QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(artists, vec!["X".to_string()]);
}

#[tokio::test]
async fn test_album_listing_merges_urls() {
    let fx = Fixture::local().await;
    let dir = fx.backend.add_directory("/music").await.unwrap();
    fx.backend
        .add_or_update_songs(vec![
            song(dir.id, "Queen", "Opera", "One"),
            song(dir.id, "Queen", "Opera", "Two"),
            song(dir.id, "Queen", "Jazz", "Mustapha"),
        ])
        .await
        .unwrap();

    let options = QueryOptions::default();
    let albums = fx.backend.get_albums_by_artist("Queen", &options).await.unwrap();
    assert_eq!(albums.len(), 2);
    let opera = albums.iter().find(|a| a.album == "Opera").unwrap();
    assert_eq!(opera.urls.len(), 2);
    assert_eq!(opera.filetype, crate::song::FileType::Flac);

    assert_eq!(
        fx.backend.get_all_artists(&options).await.unwrap(),
        vec!["Queen".to_string()]
    );
    assert_eq!(fx.backend.update_total_album_count().await.unwrap(), 2);
    assert_eq!(fx.backend.update_total_song_count().await.unwrap(), 3);
    assert_eq!(fx.backend.update_total_artist_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_reconcile_by_song_id() {
    let tables = CollectionTables::for_service("tidal").unwrap();
    let mut fx = Fixture::with_tables(tables).await;

    let remote = |id: &str, title: &str| Song {
        song_id: id.to_string(),
        ..song(-1, "Artist", "Album", title)
    };

    fx.backend
        .update_songs_by_song_id(vec![remote("a", "A"), remote("b", "B")])
        .await
        .unwrap();
    fx.song_events();

    fx.backend
        .update_songs_by_song_id(vec![remote("a", "A2"), remote("c", "C")])
        .await
        .unwrap();

    let events = fx.song_events();
    let mut deleted = SongList::new();
    let mut added = SongList::new();
    for event in events {
        match event {
            CollectionEvent::SongsDeleted { songs } => deleted.extend(songs),
            CollectionEvent::SongsDiscovered { songs } => added.extend(songs),
            other => panic!("unexpected event: {:?}", other),
        }
    }
    assert_eq!(titles(&deleted), BTreeSet::from(["A".to_string(), "B".to_string()]));
    assert_eq!(titles(&added), BTreeSet::from(["A2".to_string(), "C".to_string()]));

    let all = fx.backend.get_all_songs(3).await.unwrap();
    assert_eq!(titles(&all), BTreeSet::from(["A2".to_string(), "C".to_string()]));

    // Unchanged input touches nothing
    fx.song_events();
    fx.backend
        .update_songs_by_song_id(vec![remote("a", "A2"), remote("c", "C")])
        .await
        .unwrap();
    assert!(fx.song_events().is_empty());
}

#[tokio::test]
async fn test_reconcile_keeps_one_row_per_song_id() {
    let tables = CollectionTables::for_service("tidal").unwrap();
    let mut fx = Fixture::with_tables(tables).await;

    let remote = |id: &str, title: &str| Song {
        song_id: id.to_string(),
        ..song(-1, "Artist", "Album", title)
    };

    fx.backend
        .update_songs_by_song_id(vec![remote("x", "X1"), remote("y", "Y"), remote("x", "X2")])
        .await
        .unwrap();

    let all = fx.backend.get_all_songs(1).await.unwrap();
    let x_rows: Vec<&Song> = all.iter().filter(|s| s.song_id == "x").collect();
    assert_eq!(x_rows.len(), 1);
    assert_eq!(x_rows[0].title, "X2");
    assert_eq!(all.len(), 2);

    let added: usize = fx
        .song_events()
        .into_iter()
        .map(|event| match event {
            CollectionEvent::SongsDiscovered { songs } => songs.len(),
            _ => 0,
        })
        .sum();
    assert_eq!(added, 2);
}

#[tokio::test]
async fn test_service_tables_have_no_directories() {
    let tables = CollectionTables::for_service("qobuz").unwrap();
    let mut fx = Fixture::with_tables(tables).await;

    let err = fx.backend.add_directory("/music").await.unwrap_err();
    assert!(matches!(err, CollectionError::InvalidInput { .. }));
    assert!(fx
        .song_events()
        .iter()
        .any(|e| matches!(e, CollectionEvent::Error { .. })));
}

#[tokio::test]
async fn test_sql_failure_is_reported() {
    let mut fx = Fixture::local().await;
    let err = fx
        .backend
        .get_all("no_such_column", &QueryOptions::default())
        .await
        .unwrap_err();
    assert!(err.sql().unwrap().contains("no_such_column"));

    let events = fx.song_events();
    match events.as_slice() {
        [CollectionEvent::Error { message }] => {
            assert!(message.contains("Faulty SQL query"));
        }
        other => panic!("unexpected events: {:?}", other),
    }
}

#[tokio::test]
async fn test_change_dir_path_rewrites_prefixes() {
    let fx = Fixture::local().await;
    let dir = fx.backend.add_directory("/music").await.unwrap();
    fx.backend
        .add_or_update_subdirs(&[Subdirectory::new(dir.id, "/music/Opera", 10)])
        .await
        .unwrap();
    fx.backend
        .add_or_update_songs(vec![song(dir.id, "Queen", "Opera", "Lazing")])
        .await
        .unwrap();

    fx.backend
        .change_dir_path(dir.id, "/music", "/media/music")
        .await
        .unwrap();

    let directories = fx.backend.get_all_directories().await.unwrap();
    assert_eq!(directories[0].path, "/media/music");
    let subdirs = fx.backend.subdirs_in_directory(dir.id).await.unwrap();
    assert_eq!(subdirs[0].path, "/media/music/Opera");
    let songs = fx.backend.find_songs_in_directory(dir.id).await.unwrap();
    assert_eq!(songs[0].url, "file:///media/music/Opera/Lazing.flac");
}

#[tokio::test]
async fn test_subdirectory_mtimes() {
    let fx = Fixture::local().await;
    let dir = fx.backend.add_directory("/music").await.unwrap();

    fx.backend
        .add_or_update_subdirs(&[
            Subdirectory::new(dir.id, "/music/a", 5),
            Subdirectory::new(dir.id, "/music/b", 6),
        ])
        .await
        .unwrap();
    fx.backend
        .add_or_update_subdirs(&[
            Subdirectory::new(dir.id, "/music/a", 0),
            Subdirectory::new(dir.id, "/music/b", 9),
        ])
        .await
        .unwrap();

    let subdirs = fx.backend.subdirs_in_directory(dir.id).await.unwrap();
    assert_eq!(subdirs, vec![Subdirectory::new(dir.id, "/music/b", 9)]);
}

#[tokio::test]
async fn test_load_directories_announces_each() {
    let mut fx = Fixture::local().await;
    let dir = fx.backend.add_directory("/music").await.unwrap();
    fx.backend
        .add_or_update_subdirs(&[Subdirectory::new(dir.id, "/music/a", 5)])
        .await
        .unwrap();
    fx.song_events();

    fx.backend.load_directories().await.unwrap();
    match fx.song_events().as_slice() {
        [CollectionEvent::DirectoryDiscovered { directory, subdirs }] => {
            assert_eq!(directory, &dir);
            assert_eq!(subdirs.len(), 1);
        }
        other => panic!("unexpected events: {:?}", other),
    }
}

#[tokio::test]
async fn test_last_seen_and_expiry() {
    let fx = Fixture::local().await;
    let dir = fx.backend.add_directory("/music").await.unwrap();

    let mut stale = song(dir.id, "Queen", "Opera", "Stale");
    stale.unavailable = true;
    stale.lastseen = NOW - 10 * DAY;
    let mut recent = song(dir.id, "Queen", "Opera", "Recent");
    recent.unavailable = true;
    recent.lastseen = NOW - DAY;
    let present = song(dir.id, "Queen", "Opera", "Present");
    fx.backend
        .add_or_update_songs(vec![stale, recent, present])
        .await
        .unwrap();

    fx.clock.advance(60);
    fx.backend.update_last_seen(dir.id, 5).await.unwrap();

    let rows = fx.backend.find_songs_in_directory(dir.id).await.unwrap();
    assert_eq!(
        titles(&rows),
        BTreeSet::from(["Recent".to_string(), "Present".to_string()])
    );
    let present = rows.iter().find(|s| s.title == "Present").unwrap();
    assert_eq!(present.lastseen, NOW + 60);
}

#[tokio::test]
async fn test_mark_unavailable_hides_songs() {
    let mut fx = Fixture::local().await;
    let dir = fx.backend.add_directory("/music").await.unwrap();
    fx.backend
        .add_or_update_songs(vec![song(dir.id, "Queen", "Opera", "Hidden")])
        .await
        .unwrap();
    let rows = fx.backend.find_songs_in_directory(dir.id).await.unwrap();
    fx.song_events();

    fx.backend
        .mark_songs_unavailable(rows.clone(), true)
        .await
        .unwrap();
    assert!(fx
        .backend
        .get_all_artists(&QueryOptions::default())
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        fx.song_events().as_slice(),
        [CollectionEvent::SongsDeleted { .. }]
    ));

    fx.backend.mark_songs_unavailable(rows, false).await.unwrap();
    assert_eq!(
        fx.backend
            .get_all_artists(&QueryOptions::default())
            .await
            .unwrap(),
        vec!["Queen".to_string()]
    );
}

#[tokio::test]
async fn test_statistics_and_ratings() {
    let mut fx = Fixture::local().await;
    let dir = fx.backend.add_directory("/music").await.unwrap();
    fx.backend
        .add_or_update_songs(vec![song(dir.id, "Queen", "Opera", "Good Company")])
        .await
        .unwrap();
    let id = fx.backend.find_songs_in_directory(dir.id).await.unwrap()[0].id;
    fx.song_events();

    fx.backend.increment_play_count(id).await.unwrap();
    fx.backend.increment_skip_count(id, 0.3).await.unwrap();
    let row = fx.backend.get_song_by_id(id).await.unwrap().unwrap();
    assert_eq!(row.playcount, 1);
    assert_eq!(row.skipcount, 1);
    assert_eq!(row.lastplayed, NOW);

    fx.backend
        .update_last_played("queen", "opera", "good company", NOW + 500)
        .await
        .unwrap();
    fx.backend.update_play_count("QUEEN", "Good Company", 12).await.unwrap();
    let row = fx.backend.get_song_by_id(id).await.unwrap().unwrap();
    assert_eq!(row.lastplayed, NOW + 500);
    assert_eq!(row.playcount, 12);

    fx.backend.update_song_rating(id, 0.8).await.unwrap();
    fx.backend.reset_statistics(id).await.unwrap();
    let row = fx.backend.get_song_by_id(id).await.unwrap().unwrap();
    assert_eq!(row.rating, 0.8);
    assert_eq!(row.playcount, 0);
    assert_eq!(row.lastplayed, -1);

    let events = fx.song_events();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, CollectionEvent::SongsStatisticsChanged { .. }))
            .count(),
        5
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, CollectionEvent::SongsRatingChanged { .. }))
            .count(),
        1
    );

    // Unknown rows are ignored
    fx.backend.increment_play_count(-1).await.unwrap();
    assert!(fx.song_events().is_empty());
}

#[tokio::test]
async fn test_art_updates_are_announced() {
    let mut fx = Fixture::local().await;
    let dir = fx.backend.add_directory("/music").await.unwrap();
    fx.backend
        .add_or_update_songs(vec![song(dir.id, "Queen", "Opera", "Sweet Lady")])
        .await
        .unwrap();
    fx.song_events();

    fx.backend
        .update_manual_album_art("Queen", "Opera", "file:///covers/opera.jpg", true)
        .await
        .unwrap();

    let art = fx.backend.get_album_art("Queen", "Opera").await.unwrap();
    assert_eq!(art.art_manual, "file:///covers/opera.jpg");
    assert_eq!(art.art_automatic, "");
    assert_eq!(fx.song_events().len(), 2);
}

#[tokio::test]
async fn test_queued_work_runs_in_order() {
    let mut fx = Fixture::local().await;
    let dir = fx.backend.add_directory("/music").await.unwrap();
    fx.song_events();

    fx.backend
        .add_or_update_songs_async(vec![song(dir.id, "Queen", "Opera", "God Save the Queen")]);
    fx.backend.get_all_songs_async(7);
    fx.backend.flush().await;

    let mut got = None;
    let mut totals = 0;
    while let Ok(event) = fx.events.try_recv() {
        match event {
            CollectionEvent::GotSongs { songs, id } => got = Some((songs.len(), id)),
            CollectionEvent::TotalSongCountUpdated { count } => {
                assert_eq!(count, 1);
                totals += 1;
            }
            _ => {}
        }
    }
    assert_eq!(got, Some((1, 7)));
    assert_eq!(totals, 1);
}

#[tokio::test]
async fn test_delete_all_and_exit() {
    let mut fx = Fixture::local().await;
    let dir = fx.backend.add_directory("/music").await.unwrap();
    fx.backend
        .add_or_update_songs(vec![song(dir.id, "Queen", "Opera", "Bye")])
        .await
        .unwrap();
    fx.song_events();

    fx.backend.delete_all().await.unwrap();
    assert!(fx.backend.get_all_songs(0).await.unwrap().is_empty());

    fx.backend.exit_async();
    fx.backend.flush().await;

    let events = fx.song_events();
    assert!(matches!(events.first(), Some(CollectionEvent::DatabaseReset)));
    assert!(matches!(events.last(), Some(CollectionEvent::ExitFinished)));
    assert!(fx.backend.pool().is_closed());
}
