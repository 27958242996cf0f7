//! End-to-end scenarios: songs written through the backend reach the tree
//! model through the event bus.

use bridge_traits::{ManualClock, MemorySettingsStore, SettingsStore};
use core_collection::{
    Collection, CollectionBackend, CollectionSettings, CollectionTables, FileType, GroupBy,
    Grouping, ItemType, QueryOptions, Song, Source,
};
use core_runtime::config::CoreConfig;
use std::sync::Arc;

const NOW: i64 = 1_700_000_000;

async fn open(settings: Arc<MemorySettingsStore>) -> Collection {
    let config = CoreConfig::builder()
        .in_memory_database()
        .settings_store(settings)
        .clock(Arc::new(ManualClock::at(NOW)))
        .build()
        .unwrap();
    let mut collection = Collection::new(&config, CollectionTables::local())
        .await
        .unwrap();
    collection.init().await.unwrap();
    collection
}

fn song(directory_id: i64, artist: &str, album: &str, title: &str, track: i32) -> Song {
    Song {
        directory_id,
        artist: artist.to_string(),
        album: album.to_string(),
        title: title.to_string(),
        track,
        url: format!("file:///music/{}/{}/{:02}.flac", artist, album, track),
        source: Source::Collection,
        filetype: FileType::Flac,
        ctime: NOW - 60,
        mtime: NOW - 60,
        ..Song::default()
    }
}

async fn add(collection: &mut Collection, songs: Vec<Song>) {
    collection.backend().add_or_update_songs(songs).await.unwrap();
    collection.backend().flush().await;
    collection.run_pending_events();
}

fn child_texts(collection: &Collection, node: u64) -> Vec<String> {
    let model = collection.model();
    let mut texts: Vec<String> = model
        .children(node)
        .iter()
        .map(|child| model.item(*child).unwrap().text().to_string())
        .collect();
    texts.sort();
    texts
}

#[tokio::test]
async fn test_new_artist_appears_under_its_divider() {
    let mut collection = open(Arc::new(MemorySettingsStore::new())).await;
    let dir = collection.backend().add_directory("/music").await.unwrap();
    assert_eq!(collection.model().row_count(collection.model().root()), 0);

    add(
        &mut collection,
        vec![
            song(dir.id, "Queen", "A Night at the Opera", "Death on Two Legs", 1),
            song(dir.id, "Queen", "A Night at the Opera", "Bohemian Rhapsody", 11),
        ],
    )
    .await;

    let model = collection.model();
    let root = model.root();
    assert_eq!(child_texts(&collection, root), vec!["Q", "Queen"]);

    let divider = model.find_child(root, "Q").unwrap();
    assert_eq!(model.item(divider).unwrap().item_type, ItemType::Divider);

    let queen = model.find_child(root, "Queen").unwrap();
    let album = model.find_child(queen, "A Night at the Opera").unwrap();
    let songs = model.child_songs(&[album]);
    let titles: Vec<&str> = songs.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Death on Two Legs", "Bohemian Rhapsody"]);
    assert_eq!(model.total_song_count(), 2);
}

#[tokio::test]
async fn test_compilation_lands_under_various_artists() {
    let mut collection = open(Arc::new(MemorySettingsStore::new())).await;
    let dir = collection.backend().add_directory("/music").await.unwrap();

    let mut parklife = song(dir.id, "Blur", "Britpop Hits", "Parklife", 1);
    parklife.compilation = true;
    let mut common = song(dir.id, "Pulp", "Britpop Hits", "Common People", 2);
    common.compilation = true;
    add(&mut collection, vec![parklife, common]).await;

    let model = collection.model();
    let root = model.root();
    assert_eq!(child_texts(&collection, root), vec!["Various artists"]);

    let various = model.find_child(root, "Various artists").unwrap();
    assert_eq!(child_texts(&collection, various), vec!["Britpop Hits"]);
    let album = model.find_child(various, "Britpop Hits").unwrap();
    assert_eq!(
        child_texts(&collection, album),
        vec!["Blur - Parklife", "Pulp - Common People"]
    );
}

#[tokio::test]
async fn test_retagged_song_moves_to_its_new_album() {
    let mut collection = open(Arc::new(MemorySettingsStore::new())).await;
    let dir = collection.backend().add_directory("/music").await.unwrap();
    add(&mut collection, vec![song(dir.id, "Queen", "Jazz", "Mustapha", 1)]).await;

    let mut stored = collection
        .backend()
        .find_songs_in_directory(dir.id)
        .await
        .unwrap();
    stored[0].album = "Jazz (Remastered)".to_string();
    add(&mut collection, stored).await;

    let model = collection.model();
    assert_eq!(model.song_count(), 1);
    let queen = model.find_child(model.root(), "Queen").unwrap();
    assert_eq!(child_texts(&collection, queen), vec!["Jazz (Remastered)"]);
}

#[tokio::test]
async fn test_removing_last_album_removes_artist_and_divider() {
    let mut collection = open(Arc::new(MemorySettingsStore::new())).await;
    let dir = collection.backend().add_directory("/music").await.unwrap();
    add(
        &mut collection,
        vec![
            song(dir.id, "Queen", "Jazz", "Mustapha", 1),
            song(dir.id, "Blur", "Parklife", "Girls & Boys", 1),
        ],
    )
    .await;

    let queen_songs = collection
        .backend()
        .get_artist_songs("Queen", &QueryOptions::default())
        .await
        .unwrap();
    collection.backend().delete_songs(queen_songs).await.unwrap();
    collection.backend().flush().await;
    collection.run_pending_events();

    let model = collection.model();
    assert_eq!(child_texts(&collection, model.root()), vec!["B", "Blur"]);
    assert!(model.divider_node("q").is_none());
    assert_eq!(model.total_song_count(), 1);
}

#[tokio::test]
async fn test_artists_with_albums_skip_compilation_only_artists() {
    let mut collection = open(Arc::new(MemorySettingsStore::new())).await;
    let dir = collection.backend().add_directory("/music").await.unwrap();

    let mut various = song(dir.id, "Pulp", "Britpop Hits", "Common People", 1);
    various.compilation = true;
    add(
        &mut collection,
        vec![various, song(dir.id, "Blur", "Parklife", "Girls & Boys", 1)],
    )
    .await;

    let artists = collection
        .backend()
        .get_all_artists_with_albums(&QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(artists, vec!["Blur".to_string()]);
}

#[tokio::test]
async fn test_saved_settings_drive_the_next_session() {
    let store = Arc::new(MemorySettingsStore::new());
    let mut settings = CollectionSettings::default();
    settings.grouping = Grouping::new(GroupBy::Genre, GroupBy::Album, GroupBy::None);
    settings.show_dividers = false;
    settings.save(store.as_ref()).await.unwrap();

    let mut collection = open(store.clone()).await;
    assert_eq!(collection.model().grouping()[0], GroupBy::Genre);

    let dir = collection.backend().add_directory("/music").await.unwrap();
    let mut mustapha = song(dir.id, "Queen", "Jazz", "Mustapha", 1);
    mustapha.genre = "Rock".to_string();
    add(&mut collection, vec![mustapha]).await;
    assert_eq!(child_texts(&collection, collection.model().root()), vec!["Rock"]);

    collection
        .model_mut()
        .set_group_by(Grouping::new(GroupBy::Artist, GroupBy::None, GroupBy::None));
    collection.save_settings().await.unwrap();
    let reloaded = CollectionSettings::load(store.as_ref() as &dyn SettingsStore)
        .await
        .unwrap();
    assert_eq!(reloaded.grouping[0], GroupBy::Artist);
    assert!(!reloaded.show_dividers);

    collection.exit().await.unwrap();
}

#[tokio::test]
async fn test_reloaded_display_settings_keep_the_tree() {
    let store = Arc::new(MemorySettingsStore::new());
    let mut collection = open(store.clone()).await;
    let dir = collection.backend().add_directory("/music").await.unwrap();
    add(&mut collection, vec![song(dir.id, "Queen", "Jazz", "Mustapha", 1)]).await;
    assert_eq!(child_texts(&collection, collection.model().root()), vec!["Q", "Queen"]);

    let mut settings = CollectionSettings::default();
    settings.show_dividers = false;
    settings.pretty_covers = false;
    settings.save(store.as_ref()).await.unwrap();
    collection.reload_settings().await.unwrap();

    let model = collection.model();
    assert!(!model.is_loading());
    assert_eq!(model.song_count(), 1);
    assert_eq!(model.divider_count(), 0);
    assert_eq!(child_texts(&collection, model.root()), vec!["Queen"]);
    assert!(!collection.settings().show_dividers);
}
