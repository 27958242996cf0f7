//! Grouping tree over a collection
//!
//! [`CollectionModel`] arranges the songs of one backend into a tree of up
//! to three container levels (album artist, then album, by default) with
//! songs as leaves. Top-level containers are bucketed under divider nodes,
//! compilation songs are gathered under a "Various artists" node wherever an
//! artist level would otherwise split them, and album containers can show
//! their cover through the shared [`AlbumIconCache`].
//!
//! ## Lifecycle
//!
//! ```text
//! init() ─► Loading ("Loading..." node, query running in a task)
//!             │ load result for the current generation
//!             ▼
//!           Populated ◄── handle_event(SongsDiscovered / SongsDeleted / ...)
//! ```
//!
//! Every `init()` bumps a generation id; results of older loads are
//! discarded when they arrive. Incremental updates notify the attached
//! [`TreeObserver`] around each inserted or removed row.
//!
//! ## Usage
//!
//! ```ignore
//! let mut model = CollectionModel::new(backend, settings_store, icon_cache);
//! model.init();
//! model.wait_for_load().await?;
//!
//! let mut events = backend.subscribe();
//! while let Ok(event) = events.recv().await {
//!     model.handle_event(&event);
//! }
//! ```

pub mod filter;
pub mod grouping;
pub mod item;
pub mod observer;


pub use filter::CollectionFilter;
pub use grouping::{GroupBy, Grouping};
pub use item::{CollectionItem, ItemType, NodeId};
pub use observer::{NoopObserver, TreeObserver};

use crate::art_cache::{AlbumIconCache, CachedIcon};
use crate::backend::CollectionBackend;
use crate::error::{CollectionError, Result};
use crate::events::CollectionEvent;
use crate::query::{CollectionQuery, QueryMode, QueryOptions};
use crate::settings::{self, CollectionSettings};
use crate::song::{Song, SongList};
use bridge_traits::artwork::{CoverArtLoader, CoverArtRequest, CoverArtResult};
use bridge_traits::storage::SettingsStore;
use bytes::Bytes;
use grouping::{
    container_key, container_text, divider_display_text, divider_key, sort_text_for_song,
    text_or_unknown, VARIOUS_ARTISTS_TEXT,
};
use item::VARIOUS_ARTISTS_KEY;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Edge length, in pixels, of album covers shown in the tree.
pub const PRETTY_COVER_SIZE: u32 = 32;

pub const LOADING_TEXT: &str = "Loading...";

/// What [`CollectionModel::data`] can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Display,
    ToolTip,
    Type,
    IsDivider,
    /// Grouping of a container's level, `GroupBy::None` for other nodes
    ContainerType,
    Key,
    Artist,
    Editable,
    SortText,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemData {
    Text(String),
    Bool(bool),
    Type(ItemType),
    GroupBy(GroupBy),
}

/// Icon to draw next to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoration {
    None,
    ArtistIcon,
    AlbumIcon,
    /// Encoded album cover
    Cover(Bytes),
    /// Placeholder while a cover loads, or when there is none
    NoCover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemFlags {
    pub selectable: bool,
    pub enabled: bool,
    pub drag_enabled: bool,
}

/// Songs dragged out of the tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SongMimeData {
    pub urls: Vec<String>,
    pub songs: SongList,
}

/// Outcome of one bulk load, tagged with the generation that started it.
struct LoadResult {
    id: u64,
    result: Result<SongList>,
}

pub struct CollectionModel {
    backend: Arc<dyn CollectionBackend>,
    settings_store: Arc<dyn SettingsStore>,
    icon_cache: Arc<AlbumIconCache>,
    cover_loader: Option<Arc<dyn CoverArtLoader>>,
    observer: Arc<dyn TreeObserver>,

    nodes: HashMap<NodeId, CollectionItem>,
    next_node: NodeId,
    root: NodeId,
    song_nodes: HashMap<i64, NodeId>,
    divider_nodes: HashMap<String, NodeId>,

    grouping: Grouping,
    options: QueryOptions,
    show_dividers: bool,
    pretty_covers: bool,

    init_id: u64,
    next_init_id: u64,
    loading: bool,
    loads_tx: mpsc::UnboundedSender<LoadResult>,
    loads_rx: mpsc::UnboundedReceiver<LoadResult>,

    pending_art: HashMap<u64, (NodeId, String)>,
    pending_cache_keys: HashSet<String>,
    next_art_request: u64,
    art_tx: mpsc::UnboundedSender<CoverArtResult>,
    art_rx: mpsc::UnboundedReceiver<CoverArtResult>,

    total_song_count: i64,
    total_artist_count: i64,
    total_album_count: i64,
}

impl CollectionModel {
    pub fn new(
        backend: Arc<dyn CollectionBackend>,
        settings_store: Arc<dyn SettingsStore>,
        icon_cache: Arc<AlbumIconCache>,
    ) -> Self {
        let (loads_tx, loads_rx) = mpsc::unbounded_channel();
        let (art_tx, art_rx) = mpsc::unbounded_channel();

        let mut model = Self {
            backend,
            settings_store,
            icon_cache,
            cover_loader: None,
            observer: Arc::new(NoopObserver),
            nodes: HashMap::new(),
            next_node: 0,
            root: 0,
            song_nodes: HashMap::new(),
            divider_nodes: HashMap::new(),
            grouping: Grouping::default(),
            options: QueryOptions::default(),
            show_dividers: true,
            pretty_covers: true,
            init_id: 0,
            next_init_id: 0,
            loading: false,
            loads_tx,
            loads_rx,
            pending_art: HashMap::new(),
            pending_cache_keys: HashSet::new(),
            next_art_request: 0,
            art_tx,
            art_rx,
            total_song_count: 0,
            total_artist_count: 0,
            total_album_count: 0,
        };
        model.root = model.alloc(CollectionItem::new(ItemType::Root, None));
        model
    }

    pub fn with_cover_loader(mut self, loader: Arc<dyn CoverArtLoader>) -> Self {
        self.cover_loader = Some(loader);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TreeObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Take grouping and display switches from `settings` without
    /// rebuilding the tree. Call before `init()`.
    pub fn with_settings(mut self, settings: &CollectionSettings) -> Self {
        self.grouping = settings.grouping;
        self.show_dividers = settings.show_dividers;
        self.pretty_covers = settings.pretty_covers;
        self.reload_settings(settings);
        self
    }

    pub fn backend(&self) -> &Arc<dyn CollectionBackend> {
        &self.backend
    }

    // ---- tree read interface ----

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn item(&self, node: NodeId) -> Option<&CollectionItem> {
        self.nodes.get(&node)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|item| item.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(&node)
            .map_or(&[][..], |item| item.children.as_slice())
    }

    pub fn row_count(&self, node: NodeId) -> usize {
        self.children(node).len()
    }

    /// Position of `node` among its parent's children.
    pub fn row(&self, node: NodeId) -> Option<usize> {
        let parent = self.parent(node)?;
        self.children(parent).iter().position(|child| *child == node)
    }

    /// First child of `parent` whose display text is `text`.
    pub fn find_child(&self, parent: NodeId, text: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|child| self.nodes.get(child).is_some_and(|item| item.text() == text))
    }

    pub fn song_node(&self, song_id: i64) -> Option<NodeId> {
        self.song_nodes.get(&song_id).copied()
    }

    pub fn song_count(&self) -> usize {
        self.song_nodes.len()
    }

    pub fn divider_node(&self, key: &str) -> Option<NodeId> {
        self.divider_nodes.get(key).copied()
    }

    pub fn divider_count(&self) -> usize {
        self.divider_nodes.len()
    }

    pub fn grouping(&self) -> Grouping {
        self.grouping
    }

    pub fn query_options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn show_dividers(&self) -> bool {
        self.show_dividers
    }

    pub fn pretty_covers(&self) -> bool {
        self.pretty_covers
    }

    /// Generation id of the most recent `init()`.
    pub fn init_id(&self) -> u64 {
        self.init_id
    }

    /// Whether the current generation's load has not finished yet.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn total_song_count(&self) -> i64 {
        self.total_song_count
    }

    pub fn total_artist_count(&self) -> i64 {
        self.total_artist_count
    }

    pub fn total_album_count(&self) -> i64 {
        self.total_album_count
    }

    fn container_type(&self, item: &CollectionItem) -> GroupBy {
        if !item.is_container() {
            return GroupBy::None;
        }
        usize::try_from(item.container_level)
            .ok()
            .and_then(|level| self.grouping.levels().get(level).copied())
            .unwrap_or_default()
    }

    pub fn data(&self, node: NodeId, role: Role) -> Option<ItemData> {
        let item = self.nodes.get(&node)?;
        let data = match role {
            Role::Display | Role::ToolTip => ItemData::Text(item.text().to_string()),
            Role::Type => ItemData::Type(item.item_type),
            Role::IsDivider => ItemData::Bool(item.item_type == ItemType::Divider),
            Role::ContainerType => ItemData::GroupBy(self.container_type(item)),
            Role::Key => ItemData::Text(item.key.clone()),
            Role::Artist => ItemData::Text(item.metadata.artist.clone()),
            Role::Editable => ItemData::Bool(self.is_editable(item)),
            Role::SortText => ItemData::Text(item.sort_text.clone()),
        };
        Some(data)
    }

    /// A song is editable when its file is; a container when it has
    /// children and all of them are.
    fn is_editable(&self, item: &CollectionItem) -> bool {
        match item.item_type {
            ItemType::Song => item.metadata.is_editable(),
            ItemType::Container => {
                !item.children.is_empty()
                    && item
                        .children
                        .iter()
                        .filter_map(|child| self.nodes.get(child))
                        .all(|child| self.is_editable(child))
            }
            _ => false,
        }
    }

    pub fn flags(&self, node: NodeId) -> ItemFlags {
        match self.nodes.get(&node).map(|item| item.item_type) {
            Some(ItemType::Song | ItemType::Container) => ItemFlags {
                selectable: true,
                enabled: true,
                drag_enabled: true,
            },
            _ => ItemFlags {
                enabled: true,
                ..ItemFlags::default()
            },
        }
    }

    /// Icon for `node`. Album containers show their cover when pretty
    /// covers are on, which may start loading it.
    pub fn decoration(&mut self, node: NodeId) -> Decoration {
        let Some(item) = self.nodes.get(&node) else {
            return Decoration::None;
        };
        let container_type = self.container_type(item);
        if container_type.is_album() {
            if self.pretty_covers {
                self.album_icon(node)
            } else {
                Decoration::AlbumIcon
            }
        } else if container_type.is_artist() {
            Decoration::ArtistIcon
        } else {
            Decoration::None
        }
    }

    // ---- loading ----

    fn new_query(&self) -> CollectionQuery {
        CollectionQuery::new(
            self.backend.tables().songs.as_str(),
            &self.options,
            self.backend.now(),
        )
    }

    /// Drop the tree, show the loading placeholder and start loading every
    /// song matching the options in a background task.
    ///
    /// Returns the generation id of this load.
    pub fn init(&mut self) -> u64 {
        self.next_init_id += 1;
        self.init_id = self.next_init_id;
        self.loading = true;

        self.begin_reset();
        let mut loading = CollectionItem::new(ItemType::LoadingIndicator, Some(self.root));
        loading.display_text = LOADING_TEXT.to_string();
        let id = self.alloc(loading);
        if let Some(root) = self.nodes.get_mut(&self.root) {
            root.children.push(id);
        }
        self.observer.end_reset();

        let id = self.init_id;
        let query = self.new_query();
        let backend = Arc::clone(&self.backend);
        let tx = self.loads_tx.clone();
        debug!(id, grouping = %self.grouping, "Loading collection tree");
        tokio::spawn(async move {
            let result = backend.exec_collection_query(query).await;
            if tx.send(LoadResult { id, result }).is_err() {
                debug!(id, "Collection model dropped before load finished");
            }
        });
        id
    }

    fn apply_load(&mut self, load: LoadResult) -> Result<()> {
        if load.id != self.init_id {
            debug!(id = load.id, current = self.init_id, "Discarding stale collection load");
            return Ok(());
        }
        self.loading = false;

        let songs = load.result?;
        self.begin_reset();
        self.post_query(&songs);
        self.observer.end_reset();
        info!(
            songs = self.song_nodes.len(),
            top_level = self.row_count(self.root),
            "Collection tree loaded"
        );
        Ok(())
    }

    /// Wait for the current generation's load and apply it.
    ///
    /// A failed load leaves the loading placeholder in place and returns
    /// the error; the backend has already reported it.
    pub async fn wait_for_load(&mut self) -> Result<()> {
        while self.loading {
            match self.loads_rx.recv().await {
                Some(load) => self.apply_load(load)?,
                None => break,
            }
        }
        Ok(())
    }

    /// Apply finished loads and cover lookups without waiting.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(load) = self.loads_rx.try_recv() {
            if let Err(e) = self.apply_load(load) {
                warn!(error = %e, "Collection load failed");
            }
            handled += 1;
        }
        while let Ok(result) = self.art_rx.try_recv() {
            self.cover_loaded(result);
            handled += 1;
        }
        handled
    }

    /// Reply to a backend `get_all_songs` request: rebuild from `songs` if
    /// `id` is the current generation.
    pub fn reset_async_finished(&mut self, songs: &[Song], id: u64) {
        if id != self.init_id {
            return;
        }
        self.loading = false;
        self.reset();
        self.songs_discovered(songs);
    }

    /// Whether the songs selected by `query`, restricted to this model's
    /// options, include any compilation.
    pub async fn has_compilations(&self, query: &CollectionQuery) -> Result<bool> {
        let mut derived = self.new_query();
        derived.set_column_spec(query.column_spec());
        derived.set_order_by(query.order_by());
        derived.set_where_clauses(query.where_clauses().to_vec());
        derived.set_bound_values(query.bound_values().to_vec());
        derived.set_include_unavailable(query.include_unavailable());
        derived.set_duplicates_only(query.duplicates_only());
        derived.add_compilation_requirement(true);
        derived.set_limit(Some(1));

        let songs = self.backend.exec_collection_query(derived).await?;
        Ok(!songs.is_empty())
    }

    // ---- backend notifications ----

    pub fn handle_event(&mut self, event: &CollectionEvent) {
        match event {
            CollectionEvent::SongsDiscovered { songs } => self.songs_discovered(songs),
            CollectionEvent::SongsDeleted { songs } => self.songs_deleted(songs),
            CollectionEvent::SongsStatisticsChanged { songs }
            | CollectionEvent::SongsRatingChanged { songs } => self.songs_slightly_changed(songs),
            CollectionEvent::DatabaseReset => self.reset(),
            CollectionEvent::GotSongs { songs, id } => self.reset_async_finished(songs, *id),
            CollectionEvent::TotalSongCountUpdated { count } => {
                self.total_song_count = *count;
                self.observer.total_song_count_updated(*count);
            }
            CollectionEvent::TotalArtistCountUpdated { count } => {
                self.total_artist_count = *count;
                self.observer.total_artist_count_updated(*count);
            }
            CollectionEvent::TotalAlbumCountUpdated { count } => {
                self.total_album_count = *count;
                self.observer.total_album_count_updated(*count);
            }
            CollectionEvent::DirectoryDiscovered { .. }
            | CollectionEvent::DirectoryDeleted { .. }
            | CollectionEvent::ExitFinished
            | CollectionEvent::Error { .. } => {}
        }
    }

    /// Add songs to the live tree, notifying the observer of every row.
    pub fn songs_discovered(&mut self, songs: &[Song]) {
        let now = self.backend.now();
        for song in songs {
            self.add_song(song, now, true);
        }
    }

    /// Fill a freshly reset tree without per-row notifications.
    fn post_query(&mut self, songs: &[Song]) {
        let now = self.backend.now();
        for song in songs {
            self.add_song(song, now, false);
        }
    }

    fn add_song(&mut self, song: &Song, now: i64, signal: bool) {
        if !self.options.matches(song, now) || self.song_nodes.contains_key(&song.id) {
            return;
        }

        // Stored rows carry the derived flag; unsaved songs only have the
        // inputs it is computed from.
        let compilation = song.compilation_effective || song.is_compilation();
        let mut container = self.root;
        let mut key = String::new();
        let levels = *self.grouping.levels();
        for (level, group_by) in levels.into_iter().enumerate() {
            if group_by == GroupBy::None {
                break;
            }
            if !key.is_empty() {
                key.push('-');
            }

            if group_by.is_artist() && compilation {
                container = self.various_artists_node(container, signal);
                key = self
                    .nodes
                    .get(&container)
                    .map(|item| item.key.clone())
                    .unwrap_or_default();
            } else {
                key.push_str(&container_key(group_by, song));
                let existing = self
                    .nodes
                    .get(&container)
                    .and_then(|item| item.child_containers.get(&key).copied());
                container = match existing {
                    Some(id) => id,
                    None => self.create_container(container, level, group_by, song, &key, signal),
                };
            }
        }

        let id = self.create_song_node(container, song, signal);
        self.song_nodes.insert(song.id, id);
    }

    /// Apply changes that cannot move a song in the tree, such as play
    /// counts and ratings.
    pub fn songs_slightly_changed(&mut self, songs: &[Song]) {
        for song in songs {
            let Some(node) = self.song_nodes.get(&song.id).copied() else {
                continue;
            };
            if let Some(item) = self.nodes.get_mut(&node) {
                item.metadata = song.clone();
                self.observer.data_changed(node);
            }
        }
    }

    /// Remove songs, then every container left empty, then every divider
    /// no top-level container sorts under any more.
    pub fn songs_deleted(&mut self, songs: &[Song]) {
        let mut parents = BTreeSet::new();
        for song in songs {
            let Some(node) = self.song_nodes.remove(&song.id) else {
                continue;
            };
            if let Some(parent) = self.parent(node) {
                if parent != self.root {
                    parents.insert(parent);
                }
            }
            self.remove_node(node);
        }

        let mut divider_keys = BTreeSet::new();
        while !parents.is_empty() {
            for node in std::mem::take(&mut parents) {
                let Some(item) = self.nodes.get(&node) else {
                    continue;
                };
                if !item.children.is_empty() {
                    continue;
                }
                if let Some(parent) = item.parent {
                    if parent != self.root {
                        parents.insert(parent);
                    }
                }
                if item.container_level == 0 {
                    if let Some(key) = &item.divider_key {
                        divider_keys.insert(key.clone());
                    }
                }

                let cache_key = self.icon_cache_key(node);
                self.icon_cache.remove(&cache_key);
                self.pending_cache_keys.remove(&cache_key);
                self.pending_art.retain(|_, (pending, _)| *pending != node);

                self.remove_node(node);
            }
        }

        for key in divider_keys {
            let Some(divider) = self.divider_nodes.get(&key).copied() else {
                continue;
            };
            let in_use = self.children(self.root).iter().any(|child| {
                self.nodes.get(child).is_some_and(|item| {
                    item.container_level == 0 && item.divider_key.as_deref() == Some(key.as_str())
                })
            });
            if in_use {
                continue;
            }
            self.divider_nodes.remove(&key);
            self.remove_node(divider);
        }
    }

    /// Empty the tree. Views are told to drop everything they hold.
    pub fn reset(&mut self) {
        self.begin_reset();
        self.observer.end_reset();
    }

    fn begin_reset(&mut self) {
        self.observer.begin_reset();
        self.nodes.clear();
        self.song_nodes.clear();
        self.divider_nodes.clear();
        self.pending_art.clear();
        self.pending_cache_keys.clear();
        self.root = self.alloc(CollectionItem::new(ItemType::Root, None));
    }

    // ---- node construction ----

    fn alloc(&mut self, item: CollectionItem) -> NodeId {
        let id = self.next_node;
        self.next_node += 1;
        self.nodes.insert(id, item);
        id
    }

    fn append_child(&mut self, parent: NodeId, item: CollectionItem, signal: bool) -> NodeId {
        let row = self.row_count(parent);
        if signal {
            self.observer.begin_insert_rows(parent, row, row);
        }
        let id = self.alloc(item);
        if let Some(parent_item) = self.nodes.get_mut(&parent) {
            parent_item.children.push(id);
        }
        if signal {
            self.observer.end_insert_rows();
        }
        id
    }

    fn remove_node(&mut self, node: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        let Some(row) = self.row(node) else {
            return;
        };

        self.observer.begin_remove_rows(parent, row, row);
        if let Some(parent_item) = self.nodes.get_mut(&parent) {
            parent_item.children.remove(row);
            parent_item.child_containers.retain(|_, child| *child != node);
        }
        self.drop_subtree(node);
        self.observer.end_remove_rows();
    }

    fn drop_subtree(&mut self, node: NodeId) {
        if let Some(item) = self.nodes.remove(&node) {
            for child in item.children {
                self.drop_subtree(child);
            }
        }
    }

    /// Key prefix for a child of `parent`: the parent's key and a dash,
    /// or nothing at the top level.
    fn child_key_prefix(&self, parent: NodeId) -> String {
        match self.nodes.get(&parent) {
            Some(item) if parent != self.root && !item.key.is_empty() => format!("{}-", item.key),
            _ => String::new(),
        }
    }

    fn various_artists_node(&mut self, parent: NodeId, signal: bool) -> NodeId {
        let Some(parent_item) = self.nodes.get(&parent) else {
            return parent;
        };
        if let Some(existing) = parent_item.child_containers.get(VARIOUS_ARTISTS_KEY) {
            return *existing;
        }

        let mut item = CollectionItem::new(ItemType::Container, Some(parent));
        if parent != self.root {
            item.key.push_str(&parent_item.key);
        }
        item.key.push_str(VARIOUS_ARTISTS_TEXT);
        item.display_text = VARIOUS_ARTISTS_TEXT.to_string();
        item.sort_text = " various".to_string();
        item.container_level = parent_item.container_level + 1;

        let id = self.append_child(parent, item, signal);
        if let Some(parent_item) = self.nodes.get_mut(&parent) {
            parent_item
                .child_containers
                .insert(VARIOUS_ARTISTS_KEY.to_string(), id);
        }
        id
    }

    fn create_container(
        &mut self,
        parent: NodeId,
        level: usize,
        group_by: GroupBy,
        song: &Song,
        key: &str,
        signal: bool,
    ) -> NodeId {
        let text = container_text(group_by, song);
        let mut item = CollectionItem::new(ItemType::Container, Some(parent));
        item.key = key.to_string();
        item.display_text = text.display_text;
        item.sort_text = text.sort_text;
        item.metadata = text.metadata;
        item.container_level = level as i32;

        let divider = if level == 0 && self.show_dividers {
            divider_key(group_by, &item.sort_text, &item.metadata)
        } else {
            None
        };
        if let Some(divider) = &divider {
            item.sort_text = format!("{} {}", divider, item.sort_text);
            item.divider_key = Some(divider.clone());
        }

        let id = self.append_child(parent, item, signal);
        if let Some(parent_item) = self.nodes.get_mut(&parent) {
            parent_item.child_containers.insert(key.to_string(), id);
        }

        if let Some(divider) = divider {
            self.ensure_divider(group_by, divider, signal);
        }
        id
    }

    fn ensure_divider(&mut self, group_by: GroupBy, key: String, signal: bool) {
        if self.divider_nodes.contains_key(&key) {
            return;
        }
        let mut divider = CollectionItem::new(ItemType::Divider, Some(self.root));
        divider.display_text = divider_display_text(group_by, &key);
        divider.sort_text = format!("{}  ", key);
        divider.key = key.clone();

        let id = self.append_child(self.root, divider, signal);
        self.divider_nodes.insert(key, id);
    }

    fn create_song_node(&mut self, parent: NodeId, song: &Song, signal: bool) -> NodeId {
        let mut item = CollectionItem::new(ItemType::Song, Some(parent));
        item.key = format!(
            "{}{}",
            self.child_key_prefix(parent),
            text_or_unknown(&song.title)
        );
        item.display_text = song.title_with_compilation_artist();
        item.sort_text = sort_text_for_song(song);
        item.metadata = song.clone();
        self.append_child(parent, item, signal)
    }

    // ---- songs under nodes ----

    fn collect_songs(
        &self,
        node: NodeId,
        urls: &mut Vec<String>,
        songs: &mut SongList,
        seen: &mut HashSet<i64>,
    ) {
        let Some(item) = self.nodes.get(&node) else {
            return;
        };
        match item.item_type {
            ItemType::Container => {
                let mut children: Vec<(&str, NodeId)> = item
                    .children
                    .iter()
                    .filter_map(|child| {
                        self.nodes
                            .get(child)
                            .map(|item| (item.sort_text.as_str(), *child))
                    })
                    .collect();
                children.sort();
                for (_, child) in children {
                    self.collect_songs(child, urls, songs, seen);
                }
            }
            ItemType::Song => {
                urls.push(item.metadata.url.clone());
                if seen.insert(item.metadata.id) {
                    songs.push(item.metadata.clone());
                }
            }
            _ => {}
        }
    }

    /// Songs below `nodes` in sort order, each song once.
    pub fn child_songs(&self, nodes: &[NodeId]) -> SongList {
        let mut urls = Vec::new();
        let mut songs = SongList::new();
        let mut seen = HashSet::new();
        for node in nodes {
            self.collect_songs(*node, &mut urls, &mut songs, &mut seen);
        }
        songs
    }

    pub fn mime_data(&self, nodes: &[NodeId]) -> Option<SongMimeData> {
        if nodes.is_empty() {
            return None;
        }
        let mut data = SongMimeData::default();
        let mut seen = HashSet::new();
        for node in nodes {
            self.collect_songs(*node, &mut data.urls, &mut data.songs, &mut seen);
        }
        Some(data)
    }

    // ---- album covers ----

    /// Cache key of a node's icon: the source name followed by the display
    /// texts from the top level down to the node.
    pub fn icon_cache_key(&self, node: NodeId) -> String {
        let mut path = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.root {
                break;
            }
            let Some(item) = self.nodes.get(&id) else {
                break;
            };
            path.push(item.text().to_string());
            current = item.parent;
        }
        path.reverse();
        format!("{}/{}", self.backend.source().text(), path.join("/"))
    }

    fn album_icon(&mut self, node: NodeId) -> Decoration {
        let cache_key = self.icon_cache_key(node);
        match self.icon_cache.get(&cache_key) {
            Some(CachedIcon::Image(bytes)) => return Decoration::Cover(bytes),
            Some(CachedIcon::NoCover) => return Decoration::NoCover,
            None => {}
        }

        if self.pending_cache_keys.contains(&cache_key) {
            return Decoration::NoCover;
        }
        let Some(loader) = self.cover_loader.clone() else {
            return Decoration::NoCover;
        };
        let Some(song) = self.child_songs(&[node]).into_iter().next() else {
            return Decoration::NoCover;
        };

        self.next_art_request += 1;
        let request_id = self.next_art_request;
        self.pending_art.insert(request_id, (node, cache_key.clone()));
        self.pending_cache_keys.insert(cache_key);

        let request = CoverArtRequest::new(song.url.clone(), PRETTY_COVER_SIZE)
            .with_art(song.art_automatic.clone(), song.art_manual.clone());
        let tx = self.art_tx.clone();
        tokio::spawn(async move {
            let image = match loader.load_cover(request).await {
                Ok(image) => image,
                Err(e) => {
                    debug!(request_id, error = %e, "Album cover load failed");
                    None
                }
            };
            if tx.send(CoverArtResult { request_id, image }).is_err() {
                trace!(request_id, "Collection model dropped before cover arrived");
            }
        });

        Decoration::NoCover
    }

    /// Store a finished cover lookup and tell the view its node changed.
    /// Failures are cached as "no cover" so they are not retried.
    pub fn cover_loaded(&mut self, result: CoverArtResult) {
        let Some((node, cache_key)) = self.pending_art.remove(&result.request_id) else {
            return;
        };
        self.pending_cache_keys.remove(&cache_key);

        let icon = if result.success() {
            result.image.map_or(CachedIcon::NoCover, CachedIcon::Image)
        } else {
            CachedIcon::NoCover
        };
        self.icon_cache.insert(&cache_key, icon);

        if self.nodes.contains_key(&node) {
            self.observer.data_changed(node);
        }
    }

    /// Wait until every cover lookup started so far has been applied.
    pub async fn wait_for_covers(&mut self) {
        while !self.pending_art.is_empty() {
            match self.art_rx.recv().await {
                Some(result) => self.cover_loaded(result),
                None => break,
            }
        }
    }

    pub fn pending_cover_count(&self) -> usize {
        self.pending_art.len()
    }

    // ---- settings ----

    /// Apply icon cache limits and disk cache enablement. Turning the disk
    /// cache off also empties it.
    pub fn reload_settings(&mut self, settings: &CollectionSettings) {
        self.icon_cache
            .set_memory_limit(settings.memory_cache_bytes());
        if let Err(e) = self.icon_cache.set_disk_limit(settings.disk_cache_bytes()) {
            warn!(error = %e, "Unable to apply icon disk cache limit");
        }
        if let Err(e) = self.icon_cache.set_disk_enabled(settings.disk_cache_enable) {
            warn!(error = %e, "Unable to enable icon disk cache");
        }
        if !settings.disk_cache_enable {
            if let Err(e) = self.icon_cache.clear_disk_cache() {
                warn!(error = %e, "Unable to clear icon disk cache");
            }
        }
    }

    /// Toggle divider rows. A change reloads the tree.
    pub fn set_show_dividers(&mut self, show_dividers: bool) {
        if self.show_dividers != show_dividers {
            self.show_dividers = show_dividers;
            self.init();
        }
    }

    /// Toggle album covers in decorations. A change reloads the tree.
    pub fn set_pretty_covers(&mut self, pretty_covers: bool) {
        if self.pretty_covers != pretty_covers {
            self.pretty_covers = pretty_covers;
            self.init();
        }
    }

    /// Only show songs created within the last `max_age` seconds; `-1`
    /// shows everything. Reloads the tree.
    pub fn set_filter_age(&mut self, max_age: i64) {
        self.options.set_max_age(max_age);
        self.init();
    }

    pub fn set_filter_query_mode(&mut self, query_mode: QueryMode) {
        self.options.set_query_mode(query_mode);
        self.init();
    }

    /// Regroup the tree. Reloads it and announces the new grouping.
    pub fn set_group_by(&mut self, grouping: Grouping) {
        self.grouping = grouping;
        self.init();
        self.observer.grouping_changed(grouping);
    }

    /// Save the current grouping under `name`.
    pub async fn save_grouping(&self, name: &str) -> Result<()> {
        settings::save_grouping(self.settings_store.as_ref(), name, self.grouping).await
    }

    pub async fn saved_groupings(&self) -> Result<Vec<(String, Grouping)>> {
        settings::saved_groupings(self.settings_store.as_ref()).await
    }

    /// Switch to the grouping saved under `name`.
    pub async fn load_grouping(&mut self, name: &str) -> Result<()> {
        let grouping = self
            .saved_groupings()
            .await?
            .into_iter()
            .find(|(saved, _)| saved == name)
            .map(|(_, grouping)| grouping)
            .ok_or_else(|| CollectionError::NotFound {
                entity_type: "grouping".to_string(),
                id: name.to_string(),
            })?;
        self.set_group_by(grouping);
        Ok(())
    }
}
