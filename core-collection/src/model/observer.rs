//! Change notifications for views attached to a collection tree.

use super::grouping::Grouping;
use super::item::NodeId;

/// Receives structural and data changes of a
/// [`CollectionModel`](super::CollectionModel).
///
/// Inserts and removals are bracketed by `begin_*`/`end_*` calls naming the
/// parent and the inclusive row range, like an item-model view expects.
/// Every method has a no-op default.
pub trait TreeObserver: Send + Sync {
    fn begin_insert_rows(&self, _parent: NodeId, _first: usize, _last: usize) {}
    fn end_insert_rows(&self) {}
    fn begin_remove_rows(&self, _parent: NodeId, _first: usize, _last: usize) {}
    fn end_remove_rows(&self) {}
    fn begin_reset(&self) {}
    fn end_reset(&self) {}
    fn data_changed(&self, _node: NodeId) {}
    fn grouping_changed(&self, _grouping: Grouping) {}
    fn total_song_count_updated(&self, _count: i64) {}
    fn total_artist_count_updated(&self, _count: i64) {}
    fn total_album_count_updated(&self, _count: i64) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TreeObserver for NoopObserver {}
