//! Nodes of the collection tree.

use crate::song::Song;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Handle of a node inside one [`CollectionModel`](super::CollectionModel).
///
/// Handles are never reused within a model, so a stale handle simply stops
/// resolving once its node is gone.
pub type NodeId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Root,
    Divider,
    Container,
    Song,
    LoadingIndicator,
}

/// Child-lookup key of the "Various artists" node under a container.
pub(crate) const VARIOUS_ARTISTS_KEY: &str = "\0VARIOUS";

#[derive(Debug, Clone)]
pub struct CollectionItem {
    pub item_type: ItemType,
    /// Accumulated key: container fragments joined by `-` from the top level
    pub key: String,
    pub display_text: String,
    pub sort_text: String,
    /// Depth of a container, `0` for top-level containers and `-1` for
    /// everything else
    pub container_level: i32,
    /// The song of a leaf, or the grouped fields of a container
    pub metadata: Song,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// Containers below this node by key
    pub(crate) child_containers: HashMap<String, NodeId>,
    /// Divider a top-level container sorts under
    pub(crate) divider_key: Option<String>,
}

impl CollectionItem {
    pub(crate) fn new(item_type: ItemType, parent: Option<NodeId>) -> Self {
        Self {
            item_type,
            key: String::new(),
            display_text: String::new(),
            sort_text: String::new(),
            container_level: -1,
            metadata: Song::default(),
            parent,
            children: Vec::new(),
            child_containers: HashMap::new(),
            divider_key: None,
        }
    }

    /// Display text, falling back to the sort text.
    pub fn text(&self) -> &str {
        if self.display_text.is_empty() {
            &self.sort_text
        } else {
            &self.display_text
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_container(&self) -> bool {
        self.item_type == ItemType::Container
    }

    pub fn is_song(&self) -> bool {
        self.item_type == ItemType::Song
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_falls_back_to_sort_text() {
        let mut item = CollectionItem::new(ItemType::Divider, Some(0));
        item.sort_text = "q  ".to_string();
        assert_eq!(item.text(), "q  ");
        item.display_text = "Q".to_string();
        assert_eq!(item.text(), "Q");
        assert_eq!(item.container_level, -1);
    }
}
