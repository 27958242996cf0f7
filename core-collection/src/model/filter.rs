//! Free-text and `tag:value` filtering of the collection tree.

use super::item::{CollectionItem, ItemType, NodeId};
use super::CollectionModel;
use crate::song::Song;
use std::collections::BTreeMap;

/// A parsed filter string.
///
/// `artist:queen bohemian` keeps nodes whose text contains "bohemian" and
/// that are, or belong to, something by an artist containing "queen".
/// Tokens with a colon that do not name a song column lose their colons
/// and count as plain text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionFilter {
    text: String,
    tags: BTreeMap<String, String>,
}

fn is_song_column(name: &str) -> bool {
    Song::COLUMNS
        .iter()
        .any(|column| column.eq_ignore_ascii_case(name))
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl CollectionFilter {
    pub fn new(filter: &str) -> Self {
        let mut words: Vec<String> = Vec::new();
        let mut tags = BTreeMap::new();

        for token in filter.split_whitespace() {
            match token.split_once(':') {
                Some((tag, value)) if is_song_column(tag) => {
                    let tag = tag.trim().to_lowercase();
                    let value = value.replace(':', "").trim().to_string();
                    if !tag.is_empty() && !value.is_empty() {
                        tags.insert(tag, value);
                    }
                }
                Some(_) => {
                    let word = token.replace(':', "");
                    if !word.is_empty() {
                        words.push(word);
                    }
                }
                None => words.push(token.to_string()),
            }
        }

        Self {
            text: words.join(" "),
            tags,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.tags.is_empty()
    }

    /// Whether `node` stays visible: it, an ancestor or a descendant matches.
    pub fn accepts(&self, model: &CollectionModel, node: NodeId) -> bool {
        let Some(item) = model.item(node) else {
            return false;
        };
        if item.item_type == ItemType::LoadingIndicator || self.is_empty() {
            return true;
        }

        if self.item_matches(model, item) {
            return true;
        }

        let mut parent = item.parent();
        while let Some(id) = parent {
            let Some(ancestor) = model.item(id) else {
                break;
            };
            if self.item_matches(model, ancestor) {
                return true;
            }
            parent = ancestor.parent();
        }

        self.descendant_matches(model, item)
    }

    fn descendant_matches(&self, model: &CollectionModel, item: &CollectionItem) -> bool {
        item.children()
            .iter()
            .filter_map(|child| model.item(*child))
            .any(|child| self.item_matches(model, child) || self.descendant_matches(model, child))
    }

    fn item_matches(&self, model: &CollectionModel, item: &CollectionItem) -> bool {
        if !self.text.is_empty() && !contains_ignore_case(item.text(), &self.text) {
            return false;
        }

        self.tags.is_empty()
            || (item.is_song() && self.song_tags_match(&item.metadata))
            || (item.is_container() && self.container_tags_match(model, item))
    }

    fn song_tags_match(&self, song: &Song) -> bool {
        self.tags.iter().any(|(tag, value)| match tag.as_str() {
            "albumartist" => contains_ignore_case(song.effective_albumartist(), value),
            "artist" => contains_ignore_case(&song.artist, value),
            "album" => contains_ignore_case(&song.album, value),
            "title" => contains_ignore_case(&song.title, value),
            _ => false,
        })
    }

    fn container_tags_match(&self, model: &CollectionModel, item: &CollectionItem) -> bool {
        let Ok(level) = usize::try_from(item.container_level) else {
            return false;
        };
        if level > 2 {
            return false;
        }
        model.grouping()[level]
            .filter_tag()
            .and_then(|tag| self.tags.get(tag))
            .is_some_and(|value| contains_ignore_case(item.text(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags_and_text() {
        let filter = CollectionFilter::new("  Artist:Queen  bohemian   rhap:sody  album:  ");
        assert_eq!(filter.text(), "bohemian rhapsody");
        assert_eq!(filter.tags().get("artist").map(String::as_str), Some("Queen"));
        assert!(!filter.tags().contains_key("album"));
    }

    #[test]
    fn test_value_colons_are_dropped() {
        let filter = CollectionFilter::new("title:a:b");
        assert_eq!(filter.tags().get("title").map(String::as_str), Some("ab"));
        assert!(filter.text().is_empty());
    }

    #[test]
    fn test_empty_filter() {
        assert!(CollectionFilter::new("   ").is_empty());
        assert!(!CollectionFilter::new("x").is_empty());
    }
}
