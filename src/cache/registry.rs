//! Bidirectional tag registry.
//!
//! Tracks tag → entry keys and entry key → tags so that purging a tag
//! finds every affected entry, and dropping an entry cleans up its tags.
//! The registry has no lock of its own; the store keeps it next to the
//! entries under one write section.

use std::collections::{HashMap, HashSet};

use super::entry::EntryKey;

#[derive(Debug, Default)]
pub struct TagRegistry {
    tag_to_keys: HashMap<String, HashSet<EntryKey>>,
    key_to_tags: HashMap<EntryKey, HashSet<String>>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `key` with `tags`, replacing any previous association.
    pub fn register<I>(&mut self, key: EntryKey, tags: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.unregister(&key);

        let tags: HashSet<String> = tags.into_iter().collect();
        if tags.is_empty() {
            return;
        }

        for tag in &tags {
            self.tag_to_keys
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
        self.key_to_tags.insert(key, tags);
    }

    /// Forget `key` and drop tags left with no entries.
    pub fn unregister(&mut self, key: &EntryKey) {
        let Some(tags) = self.key_to_tags.remove(key) else {
            return;
        };

        for tag in tags {
            if let Some(keys) = self.tag_to_keys.get_mut(&tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_to_keys.remove(&tag);
                }
            }
        }
    }

    /// Remove `tag` and every key carrying it, returning those keys.
    pub fn take_tag(&mut self, tag: &str) -> HashSet<EntryKey> {
        let keys = self.tag_to_keys.remove(tag).unwrap_or_default();
        for key in &keys {
            self.unregister(key);
        }
        keys
    }

    pub fn keys_for_tag(&self, tag: &str) -> HashSet<EntryKey> {
        self.tag_to_keys.get(tag).cloned().unwrap_or_default()
    }

    pub fn tags_for_key(&self, key: &EntryKey) -> HashSet<String> {
        self.key_to_tags.get(key).cloned().unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.tag_to_keys.clear();
        self.key_to_tags.clear();
    }

    pub fn tag_count(&self) -> usize {
        self.tag_to_keys.len()
    }

    pub fn key_count(&self) -> usize {
        self.key_to_tags.len()
    }
}
