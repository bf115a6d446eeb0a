/// Storage layout and access for chrome.storage.local
///
/// Four top-level keys are used:
/// - `tags`: tag path -> saved items
/// - `tagSettings`: tag path -> per-tag settings (including classification rules)
/// - `tagHierarchy`: tag path -> cached hierarchy node
/// - `globalSettings`: the single settings record
use crate::error::{Result, StoreError, TagError};
use crate::hierarchy::{self, Hierarchy};
use crate::rules::{RuleTable, default_rules};
use crate::settings::{GlobalSettings, TagSettings};
use crate::tab_data::SavedItem;
use crate::tag_ref::is_special;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

pub const TAGS_KEY: &str = "tags";
pub const TAG_SETTINGS_KEY: &str = "tagSettings";
pub const HIERARCHY_KEY: &str = "tagHierarchy";
pub const GLOBAL_SETTINGS_KEY: &str = "globalSettings";

/// A key-value store holding JSON values, e.g. chrome.storage.local.
///
/// Each call either completes or fails as a whole.
#[async_trait(?Send)]
pub trait KeyValueStore {
    /// Missing keys are simply absent from the returned map
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StoreError>;

    async fn set(&self, entries: Map<String, Value>) -> Result<(), StoreError>;
}

/// In-process store, used in tests and as a fallback outside the browser
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RefCell<Map<String, Value>>,
    fail_writes: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: Value) -> Self {
        let store = Self::default();
        store.data.borrow_mut().insert(key.to_string(), value);
        store
    }

    /// Make every subsequent write fail
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.set(failing);
    }

    pub fn raw(&self, key: &str) -> Option<Value> {
        self.data.borrow().get(key).cloned()
    }
}

#[async_trait(?Send)]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StoreError> {
        let data = self.data.borrow();
        Ok(keys
            .iter()
            .filter_map(|key| data.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, entries: Map<String, Value>) -> Result<(), StoreError> {
        if self.fail_writes.get() {
            return Err(StoreError::Write("memory store is read-only".to_string()));
        }
        self.data.borrow_mut().extend(entries);
        Ok(())
    }
}

/// Which top-level keys an operation writes back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    Tags,
    TagSettings,
    Hierarchy,
    GlobalSettings,
}

impl Part {
    pub const ALL: [Part; 4] = [Part::Tags, Part::TagSettings, Part::Hierarchy, Part::GlobalSettings];
}

/// Root storage structure: one in-memory snapshot of everything persisted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageData {
    pub tags: BTreeMap<String, Vec<SavedItem>>,
    pub tag_settings: BTreeMap<String, TagSettings>,
    pub hierarchy: Hierarchy,
    pub global_settings: GlobalSettings,
}

fn decode<T: DeserializeOwned + Default>(entries: &mut Map<String, Value>, key: &'static str) -> Result<T> {
    match entries.remove(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|source| TagError::Corrupt { key, source }),
    }
}

fn encode<T: Serialize>(value: &T, key: &'static str) -> Result<Value> {
    serde_json::to_value(value).map_err(|source| TagError::Serialize { key, source })
}

impl StorageData {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load<S: KeyValueStore + ?Sized>(store: &S) -> Result<StorageData> {
        let mut entries = store
            .get(&[TAGS_KEY, TAG_SETTINGS_KEY, HIERARCHY_KEY, GLOBAL_SETTINGS_KEY])
            .await?;

        Ok(StorageData {
            tags: decode(&mut entries, TAGS_KEY)?,
            tag_settings: decode(&mut entries, TAG_SETTINGS_KEY)?,
            hierarchy: decode(&mut entries, HIERARCHY_KEY)?,
            global_settings: decode(&mut entries, GLOBAL_SETTINGS_KEY)?,
        })
    }

    /// Write the given parts back in a single store call
    pub async fn persist<S: KeyValueStore + ?Sized>(&self, store: &S, parts: &[Part]) -> Result<()> {
        let mut entries = Map::new();

        for part in parts {
            let (key, value) = match part {
                Part::Tags => (TAGS_KEY, encode(&self.tags, TAGS_KEY)?),
                Part::TagSettings => (TAG_SETTINGS_KEY, encode(&self.tag_settings, TAG_SETTINGS_KEY)?),
                Part::Hierarchy => (HIERARCHY_KEY, encode(&self.hierarchy, HIERARCHY_KEY)?),
                Part::GlobalSettings => (GLOBAL_SETTINGS_KEY, encode(&self.global_settings, GLOBAL_SETTINGS_KEY)?),
            };
            entries.insert(key.to_string(), value);
        }

        store.set(entries).await?;
        Ok(())
    }

    /// Parts that differ from `before`
    pub fn changed_parts(&self, before: &StorageData) -> Vec<Part> {
        let mut parts = Vec::new();
        if self.tags != before.tags {
            parts.push(Part::Tags);
        }
        if self.tag_settings != before.tag_settings {
            parts.push(Part::TagSettings);
        }
        if self.hierarchy != before.hierarchy {
            parts.push(Part::Hierarchy);
        }
        if self.global_settings != before.global_settings {
            parts.push(Part::GlobalSettings);
        }
        parts
    }

    /// Did the set of tag keys change since `before`?
    pub fn structure_changed(&self, before: &StorageData) -> bool {
        !self.tags.keys().eq(before.tags.keys())
    }

    /// Tag keys outside the virtual namespace, alphabetically
    pub fn regular_paths(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str).filter(|tag| !is_special(tag))
    }

    pub fn has_regular_items(&self) -> bool {
        self.tags
            .iter()
            .any(|(tag, items)| !is_special(tag) && !items.is_empty())
    }

    pub fn items(&self, tag: &str) -> &[SavedItem] {
        self.tags.get(tag).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns true if the tag had to be created
    pub fn ensure_tag(&mut self, tag: &str) -> bool {
        if self.tags.contains_key(tag) {
            return false;
        }
        self.tags.insert(tag.to_string(), Vec::new());
        true
    }

    /// Recompute the hierarchy from the current tag keys
    pub fn rebuild_hierarchy(&mut self) {
        let rebuilt = hierarchy::rebuild(self.regular_paths(), &self.hierarchy);
        self.hierarchy = rebuilt;
    }

    /// Build the hierarchy if none has been cached yet; returns true if it did
    pub fn ensure_hierarchy(&mut self) -> bool {
        if !self.hierarchy.is_empty() || self.regular_paths().next().is_none() {
            return false;
        }
        self.rebuild_hierarchy();
        true
    }

    /// Remove the first item with this identity, scanning tags in order
    pub fn remove_by_identity(&mut self, url: &str, saved_at: &DateTime<Utc>) -> Option<String> {
        for (tag, items) in self.tags.iter_mut() {
            if let Some(index) = items.iter().position(|item| item.has_identity(url, saved_at)) {
                items.remove(index);
                return Some(tag.clone());
            }
        }
        None
    }

    /// Newest `savedAt` across every tag
    pub fn latest_saved_at(&self) -> Option<DateTime<Utc>> {
        self.tags.values().flatten().map(|item| item.saved_at).max()
    }

    /// Whether any tag carries its own classification rule
    pub fn has_stored_rules(&self) -> bool {
        self.tag_settings
            .values()
            .any(|settings| settings.classification_rules.is_some())
    }

    /// Rules carried by tag settings, or the built-in table if no tag has any
    pub fn rule_table(&self) -> RuleTable {
        if !self.has_stored_rules() {
            return default_rules();
        }

        self.tag_settings
            .iter()
            .filter_map(|(tag, settings)| {
                settings
                    .classification_rules
                    .as_ref()
                    .map(|rule| (tag.clone(), rule.clone()))
            })
            .collect()
    }

    /// Replace every tag's rules with `table`
    pub fn set_rule_table(&mut self, table: RuleTable) {
        for settings in self.tag_settings.values_mut() {
            settings.classification_rules = None;
        }
        for (tag, rule) in table {
            self.tag_settings.entry(tag).or_default().classification_rules = Some(rule.to_legacy());
        }
        self.tag_settings.retain(|_, settings| *settings != TagSettings::default());
    }

    /// Copy the built-in table into storage before the first per-tag rule edit
    pub fn materialize_rules(&mut self) -> bool {
        if self.has_stored_rules() {
            return false;
        }
        self.set_rule_table(default_rules());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ClassificationRule;
    use chrono::TimeZone;
    use futures::executor::block_on;
    use serde_json::json;

    fn create_test_item(url: &str, seconds: i64) -> SavedItem {
        SavedItem {
            url: url.to_string(),
            title: url.to_string(),
            fav_icon_url: String::new(),
            saved_at: Utc.timestamp_opt(seconds, 0).unwrap(),
            classified_as: None,
        }
    }

    #[test]
    fn test_load_empty_store_uses_defaults() {
        let store = MemoryStore::new();
        let data = block_on(StorageData::load(&store)).unwrap();

        assert!(data.tags.is_empty());
        assert!(data.hierarchy.is_empty());
        assert_eq!(data.global_settings, GlobalSettings::default());
    }

    #[test]
    fn test_load_stored_shape() {
        let store = MemoryStore::with_value(
            TAGS_KEY,
            json!({
                "Development": [{
                    "url": "https://github.com/user/repo",
                    "title": "My GitHub Repository",
                    "favIconUrl": "",
                    "savedAt": "2024-10-28T10:30:00.000Z"
                }],
                "Other": []
            }),
        );

        let data = block_on(StorageData::load(&store)).unwrap();

        assert_eq!(data.items("Development").len(), 1);
        assert!(data.items("Other").is_empty());
        assert!(data.items("Missing").is_empty());
    }

    #[test]
    fn test_load_corrupt_value() {
        let store = MemoryStore::with_value(TAGS_KEY, json!({ "Development": "not a list" }));
        let result = block_on(StorageData::load(&store));

        assert!(matches!(result, Err(TagError::Corrupt { key: TAGS_KEY, .. })));
    }

    #[test]
    fn test_persist_round_trip() {
        let store = MemoryStore::new();
        let mut data = StorageData::new();
        data.ensure_tag("Work");
        data.tags.get_mut("Work").unwrap().push(create_test_item("https://a.com", 1));
        data.rebuild_hierarchy();

        block_on(data.persist(&store, &Part::ALL)).unwrap();
        let loaded = block_on(StorageData::load(&store)).unwrap();

        assert_eq!(loaded, data);
    }

    #[test]
    fn test_persist_only_requested_parts() {
        let store = MemoryStore::new();
        let mut data = StorageData::new();
        data.ensure_tag("Work");

        block_on(data.persist(&store, &[Part::Tags])).unwrap();

        assert!(store.raw(TAGS_KEY).is_some());
        assert!(store.raw(HIERARCHY_KEY).is_none());
    }

    #[test]
    fn test_persist_failure_propagates() {
        let store = MemoryStore::new();
        store.set_failing(true);

        let result = block_on(StorageData::new().persist(&store, &Part::ALL));

        assert!(matches!(result, Err(TagError::Storage(StoreError::Write(_)))));
    }

    #[test]
    fn test_changed_parts() {
        let before = StorageData::new();
        let mut after = before.clone();
        assert!(after.changed_parts(&before).is_empty());

        after.ensure_tag("Work");
        after.global_settings.enable_classification = false;

        assert_eq!(after.changed_parts(&before), vec![Part::Tags, Part::GlobalSettings]);
        assert!(after.structure_changed(&before));
    }

    #[test]
    fn test_item_changes_are_not_structural() {
        let mut before = StorageData::new();
        before.ensure_tag("Work");
        let mut after = before.clone();
        after.tags.get_mut("Work").unwrap().push(create_test_item("https://a.com", 1));

        assert_eq!(after.changed_parts(&before), vec![Part::Tags]);
        assert!(!after.structure_changed(&before));
    }

    #[test]
    fn test_ensure_tag() {
        let mut data = StorageData::new();

        assert!(data.ensure_tag("Work"));
        assert!(!data.ensure_tag("Work"));
        assert_eq!(data.tags.len(), 1);
    }

    #[test]
    fn test_ensure_hierarchy_is_lazy() {
        let mut data = StorageData::new();
        assert!(!data.ensure_hierarchy());

        data.ensure_tag("Work");
        data.ensure_tag("Work/Email");
        assert!(data.ensure_hierarchy());
        assert!(!data.ensure_hierarchy());
        assert_eq!(data.hierarchy["Work"].children, vec!["Work/Email"]);
    }

    #[test]
    fn test_remove_by_identity() {
        let mut data = StorageData::new();
        data.tags.insert("A".to_string(), vec![create_test_item("https://x.com", 1)]);
        data.tags.insert("B".to_string(), vec![create_test_item("https://x.com", 2)]);

        let removed = data.remove_by_identity("https://x.com", &Utc.timestamp_opt(2, 0).unwrap());

        assert_eq!(removed.as_deref(), Some("B"));
        assert_eq!(data.items("A").len(), 1);
        assert!(data.items("B").is_empty());
        assert_eq!(data.remove_by_identity("https://x.com", &Utc.timestamp_opt(3, 0).unwrap()), None);
    }

    #[test]
    fn test_rule_table_defaults_until_customized() {
        let mut data = StorageData::new();
        assert_eq!(data.rule_table(), default_rules());

        let mut table = RuleTable::new();
        table.insert("Design".to_string(), ClassificationRule::legacy(&["*figma.com/*"], &[]));
        data.set_rule_table(table.clone());

        assert_eq!(data.rule_table(), table);
    }

    #[test]
    fn test_materialize_rules_copies_defaults_once() {
        let mut data = StorageData::new();

        assert!(data.materialize_rules());
        assert!(data.has_stored_rules());
        assert_eq!(data.rule_table(), default_rules());
        assert!(!data.materialize_rules());
    }

    #[test]
    fn test_latest_saved_at() {
        let mut data = StorageData::new();
        assert_eq!(data.latest_saved_at(), None);

        data.tags.insert("A".to_string(), vec![create_test_item("https://a.com", 5)]);
        data.tags.insert("B".to_string(), vec![create_test_item("https://b.com", 9)]);

        assert_eq!(data.latest_saved_at(), Some(Utc.timestamp_opt(9, 0).unwrap()));
    }

    #[test]
    fn test_set_rule_table_keeps_other_settings() {
        let mut data = StorageData::new();
        data.tag_settings.insert(
            "Work".to_string(),
            TagSettings {
                color: Some("#f44336".to_string()),
                classification_rules: Some(ClassificationRule::legacy(&["*jira*"], &[])),
                ..TagSettings::default()
            },
        );

        data.set_rule_table(RuleTable::new());

        assert_eq!(data.tag_settings["Work"].color.as_deref(), Some("#f44336"));
        assert!(data.tag_settings["Work"].classification_rules.is_none());
    }
}
