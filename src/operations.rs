/// Tag operations: listing, aggregation, structural changes, classification and sync
///
/// Every operation loads one snapshot of the store, transforms it in memory
/// and writes back only the parts that changed. Mutations on one manager are
/// serialized through a single writer lock, and the hierarchy is rebuilt
/// whenever the set of tag keys changes.
use crate::classifier::{self, ClassificationMatch};
use crate::error::{Result, TagError};
use crate::hierarchy::{self, is_child_of, join, reparent, tag_name_of};
use crate::host::{TabHost, TabScope};
use crate::rules::{ClassificationRule, RuleTable, default_rules};
use crate::settings::{self, GlobalSettings, RestoreMode, TagSettings};
use crate::storage::{KeyValueStore, StorageData};
use crate::tab_data::{SavedItem, TabInfo, TaggedItem, sort_newest_first};
use crate::tag_ref::{ALL_TAG, OTHER_TAG, OTHER_VIEW_TAG, TagRef, is_special};
use chrono::{DateTime, Duration, Utc};
use futures::lock::Mutex;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of saving a batch of tabs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub saved: usize,
    /// Tabs that were saved and may now be closed
    pub close_ids: Vec<i32>,
}

pub struct TagManager<S> {
    store: S,
    writer: Mutex<()>,
}

fn validate_segment(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TagError::InvalidName(name.to_string(), "name cannot be empty"));
    }
    if name.contains(hierarchy::SEPARATOR) {
        return Err(TagError::InvalidName(name.to_string(), "name cannot contain '/'"));
    }
    if is_special(name) {
        return Err(TagError::InvalidName(name.to_string(), "name uses a reserved marker"));
    }
    Ok(name)
}

fn validate_path(path: &str) -> Result<&str> {
    let path = path.trim();
    if path.is_empty() {
        return Err(TagError::InvalidName(path.to_string(), "name cannot be empty"));
    }
    if is_special(path) {
        return Err(TagError::InvalidName(path.to_string(), "name uses a reserved marker"));
    }
    if path.split(hierarchy::SEPARATOR).any(|segment| segment.trim().is_empty()) {
        return Err(TagError::InvalidName(path.to_string(), "path segments cannot be empty"));
    }
    Ok(path)
}

/// Map the `📂 Other` view onto its storage key
fn storage_key(tag: &str) -> &str {
    if tag == OTHER_VIEW_TAG { OTHER_TAG } else { tag }
}

impl<S: KeyValueStore> TagManager<S> {
    pub fn new(store: S) -> Self {
        TagManager {
            store,
            writer: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read-only view of the current store contents
    pub async fn snapshot(&self) -> Result<StorageData> {
        StorageData::load(&self.store).await
    }

    /// Load, apply `transform`, and persist whatever changed
    async fn transact<T>(
        &self,
        operation: &str,
        transform: impl FnOnce(&mut StorageData) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.writer.lock().await;

        let mut data = StorageData::load(&self.store).await?;
        let before = data.clone();

        let value = transform(&mut data)?;

        if data.structure_changed(&before) {
            data.rebuild_hierarchy();
        } else {
            data.ensure_hierarchy();
        }

        let parts = data.changed_parts(&before);
        if !parts.is_empty() {
            debug!("{}: writing {:?}", operation, parts);
            data.persist(&self.store, &parts).await?;
        }

        Ok(value)
    }

    // Listing and retrieval

    /// Special tags first, then the hierarchy depth first
    pub async fn get_tags(&self) -> Result<Vec<TagRef>> {
        self.transact("get_tags", |data| {
            data.ensure_hierarchy();

            let mut listing = special_tags(data)
                .into_iter()
                .map(TagRef::special)
                .collect::<Vec<_>>();
            listing.extend(hierarchy::ordered_listing(data.regular_paths(), &data.hierarchy));
            Ok(listing)
        })
        .await
    }

    /// Special tags first, then every regular tag alphabetically
    pub async fn get_flat_tags(&self) -> Result<Vec<String>> {
        let data = self.snapshot().await?;

        let mut tags: Vec<String> = special_tags(&data).into_iter().map(str::to_string).collect();
        tags.extend(data.regular_paths().map(str::to_string));
        Ok(tags)
    }

    /// Items shown for a tag, newest first.
    ///
    /// A regular tag includes every descendant's items, collapsed or not.
    pub async fn get_tag_data(&self, tag: &str) -> Result<Vec<TaggedItem>> {
        self.transact("get_tag_data", |data| {
            data.ensure_hierarchy();
            Ok(aggregate(data, tag))
        })
        .await
    }

    // Structural changes

    pub async fn create_tag(&self, name: &str) -> Result<String> {
        let path = validate_path(name)?.to_string();

        self.transact("create_tag", |data| {
            if !data.ensure_tag(&path) {
                return Err(TagError::AlreadyExists(path));
            }
            info!("Created tag {:?}", path);
            Ok(path)
        })
        .await
    }

    pub async fn create_sub_tag(&self, parent: &str, name: &str) -> Result<String> {
        let parent = validate_path(parent)?;
        let path = join(parent, validate_segment(name)?);

        self.transact("create_sub_tag", |data| {
            if !data.ensure_tag(&path) {
                return Err(TagError::AlreadyExists(path));
            }
            info!("Created sub-tag {:?}", path);
            Ok(path)
        })
        .await
    }

    /// Move `from` and its whole subtree under `to_parent` (or to the root)
    pub async fn move_tag(&self, from: &str, to_parent: Option<&str>) -> Result<String> {
        if is_special(from) {
            return Err(TagError::VirtualTag(from.to_string()));
        }
        let to_parent = to_parent.map(str::trim).filter(|p| !p.is_empty());
        if let Some(destination) = to_parent {
            if destination == from || is_child_of(destination, from) {
                return Err(TagError::MoveIntoSubtree {
                    source_path: from.to_string(),
                    destination: destination.to_string(),
                });
            }
            if is_special(destination) {
                return Err(TagError::VirtualTag(destination.to_string()));
            }
        }

        let name = tag_name_of(from);
        let new_path = match to_parent {
            Some(parent) => join(parent, name),
            None => name.to_string(),
        };

        self.transact("move_tag", |data| {
            if !data.tags.contains_key(from) {
                return Err(TagError::NotFound(from.to_string()));
            }

            let renames: Vec<(String, String)> = data
                .tags
                .keys()
                .filter_map(|path| reparent(path, from, &new_path).map(|moved| (path.clone(), moved)))
                .collect();

            if let Some((_, taken)) = renames.iter().find(|(_, moved)| data.tags.contains_key(moved)) {
                return Err(TagError::AlreadyExists(taken.clone()));
            }

            let moved: Vec<(String, Vec<SavedItem>, Option<TagSettings>, Option<hierarchy::HierarchyNode>)> = renames
                .into_iter()
                .map(|(old, new)| {
                    let items = data.tags.remove(&old).unwrap_or_default();
                    let settings = data.tag_settings.remove(&old);
                    let node = data.hierarchy.remove(&old);
                    (new, items, settings, node)
                })
                .collect();

            for (new, items, settings, node) in moved {
                if let Some(settings) = settings {
                    data.tag_settings.insert(new.clone(), settings);
                }
                if let Some(node) = node {
                    // Only `collapsed` survives the rebuild that follows
                    data.hierarchy.insert(new.clone(), node);
                }
                data.tags.insert(new, items);
            }

            info!("Moved tag {:?} to {:?}", from, new_path);
            Ok(new_path.clone())
        })
        .await
    }

    /// Remove a tag key and its classification rule. Descendant tags are kept.
    ///
    /// `📂 Other` empties the Other bucket; `📁 All` cannot be deleted.
    pub async fn delete_tag(&self, tag: &str) -> Result<()> {
        if tag == ALL_TAG {
            return Err(TagError::VirtualTag(tag.to_string()));
        }

        self.transact("delete_tag", |data| {
            if tag == OTHER_VIEW_TAG {
                if let Some(items) = data.tags.get_mut(OTHER_TAG) {
                    items.clear();
                }
            } else {
                if data.tags.remove(tag).is_some() {
                    info!("Deleted tag {:?}", tag);
                }
                let mut table = data.rule_table();
                if table.remove(tag).is_some() {
                    debug!("Dropped classification rule for {:?}", tag);
                    data.set_rule_table(table);
                }
            }
            Ok(())
        })
        .await
    }

    /// Flip the collapsed flag; unknown tags report `false`
    pub async fn toggle_collapse(&self, path: &str) -> Result<bool> {
        self.transact("toggle_collapse", |data| {
            data.ensure_hierarchy();
            Ok(match data.hierarchy.get_mut(path) {
                Some(node) => {
                    node.collapsed = !node.collapsed;
                    node.collapsed
                }
                None => false,
            })
        })
        .await
    }

    // Item changes

    /// Remove the item at `index` in a tag; out-of-range or unknown tags are ignored
    pub async fn delete_item(&self, tag: &str, index: usize) -> Result<()> {
        if tag == ALL_TAG {
            warn!("Ignoring delete by index from the virtual {:?} tag", ALL_TAG);
            return Ok(());
        }

        self.transact("delete_item", |data| {
            if let Some(items) = data.tags.get_mut(storage_key(tag)) {
                if index < items.len() {
                    items.remove(index);
                }
            }
            Ok(())
        })
        .await
    }

    /// Remove the first item with this identity from whichever tag holds it
    pub async fn delete_item_by_id(&self, url: &str, saved_at: &DateTime<Utc>) -> Result<bool> {
        self.transact("delete_item_by_id", |data| {
            Ok(match data.remove_by_identity(url, saved_at) {
                Some(tag) => {
                    info!("Deleted item {:?} from tag {:?}", url, tag);
                    true
                }
                None => false,
            })
        })
        .await
    }

    /// Save tabs under `tag`, or under each tab's suggested tag when
    /// classification is requested and enabled.
    pub async fn save_tabs(&self, tag: &str, tabs: &[TabInfo], use_classification: bool) -> Result<SaveOutcome> {
        let tag = storage_key(tag);
        if is_special(tag) {
            return Err(TagError::VirtualTag(tag.to_string()));
        }
        self.transact("save_tabs", |data| {
            // Start past the newest stored item so identities never repeat
            let clock = Utc::now();
            let now = match data.latest_saved_at() {
                Some(latest) if latest >= clock => latest + Duration::nanoseconds(1),
                _ => clock,
            };
            data.ensure_tag(tag);

            let rules = (use_classification && data.global_settings.enable_classification)
                .then(|| data.rule_table());

            let mut outcome = SaveOutcome {
                saved: 0,
                close_ids: Vec::new(),
            };

            for (index, tab) in tabs.iter().filter(|t| t.is_saveable()).enumerate() {
                // Distinct timestamps keep (url, savedAt) unique within a batch
                let saved_at = now + Duration::nanoseconds(index as i64);
                let mut item = SavedItem::from_tab(tab, saved_at);

                let target = match &rules {
                    Some(rules) => {
                        let suggested = classifier::suggest_tag(rules, &item);
                        item.classified_as = Some(suggested.clone());
                        suggested
                    }
                    None => tag.to_string(),
                };

                data.ensure_tag(&target);
                if let Some(items) = data.tags.get_mut(&target) {
                    items.push(item);
                }
                outcome.saved += 1;
                outcome.close_ids.push(tab.id);
            }

            info!("Saved {} tabs", outcome.saved);
            Ok(outcome)
        })
        .await
    }

    /// Query the host for tabs, save them, then close them
    pub async fn save_and_close<H: TabHost + ?Sized>(
        &self,
        host: &H,
        tag: &str,
        scope: TabScope,
        use_classification: bool,
    ) -> Result<SaveOutcome> {
        let tabs = host.query_tabs(scope).await?;
        let outcome = self.save_tabs(tag, &tabs, use_classification).await?;

        if !outcome.close_ids.is_empty() {
            host.open_new_tab_page().await?;
            host.close_tabs(&outcome.close_ids).await?;
        }
        Ok(outcome)
    }

    pub async fn restore_item<H: TabHost + ?Sized>(&self, host: &H, item: &SavedItem) -> Result<()> {
        host.open_tab(&item.url).await
    }

    /// Reopen every item shown for `tag`, then clear what the restore mode says to clear
    pub async fn restore_all<H: TabHost + ?Sized>(&self, host: &H, tag: &str) -> Result<usize> {
        let items = self.get_tag_data(tag).await?;
        for tagged in &items {
            host.open_tab(&tagged.item.url).await?;
        }

        if tag == ALL_TAG {
            return Ok(items.len());
        }

        self.transact("restore_all", |data| {
            if tag == OTHER_VIEW_TAG {
                if let Some(other) = data.tags.get_mut(OTHER_TAG) {
                    other.clear();
                }
                return Ok(());
            }

            let mode = data
                .tag_settings
                .get(tag)
                .cloned()
                .unwrap_or_default()
                .restore_mode(&data.global_settings);

            if mode == RestoreMode::Close {
                for tagged in &items {
                    data.remove_by_identity(&tagged.item.url, &tagged.item.saved_at);
                }
            }
            Ok(())
        })
        .await?;

        Ok(items.len())
    }

    // Classification rules

    pub async fn get_classification_rules(&self) -> Result<RuleTable> {
        Ok(self.snapshot().await?.rule_table())
    }

    pub async fn get_rule(&self, tag: &str) -> Result<Option<ClassificationRule>> {
        Ok(self.get_classification_rules().await?.remove(tag))
    }

    /// Readable summary of a tag's rule, if it has one
    pub async fn describe_rule(&self, tag: &str) -> Result<Option<String>> {
        Ok(self.get_rule(tag).await?.map(|rule| rule.describe()))
    }

    pub async fn set_classification_rules(&self, table: RuleTable) -> Result<()> {
        self.transact("set_classification_rules", |data| {
            data.set_rule_table(table);
            Ok(())
        })
        .await
    }

    pub async fn reset_classification_rules(&self) -> Result<RuleTable> {
        self.transact("reset_classification_rules", |data| {
            data.set_rule_table(default_rules());
            Ok(data.rule_table())
        })
        .await
    }

    /// Append URL patterns and title keywords to a tag's rule
    pub async fn add_custom_rule(
        &self,
        tag: &str,
        url_patterns: &[String],
        title_keywords: &[String],
    ) -> Result<RuleTable> {
        self.transact("add_custom_rule", |data| {
            let mut table = data.rule_table();
            let rule = table.entry(tag.to_string()).or_default();
            rule.url_patterns.extend_from_slice(url_patterns);
            rule.title_keywords.extend_from_slice(title_keywords);
            data.set_rule_table(table);
            Ok(data.rule_table())
        })
        .await
    }

    pub async fn remove_rule(&self, tag: &str) -> Result<RuleTable> {
        self.transact("remove_rule", |data| {
            let mut table = data.rule_table();
            table.remove(tag);
            data.set_rule_table(table);
            Ok(data.rule_table())
        })
        .await
    }

    pub async fn classify(&self, item: &SavedItem) -> Result<Vec<ClassificationMatch>> {
        let rules = self.get_classification_rules().await?;
        Ok(classifier::classify(&rules, item))
    }

    pub async fn suggest_tag(&self, item: &SavedItem) -> Result<String> {
        let rules = self.get_classification_rules().await?;
        Ok(classifier::suggest_tag(&rules, item))
    }

    /// Pull every item matching `target`'s rules out of the other tags and
    /// into `target`. Returns how many items were added; items already in
    /// `target` are not duplicated.
    pub async fn sync_tag_conditions(&self, target: &str) -> Result<usize> {
        if is_special(target) {
            return Err(TagError::VirtualTag(target.to_string()));
        }

        self.transact("sync_tag_conditions", |data| {
            let Some(rule) = data
                .tag_settings
                .get(target)
                .and_then(|settings| settings.classification_rules.clone())
            else {
                debug!("Tag {:?} has no rules to sync", target);
                return Ok(0);
            };

            let sources: Vec<String> = data
                .regular_paths()
                .filter(|source| *source != target)
                .map(str::to_string)
                .collect();

            let mut imported = 0;
            for source in sources {
                let items = data.tags.remove(&source).unwrap_or_default();
                let (matching, kept): (Vec<SavedItem>, Vec<SavedItem>) =
                    items.into_iter().partition(|item| rule.matches(item));
                data.tags.insert(source, kept);

                if matching.is_empty() {
                    continue;
                }

                data.ensure_tag(target);
                if let Some(bucket) = data.tags.get_mut(target) {
                    for item in matching {
                        if !bucket.iter().any(|existing| existing.same_identity(&item)) {
                            bucket.push(item);
                            imported += 1;
                        }
                    }
                }
            }

            info!("Synced {} items into {:?}", imported, target);
            Ok(imported)
        })
        .await
    }

    // Settings

    pub async fn get_tag_settings(&self, tag: &str) -> Result<TagSettings> {
        let data = self.snapshot().await?;
        Ok(data.tag_settings.get(tag).cloned().unwrap_or_default())
    }

    /// Merge `patch` (a partial settings object) into the tag's settings
    pub async fn set_tag_settings(&self, tag: &str, patch: Value) -> Result<TagSettings> {
        self.transact("set_tag_settings", |data| {
            if patch.get("classificationRules").is_some() && data.materialize_rules() {
                debug!("Stored the default rules before editing {:?}", tag);
            }

            let current = data.tag_settings.get(tag).cloned().unwrap_or_default();
            let mut merged: TagSettings = settings::merge(&current, patch)
                .map_err(TagError::InvalidSettings)?;
            merged.classification_rules = merged.classification_rules.map(|rule| rule.to_legacy());
            data.tag_settings.insert(tag.to_string(), merged.clone());
            Ok(merged)
        })
        .await
    }

    pub async fn get_global_settings(&self) -> Result<GlobalSettings> {
        Ok(self.snapshot().await?.global_settings)
    }

    pub async fn set_global_settings(&self, patch: Value) -> Result<GlobalSettings> {
        self.transact("set_global_settings", |data| {
            let merged = settings::merge(&data.global_settings, patch)
                .map_err(TagError::InvalidSettings)?;
            data.global_settings = merged.clone();
            Ok(merged)
        })
        .await
    }
}

/// `📁 All` when any regular tag has items, then `📂 Other` when Other has items
fn special_tags(data: &StorageData) -> Vec<&'static str> {
    let mut special = Vec::new();
    if data.has_regular_items() {
        special.push(ALL_TAG);
    }
    if !data.items(OTHER_TAG).is_empty() {
        special.push(OTHER_VIEW_TAG);
    }
    special
}

fn aggregate(data: &StorageData, tag: &str) -> Vec<TaggedItem> {
    if tag == OTHER_VIEW_TAG {
        return data.items(OTHER_TAG).iter().cloned().map(TaggedItem::bare).collect();
    }

    let sources: Vec<String> = if tag == ALL_TAG {
        data.tags.keys().cloned().collect()
    } else {
        std::iter::once(tag.to_string())
            .chain(hierarchy::descendants(tag, &data.hierarchy))
            .collect()
    };

    let mut items: Vec<TaggedItem> = sources
        .iter()
        .flat_map(|source| {
            data.items(source)
                .iter()
                .cloned()
                .map(move |item| TaggedItem::sourced(item, source))
        })
        .collect();

    sort_newest_first(&mut items);
    items
}
