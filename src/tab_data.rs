/// Data structures for saved tabs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A live browser tab as reported by the host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: i32,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fav_icon_url: String,
    #[serde(default)]
    pub pinned: bool,
}

impl TabInfo {
    pub fn new(id: i32, url: String, title: String) -> TabInfo {
        TabInfo {
            id,
            url,
            title,
            fav_icon_url: String::new(),
            pinned: false,
        }
    }

    /// Browser-internal pages are never saved
    pub fn is_saveable(&self) -> bool {
        !self.url.is_empty()
            && !self.url.starts_with("chrome://")
            && !self.url.starts_with("edge://")
            && !self.url.starts_with("about:blank")
    }
}

/// A tab saved under a tag.
///
/// Identity is the `(url, saved_at)` pair; there is no synthetic id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedItem {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub fav_icon_url: String,
    pub saved_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classified_as: Option<String>,
}

impl SavedItem {
    pub fn from_tab(tab: &TabInfo, saved_at: DateTime<Utc>) -> SavedItem {
        let title = if tab.title.is_empty() {
            tab.url.clone()
        } else {
            tab.title.clone()
        };

        SavedItem {
            url: tab.url.clone(),
            title,
            fav_icon_url: tab.fav_icon_url.clone(),
            saved_at,
            classified_as: None,
        }
    }

    pub fn has_identity(&self, url: &str, saved_at: &DateTime<Utc>) -> bool {
        self.url == url && &self.saved_at == saved_at
    }

    pub fn same_identity(&self, other: &SavedItem) -> bool {
        self.has_identity(&other.url, &other.saved_at)
    }
}

/// A saved item together with the tag it is stored under
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaggedItem {
    #[serde(flatten)]
    pub item: SavedItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tag: Option<String>,
}

impl TaggedItem {
    pub fn sourced(item: SavedItem, tag: &str) -> TaggedItem {
        TaggedItem {
            item,
            source_tag: Some(tag.to_string()),
        }
    }

    pub fn bare(item: SavedItem) -> TaggedItem {
        TaggedItem {
            item,
            source_tag: None,
        }
    }
}

/// Newest first; ties keep their collection order
pub fn sort_newest_first(items: &mut [TaggedItem]) {
    items.sort_by(|a, b| b.item.saved_at.cmp(&a.item.saved_at));
}
