/// Tag references and the virtual tags
use crate::hierarchy::HierarchyNode;
use serde::{Deserialize, Serialize};

/// Virtual view over every saved item
pub const ALL_TAG: &str = "📁 All";
/// Virtual view over the `Other` bucket
pub const OTHER_VIEW_TAG: &str = "📂 Other";
/// Real storage key for unclassified items
pub const OTHER_TAG: &str = "Other";

const SPECIAL_MARKERS: [char; 2] = ['📁', '📂'];

/// Paths carrying a reserved marker are virtual and never part of the hierarchy
pub fn is_special(path: &str) -> bool {
    path.starts_with(SPECIAL_MARKERS)
}

/// A tag as passed around by callers: either a bare path or a listing entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TagRef {
    Bare(String),
    WithMeta {
        path: String,
        depth: usize,
        #[serde(default)]
        hierarchy: Option<HierarchyNode>,
    },
}

impl TagRef {
    pub fn path(&self) -> &str {
        match self {
            TagRef::Bare(path) => path,
            TagRef::WithMeta { path, .. } => path,
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TagRef::Bare(path) => crate::hierarchy::depth(path),
            TagRef::WithMeta { depth, .. } => *depth,
        }
    }

    pub fn special(path: &str) -> TagRef {
        TagRef::WithMeta {
            path: path.to_string(),
            depth: 0,
            hierarchy: None,
        }
    }
}

impl From<&str> for TagRef {
    fn from(path: &str) -> Self {
        TagRef::Bare(path.to_string())
    }
}
