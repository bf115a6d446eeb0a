/// Tag hierarchy derived from slash-delimited tag paths
///
/// The tree is never stored as the source of truth: it is rebuilt from the
/// set of regular tag paths, and only the `collapsed` flag carries over from
/// one build to the next.
use crate::tag_ref::{TagRef, is_special};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub const SEPARATOR: char = '/';

/// Hierarchy nodes keyed by tag path
pub type Hierarchy = BTreeMap<String, HierarchyNode>;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HierarchyNode {
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default)]
    pub depth: usize,
}

/// Everything before the last separator; `None` for root paths
pub fn parent_of(path: &str) -> Option<&str> {
    match path.rfind(SEPARATOR) {
        Some(index) if index > 0 => Some(&path[..index]),
        _ => None,
    }
}

/// Last path segment
pub fn tag_name_of(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

/// True when `child` starts with `parent` followed by the separator
pub fn is_child_of(child: &str, parent: &str) -> bool {
    child
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with(SEPARATOR))
}

pub fn depth(path: &str) -> usize {
    path.matches(SEPARATOR).count()
}

pub fn join(parent: &str, name: &str) -> String {
    format!("{}{}{}", parent, SEPARATOR, name)
}

/// Build a fresh hierarchy over the regular paths, all nodes expanded.
///
/// A path whose parent has no node of its own keeps its `parent` field but
/// appears in no children list.
pub fn build<'a>(paths: impl IntoIterator<Item = &'a str>) -> Hierarchy {
    let paths: Vec<&str> = paths.into_iter().filter(|p| !is_special(p)).collect();

    let mut hierarchy: Hierarchy = paths
        .iter()
        .map(|path| {
            let node = HierarchyNode {
                parent: parent_of(path).map(str::to_string),
                children: Vec::new(),
                collapsed: false,
                depth: depth(path),
            };
            (path.to_string(), node)
        })
        .collect();

    for path in &paths {
        if let Some(parent) = parent_of(path) {
            if let Some(node) = hierarchy.get_mut(parent) {
                node.children.push(path.to_string());
            }
        }
    }

    hierarchy
}

/// Rebuild and carry collapse state over from `previous` by path
pub fn rebuild<'a>(paths: impl IntoIterator<Item = &'a str>, previous: &Hierarchy) -> Hierarchy {
    let mut hierarchy = build(paths);

    for (path, node) in hierarchy.iter_mut() {
        if let Some(old) = previous.get(path) {
            node.collapsed = old.collapsed;
        }
    }

    hierarchy
}

/// All descendants of `path`, depth first, in children order.
///
/// Uses an explicit stack and a visited set so a corrupted stored hierarchy
/// cannot loop forever.
pub fn descendants(path: &str, hierarchy: &Hierarchy) -> Vec<String> {
    let mut result = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(path);

    let mut stack: Vec<&str> = match hierarchy.get(path) {
        Some(node) => node.children.iter().rev().map(String::as_str).collect(),
        None => return result,
    };

    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            log::warn!("Hierarchy revisits {:?} below {:?}; skipping", current, path);
            continue;
        }
        result.push(current.to_string());

        if let Some(node) = hierarchy.get(current) {
            stack.extend(node.children.iter().rev().map(String::as_str));
        }
    }

    result
}

/// Depth-first listing of the regular paths, alphabetical at each level.
///
/// Roots are paths without a parent or whose parent has no node. Children of
/// collapsed nodes are omitted; the collapsed node itself is listed.
pub fn ordered_listing<'a>(paths: impl IntoIterator<Item = &'a str>, hierarchy: &Hierarchy) -> Vec<TagRef> {
    let mut roots: Vec<&str> = paths
        .into_iter()
        .filter(|p| !is_special(p))
        .filter(|p| match parent_of(p) {
            Some(parent) => !hierarchy.contains_key(parent),
            None => true,
        })
        .collect();
    roots.sort_unstable();

    let mut listing = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<(&str, usize)> = roots.into_iter().rev().map(|r| (r, 0)).collect();

    while let Some((path, level)) = stack.pop() {
        if !visited.insert(path) {
            continue;
        }

        let node = hierarchy.get(path);
        listing.push(TagRef::WithMeta {
            path: path.to_string(),
            depth: level,
            hierarchy: node.cloned(),
        });

        if let Some(node) = node.filter(|n| !n.collapsed) {
            let mut children: Vec<&str> = node.children.iter().map(String::as_str).collect();
            children.sort_unstable();
            stack.extend(children.into_iter().rev().map(|c| (c, level + 1)));
        }
    }

    listing
}

/// Rewrite `path` from under `old_prefix` to under `new_prefix`
pub fn reparent(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    if path == old_prefix {
        Some(new_prefix.to_string())
    } else if is_child_of(path, old_prefix) {
        Some(format!("{}{}", new_prefix, &path[old_prefix.len()..]))
    } else {
        None
    }
}
