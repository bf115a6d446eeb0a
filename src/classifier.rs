/// Ranking candidate tags for a tab
use crate::pattern::{matches_title_keywords, matches_url_patterns};
use crate::rules::RuleTable;
use crate::tab_data::SavedItem;
use crate::tag_ref::OTHER_TAG;
use serde::{Deserialize, Serialize};

pub const FULL_CONFIDENCE: f64 = 1.0;
pub const PARTIAL_CONFIDENCE: f64 = 0.7;

/// Which signals produced a match
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchReason {
    #[serde(rename = "url+title")]
    UrlAndTitle,
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "title")]
    Title,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationMatch {
    pub tag: String,
    pub confidence: f64,
    pub reason: MatchReason,
}

/// Score every tag's URL and title lists against the item, best first.
///
/// Only the legacy lists are consulted here; condition groups are used by
/// tag sync. Ties keep rule table order.
pub fn classify(rules: &RuleTable, item: &SavedItem) -> Vec<ClassificationMatch> {
    let mut matches: Vec<ClassificationMatch> = rules
        .iter()
        .filter_map(|(tag, rule)| {
            let url_match = matches_url_patterns(&item.url, &rule.url_patterns);
            let title_match = matches_title_keywords(&item.title, &rule.title_keywords);

            let (confidence, reason) = match (url_match, title_match) {
                (true, true) => (FULL_CONFIDENCE, MatchReason::UrlAndTitle),
                (true, false) => (PARTIAL_CONFIDENCE, MatchReason::Url),
                (false, true) => (PARTIAL_CONFIDENCE, MatchReason::Title),
                (false, false) => return None,
            };

            Some(ClassificationMatch {
                tag: tag.clone(),
                confidence,
                reason,
            })
        })
        .collect();

    matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    matches
}

/// The best matching tag, or `Other` when nothing matches
pub fn suggest_tag(rules: &RuleTable, item: &SavedItem) -> String {
    classify(rules, item)
        .into_iter()
        .next()
        .map(|best| best.tag)
        .unwrap_or_else(|| OTHER_TAG.to_string())
}
