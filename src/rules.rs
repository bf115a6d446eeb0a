/// Classification rules and their evaluation
use crate::domain::extract_hostname;
use crate::pattern::{matches_title_keywords, matches_url_patterns};
use crate::tab_data::SavedItem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rules keyed by the tag they classify into
pub type RuleTable = BTreeMap<String, ClassificationRule>;

/// How the conditions inside one group combine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupOperator {
    #[default]
    And,
    Or,
}

/// What a condition inspects
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConditionKind {
    Url,
    Title,
    Domain,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConditionGroup {
    #[serde(default)]
    pub operator: GroupOperator,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// The rule set attached to one tag.
///
/// A rule with a non-empty `advanced_rules` list is evaluated only through
/// its condition groups; otherwise the legacy URL/title lists apply.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRule {
    #[serde(default)]
    pub url_patterns: Vec<String>,
    #[serde(default)]
    pub title_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advanced_rules: Vec<ConditionGroup>,
}

/// The two rule dialects, resolved from a stored rule
pub enum RuleDialect<'a> {
    Legacy {
        url_patterns: &'a [String],
        title_keywords: &'a [String],
    },
    Advanced(&'a [ConditionGroup]),
}

impl Condition {
    pub fn new(kind: ConditionKind, value: &str) -> Condition {
        Condition {
            kind,
            value: value.to_string(),
        }
    }

    pub fn matches(&self, item: &SavedItem) -> bool {
        if self.value.is_empty() {
            return false;
        }

        match self.kind {
            ConditionKind::Url => matches_url_patterns(&item.url, std::slice::from_ref(&self.value)),
            ConditionKind::Title => {
                matches_title_keywords(&item.title, std::slice::from_ref(&self.value))
            }
            ConditionKind::Domain => match extract_hostname(&item.url) {
                Some(host) => host.contains(&self.value) || self.value.contains(&host),
                None => false,
            },
            ConditionKind::Unknown => false,
        }
    }
}

impl ConditionGroup {
    /// An empty group never matches
    pub fn matches(&self, item: &SavedItem) -> bool {
        if self.conditions.is_empty() {
            return false;
        }

        match self.operator {
            GroupOperator::And => self.conditions.iter().all(|c| c.matches(item)),
            GroupOperator::Or => self.conditions.iter().any(|c| c.matches(item)),
        }
    }
}

impl ClassificationRule {
    pub fn legacy(url_patterns: &[&str], title_keywords: &[&str]) -> ClassificationRule {
        ClassificationRule {
            url_patterns: url_patterns.iter().map(|p| p.to_string()).collect(),
            title_keywords: title_keywords.iter().map(|k| k.to_string()).collect(),
            advanced_rules: Vec::new(),
        }
    }

    pub fn advanced(groups: Vec<ConditionGroup>) -> ClassificationRule {
        ClassificationRule {
            advanced_rules: groups,
            ..ClassificationRule::default()
        }
    }

    pub fn dialect(&self) -> RuleDialect<'_> {
        if self.advanced_rules.is_empty() {
            RuleDialect::Legacy {
                url_patterns: &self.url_patterns,
                title_keywords: &self.title_keywords,
            }
        } else {
            RuleDialect::Advanced(&self.advanced_rules)
        }
    }

    pub fn matches(&self, item: &SavedItem) -> bool {
        match self.dialect() {
            RuleDialect::Advanced(groups) => groups.iter().any(|group| group.matches(item)),
            RuleDialect::Legacy {
                url_patterns,
                title_keywords,
            } => {
                let url_match = !url_patterns.is_empty() && matches_url_patterns(&item.url, url_patterns);
                let title_match =
                    !title_keywords.is_empty() && matches_title_keywords(&item.title, title_keywords);
                url_match || title_match
            }
        }
    }

    /// Refill the URL/keyword lists from the condition groups. The
    /// classifier only reads the lists.
    ///
    /// The groups are kept. Domain conditions have no list counterpart.
    /// A rule without groups is returned unchanged.
    pub fn to_legacy(&self) -> ClassificationRule {
        if self.advanced_rules.is_empty() {
            return self.clone();
        }

        let mut url_patterns = Vec::new();
        let mut title_keywords = Vec::new();
        for condition in self.advanced_rules.iter().flat_map(|g| &g.conditions) {
            if condition.value.is_empty() {
                continue;
            }
            match condition.kind {
                ConditionKind::Url => url_patterns.push(condition.value.clone()),
                ConditionKind::Title => title_keywords.push(condition.value.clone()),
                ConditionKind::Domain | ConditionKind::Unknown => {}
            }
        }

        ClassificationRule {
            url_patterns,
            title_keywords,
            advanced_rules: self.advanced_rules.clone(),
        }
    }

    /// Human-readable summary, e.g. `(URL matches "*github.com/*" AND title contains "pr") OR domain contains "gitlab"`
    pub fn describe(&self) -> String {
        match self.dialect() {
            RuleDialect::Advanced(groups) => groups
                .iter()
                .filter(|g| !g.conditions.is_empty())
                .map(describe_group)
                .collect::<Vec<_>>()
                .join(" OR "),
            RuleDialect::Legacy {
                url_patterns,
                title_keywords,
            } => {
                let parts: Vec<String> = url_patterns
                    .iter()
                    .map(|p| describe_condition(ConditionKind::Url, p))
                    .chain(
                        title_keywords
                            .iter()
                            .map(|k| describe_condition(ConditionKind::Title, k)),
                    )
                    .collect();

                if parts.is_empty() {
                    "No conditions defined".to_string()
                } else {
                    parts.join(" OR ")
                }
            }
        }
    }
}

fn describe_condition(kind: ConditionKind, value: &str) -> String {
    let label = match kind {
        ConditionKind::Url => "URL matches",
        ConditionKind::Title => "title contains",
        ConditionKind::Domain => "domain contains",
        ConditionKind::Unknown => "unknown condition",
    };
    format!("{} \"{}\"", label, value)
}

fn describe_group(group: &ConditionGroup) -> String {
    let texts: Vec<String> = group
        .conditions
        .iter()
        .map(|c| describe_condition(c.kind, &c.value))
        .collect();

    if texts.len() == 1 {
        return texts.into_iter().collect();
    }

    let joiner = match group.operator {
        GroupOperator::And => " AND ",
        GroupOperator::Or => " OR ",
    };
    format!("({})", texts.join(joiner))
}

/// Built-in rules used until any tag carries its own
pub fn default_rules() -> RuleTable {
    let mut rules = RuleTable::new();

    rules.insert(
        "Development".to_string(),
        ClassificationRule::legacy(
            &[
                "*github.com/*", "*gitlab.com/*", "*bitbucket.org/*",
                "*stackoverflow.com/*", "*stackexchange.com/*",
                "localhost:*", "127.0.0.1:*", "*.dev/*", "*.local/*",
                "*codepen.io/*", "*jsfiddle.net/*", "*codesandbox.io/*",
            ],
            &["github", "git", "code", "repository", "commit", "pull request", "api", "documentation"],
        ),
    );
    rules.insert(
        "Learning".to_string(),
        ClassificationRule::legacy(
            &[
                "*youtube.com/watch*", "*coursera.org/*", "*udemy.com/*",
                "*edx.org/*", "*khanacademy.org/*", "*codecademy.com/*",
                "*freecodecamp.org/*", "*pluralsight.com/*",
            ],
            &["tutorial", "course", "learn", "training", "guide", "how to", "documentation", "docs"],
        ),
    );
    rules.insert(
        "Social".to_string(),
        ClassificationRule::legacy(
            &[
                "*twitter.com/*", "*facebook.com/*", "*instagram.com/*",
                "*linkedin.com/*", "*reddit.com/*", "*discord.com/*",
                "*slack.com/*", "*telegram.org/*",
            ],
            &["social", "chat", "message", "post", "tweet", "share"],
        ),
    );
    rules.insert(
        "Shopping".to_string(),
        ClassificationRule::legacy(
            &[
                "*amazon.com/*", "*ebay.com/*", "*etsy.com/*",
                "*walmart.com/*", "*target.com/*", "*bestbuy.com/*",
                "*shopify.com/*", "*aliexpress.com/*",
            ],
            &["buy", "shop", "cart", "price", "deal", "sale", "order", "checkout"],
        ),
    );
    rules.insert(
        "News".to_string(),
        ClassificationRule::legacy(
            &[
                "*bbc.com/*", "*cnn.com/*", "*reuters.com/*",
                "*theguardian.com/*", "*nytimes.com/*", "*washingtonpost.com/*",
                "*techcrunch.com/*", "*ycombinator.com/*",
            ],
            &["news", "breaking", "report", "article", "update", "latest"],
        ),
    );

    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn create_test_item(url: &str, title: &str) -> SavedItem {
        SavedItem {
            url: url.to_string(),
            title: title.to_string(),
            fav_icon_url: String::new(),
            saved_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            classified_as: None,
        }
    }

    fn group(operator: GroupOperator, conditions: Vec<Condition>) -> ConditionGroup {
        ConditionGroup {
            operator,
            conditions,
        }
    }

    #[test]
    fn test_legacy_or_semantics() {
        let rule = ClassificationRule::legacy(&["*github.com/*"], &["invoice"]);

        assert!(rule.matches(&create_test_item("https://github.com/x", "Repo")));
        assert!(rule.matches(&create_test_item("https://mail.example.org/", "Your invoice")));
        assert!(!rule.matches(&create_test_item("https://example.org/", "Weather")));
    }

    #[test]
    fn test_legacy_empty_lists_never_match() {
        let rule = ClassificationRule::default();
        assert!(!rule.matches(&create_test_item("https://github.com/x", "Repo")));
    }

    #[test]
    fn test_advanced_overrides_legacy() {
        let mut rule = ClassificationRule::advanced(vec![group(
            GroupOperator::And,
            vec![Condition::new(ConditionKind::Title, "rust")],
        )]);
        rule.url_patterns = vec!["*github.com/*".to_string()];

        assert!(!rule.matches(&create_test_item("https://github.com/x", "Python repo")));
        assert!(rule.matches(&create_test_item("https://example.org/", "Rust book")));
    }

    #[test]
    fn test_and_group_requires_all_conditions() {
        let rule = ClassificationRule::advanced(vec![group(
            GroupOperator::And,
            vec![
                Condition::new(ConditionKind::Domain, "github.com"),
                Condition::new(ConditionKind::Title, "pull request"),
            ],
        )]);

        assert!(rule.matches(&create_test_item("https://github.com/a/b/pull/1", "Fix · Pull Request #1")));
        assert!(!rule.matches(&create_test_item("https://github.com/a/b", "Code")));
    }

    #[test]
    fn test_or_group_requires_any_condition() {
        let rule = ClassificationRule::advanced(vec![group(
            GroupOperator::Or,
            vec![
                Condition::new(ConditionKind::Domain, "gitlab.com"),
                Condition::new(ConditionKind::Title, "merge request"),
            ],
        )]);

        assert!(rule.matches(&create_test_item("https://gitlab.com/a", "Project")));
        assert!(rule.matches(&create_test_item("https://example.org/", "Merge request !4")));
        assert!(!rule.matches(&create_test_item("https://example.org/", "Other")));
    }

    #[test]
    fn test_groups_are_or_combined() {
        let rule = ClassificationRule::advanced(vec![
            group(GroupOperator::And, vec![Condition::new(ConditionKind::Url, "*jira*")]),
            group(GroupOperator::And, vec![Condition::new(ConditionKind::Title, "standup")]),
        ]);

        assert!(rule.matches(&create_test_item("https://company.atlassian.net/", "Daily standup notes")));
    }

    #[test]
    fn test_empty_group_never_matches() {
        let rule = ClassificationRule::advanced(vec![group(GroupOperator::And, vec![])]);
        assert!(!rule.matches(&create_test_item("https://github.com/", "Anything")));
    }

    #[test]
    fn test_empty_value_never_matches() {
        let condition = Condition::new(ConditionKind::Title, "");
        assert!(!condition.matches(&create_test_item("https://github.com/", "Anything")));
    }

    #[test]
    fn test_domain_condition_is_reciprocal() {
        let item = create_test_item("https://docs.github.com/en", "Docs");

        assert!(Condition::new(ConditionKind::Domain, "github.com").matches(&item));
        assert!(Condition::new(ConditionKind::Domain, "www.docs.github.com.mirror").matches(&item));
        assert!(!Condition::new(ConditionKind::Domain, "gitlab.com").matches(&item));
    }

    #[test]
    fn test_domain_condition_fails_closed() {
        let condition = Condition::new(ConditionKind::Domain, "github.com");
        assert!(!condition.matches(&create_test_item("::not a url::", "Broken")));
    }

    #[test]
    fn test_unknown_condition_type() {
        let json = r#"{"operator":"AND","conditions":[{"type":"favicon","value":"x"}]}"#;
        let group: ConditionGroup = serde_json::from_str(json).unwrap();

        assert_eq!(group.conditions[0].kind, ConditionKind::Unknown);
        assert!(!group.matches(&create_test_item("https://x.com/", "x")));
    }

    #[test]
    fn test_rule_deserializes_stored_shape() {
        let json = r#"{
            "urlPatterns": ["*figma.com/*"],
            "titleKeywords": [],
            "advancedRules": [
                {"operator": "OR", "conditions": [{"type": "domain", "value": "figma.com"}]}
            ]
        }"#;
        let rule: ClassificationRule = serde_json::from_str(json).unwrap();

        assert_eq!(rule.advanced_rules[0].operator, GroupOperator::Or);
        assert!(matches!(rule.dialect(), RuleDialect::Advanced(_)));
    }

    #[test]
    fn test_to_legacy() {
        let groups = vec![
            group(
                GroupOperator::And,
                vec![
                    Condition::new(ConditionKind::Url, "*figma.com/*"),
                    Condition::new(ConditionKind::Title, "design"),
                ],
            ),
            group(GroupOperator::Or, vec![Condition::new(ConditionKind::Domain, "dribbble.com")]),
        ];
        let rule = ClassificationRule {
            url_patterns: vec!["*stale.com/*".to_string()],
            ..ClassificationRule::advanced(groups.clone())
        };

        let legacy = rule.to_legacy();

        assert_eq!(legacy.url_patterns, vec!["*figma.com/*"]);
        assert_eq!(legacy.title_keywords, vec!["design"]);
        assert_eq!(legacy.advanced_rules, groups);
    }

    #[test]
    fn test_to_legacy_leaves_plain_rules_alone() {
        let rule = ClassificationRule::legacy(&["*jira*"], &["ticket"]);

        assert_eq!(rule.to_legacy(), rule);
    }

    #[test]
    fn test_describe() {
        let rule = ClassificationRule::advanced(vec![
            group(
                GroupOperator::And,
                vec![
                    Condition::new(ConditionKind::Url, "*github.com/*"),
                    Condition::new(ConditionKind::Title, "pr"),
                ],
            ),
            group(GroupOperator::And, vec![Condition::new(ConditionKind::Domain, "gitlab")]),
        ]);

        assert_eq!(
            rule.describe(),
            r#"(URL matches "*github.com/*" AND title contains "pr") OR domain contains "gitlab""#
        );
        assert_eq!(ClassificationRule::default().describe(), "No conditions defined");
    }

    #[test]
    fn test_default_rules() {
        let rules = default_rules();

        assert_eq!(rules.len(), 5);
        assert!(rules["Development"].matches(&create_test_item("https://github.com/rust-lang/rust", "Rust")));
        assert!(rules["Shopping"].matches(&create_test_item("https://www.amazon.com/dp/123", "Item")));
    }
}
