/// Glob-style pattern matching against URLs and titles
use crate::domain::UrlView;
use regex::{Regex, RegexBuilder};

/// Compile a glob pattern into an anchored, case-insensitive regex
///
/// `*` matches any run of characters and `?` any single character;
/// every other character is matched literally.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');

    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            _ => source.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }

    source.push('$');
    RegexBuilder::new(&source).case_insensitive(true).build()
}

/// Pattern text with wildcards stripped, for plain containment checks
fn strip_wildcards(pattern: &str) -> String {
    pattern.to_lowercase().replace('*', "")
}

/// Check one pattern against an already decomposed URL
///
/// The pattern matches if its regex matches the full URL, the URL without
/// query, the hostname or hostname+path, or if its wildcard-free text occurs
/// in the flattened URL. This is intentionally loose.
pub fn matches_url_view(view: &UrlView, pattern: &str) -> bool {
    match glob_to_regex(pattern) {
        Ok(regex) => {
            if view.regex_targets().iter().any(|target| regex.is_match(target)) {
                return true;
            }
        }
        Err(e) => log::warn!("Skipping regex tests for pattern {:?}: {}", pattern, e),
    }

    view.flattened.contains(&strip_wildcards(pattern))
}

/// Does the URL match any of the patterns? Unparsable URLs never match.
pub fn matches_url_patterns(url: &str, patterns: &[String]) -> bool {
    if url.is_empty() || patterns.is_empty() {
        return false;
    }

    match UrlView::parse(url) {
        Some(view) => patterns.iter().any(|pattern| matches_url_view(&view, pattern)),
        None => false,
    }
}

/// Does the title contain any of the keywords (case-insensitive, `*` ignored)?
pub fn matches_title_keywords(title: &str, keywords: &[String]) -> bool {
    if title.is_empty() || keywords.is_empty() {
        return false;
    }

    let title = title.to_lowercase();
    keywords
        .iter()
        .any(|keyword| title.contains(&strip_wildcards(keyword)))
}
