/// URL decomposition used by the classifier
use url::Url;

/// The lowercased views of one URL that patterns are tested against
///
/// Examples for `https://GitHub.com/rust-lang/rust?tab=readme`:
/// - full: `https://github.com/rust-lang/rust?tab=readme`
/// - without_query: `https://github.com/rust-lang/rust`
/// - hostname: `github.com`
/// - host_and_path: `github.com/rust-lang/rust`
/// - flattened: `https   github.com rust lang rust tab readme`
#[derive(Debug, Clone, PartialEq)]
pub struct UrlView {
    pub full: String,
    pub without_query: String,
    pub hostname: String,
    pub host_and_path: String,
    pub flattened: String,
}

impl UrlView {
    /// Returns `None` when the URL does not parse
    pub fn parse(url: &str) -> Option<UrlView> {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::debug!("Unparsable URL {:?}: {}", url, e);
                return None;
            }
        };

        let full = url.to_lowercase();
        let hostname = parsed.host_str().unwrap_or_default().to_lowercase();
        let path = parsed.path().to_lowercase();
        let origin = parsed.origin().ascii_serialization().to_lowercase();

        Some(UrlView {
            flattened: flatten(&full),
            without_query: format!("{}{}", origin, path),
            host_and_path: format!("{}{}", hostname, path),
            hostname,
            full,
        })
    }

    /// The four strings the anchored pattern regex is tried against
    pub fn regex_targets(&self) -> [&str; 4] {
        [
            &self.full,
            &self.without_query,
            &self.hostname,
            &self.host_and_path,
        ]
    }
}

/// Hostname of a URL as the browser reports it; `None` if unparsable or host-less
pub fn extract_hostname(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .filter(|host| !host.is_empty())
}

/// Replace everything but word characters and dots with spaces
fn flatten(url: &str) -> String {
    url.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                ' '
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_view_parts() {
        let view = UrlView::parse("https://GitHub.com/rust-lang/rust?tab=readme").unwrap();

        assert_eq!(view.full, "https://github.com/rust-lang/rust?tab=readme");
        assert_eq!(view.without_query, "https://github.com/rust-lang/rust");
        assert_eq!(view.hostname, "github.com");
        assert_eq!(view.host_and_path, "github.com/rust-lang/rust");
        assert_eq!(view.flattened, "https   github.com rust lang rust tab readme");
    }

    #[test]
    fn test_url_view_root_path() {
        let view = UrlView::parse("https://notgithub.com").unwrap();

        assert_eq!(view.full, "https://notgithub.com");
        assert_eq!(view.without_query, "https://notgithub.com/");
        assert_eq!(view.host_and_path, "notgithub.com/");
    }

    #[test]
    fn test_url_view_with_port() {
        let view = UrlView::parse("http://localhost:3000/app").unwrap();

        assert_eq!(view.hostname, "localhost");
        assert_eq!(view.without_query, "http://localhost:3000/app");
    }

    #[test]
    fn test_url_view_invalid() {
        assert_eq!(UrlView::parse("not a url"), None);
        assert_eq!(UrlView::parse(""), None);
    }

    #[test]
    fn test_extract_hostname() {
        assert_eq!(extract_hostname("https://www.google.com/search?q=rust"), Some("www.google.com".to_string()));
        assert_eq!(extract_hostname("http://127.0.0.1:8080"), Some("127.0.0.1".to_string()));
        assert_eq!(extract_hostname("file:///tmp/notes.txt"), None);
        assert_eq!(extract_hostname("not-a-url"), None);
    }
}
