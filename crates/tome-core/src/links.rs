//! Link discovery in `llms.txt` manifests and linked markdown documents.

use std::collections::HashSet;

use pulldown_cmark::{Event, LinkType, Parser, Tag};
use url::Url;

use crate::domain::normalize;

/// Extract every link target from markdown, resolved against `base_url`.
///
/// Covers inline links `[text](url)`, reference links resolved through
/// their `[ref]: url` definitions, and autolinks `<https://…>`. Images,
/// email autolinks, `mailto:` targets and fragment-only references are
/// skipped. Results are absolute, deduplicated, and in first-seen order.
///
/// ```rust
/// use tome_core::links::extract_links;
/// use url::Url;
///
/// let base = Url::parse("https://react.dev/llms.txt").unwrap();
/// let md = "- [Hooks](/reference/hooks.md)\n- [Again](/reference/hooks.md)\n- <https://github.com/facebook/react>";
/// assert_eq!(
///     extract_links(md, &base),
///     vec!["https://react.dev/reference/hooks.md", "https://github.com/facebook/react"],
/// );
/// ```
pub fn extract_links(markdown: &str, base_url: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for event in Parser::new(markdown) {
        let dest = match event {
            Event::Start(Tag::Link(LinkType::Email, _, _)) => continue,
            Event::Start(Tag::Link(_, dest, _)) => dest,
            _ => continue,
        };

        let dest = dest.trim();
        if dest.is_empty() || dest.starts_with('#') || dest.to_ascii_lowercase().starts_with("mailto:") {
            continue;
        }

        let absolute = match base_url.join(dest) {
            Ok(url) => url.to_string(),
            Err(_) => continue,
        };

        if seen.insert(absolute.clone()) {
            links.push(absolute);
        }
    }

    links
}

/// Keep only links whose registrable domain equals `domain` (already normalized).
pub fn same_domain_links(links: Vec<String>, domain: &str) -> Vec<String> {
    links
        .into_iter()
        .filter(|link| normalize(link).map(|d| d == domain).unwrap_or(false))
        .collect()
}

/// Path component of a URL, `/` when empty.
pub fn extract_path(url: &Url) -> String {
    match url.path() {
        "" => "/".to_string(),
        path => path.to_string(),
    }
}
