//! Link resolution and container-key derivation.

use serde::{Deserialize, Serialize};
use url::Url;

/// How raw link values are canonicalized before they become keys.
///
/// Two containers whose links differ only in the stripped parts collapse to
/// the same key and are deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyNormalization {
    pub strip_fragment: bool,
    pub strip_trailing_slash: bool,
    pub strip_query: bool,
}

impl Default for KeyNormalization {
    fn default() -> Self {
        Self {
            strip_fragment: true,
            strip_trailing_slash: true,
            strip_query: false,
        }
    }
}

impl KeyNormalization {
    /// Leave absolute links exactly as resolved.
    pub fn none() -> Self {
        Self {
            strip_fragment: false,
            strip_trailing_slash: false,
            strip_query: false,
        }
    }

    /// Derive the container key for an absolute link. Empty input gives an
    /// empty key.
    pub fn key_for(&self, link: &str) -> String {
        let link = link.trim();
        if link.is_empty() {
            return String::new();
        }
        let Ok(mut url) = Url::parse(link) else {
            return link.to_string();
        };
        if self.strip_fragment {
            url.set_fragment(None);
        }
        if self.strip_query {
            url.set_query(None);
        }
        let mut key = url.to_string();
        if self.strip_trailing_slash {
            while key.ends_with('/') && !key.ends_with("://") && url.path() != "/" {
                key.pop();
            }
            // Bare origins keep no trailing slash either.
            if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
                key = key.trim_end_matches('/').to_string();
            }
        }
        key
    }
}

/// Resolve `href` against `base`, skipping anchors and script links.
pub fn resolve_link(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    match base {
        Some(base) => base.join(href).ok().map(|u| u.to_string()),
        None => Url::parse(href).ok().map(|u| u.to_string()),
    }
}

/// Collapse internal whitespace runs and trim.
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
