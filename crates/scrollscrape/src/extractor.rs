//! Maps a DOM snapshot to candidate records.
//!
//! The container candidate list is tried in order and the first selector
//! with at least one match wins; later candidates are never merged in. Rule
//! sets that ask for container detection (the generic rules) prefer the first
//! candidate whose match count looks like a listing, see
//! [`ContainerDetection`]. Each field is resolved inside its own container
//! element only, so text from a neighbouring item can never bleed into a
//! record.
//!
//! Everything here is synchronous because `scraper::Html` is `!Send`: callers
//! in async code must finish extraction before their next `.await`.

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::normalize::{resolve_link, KeyNormalization};
use crate::selectors::SelectorRuleSet;
use crate::types::{Field, Record, RecordFields};

/// The rendered page at one point of the scroll loop.
#[derive(Debug, Clone)]
pub struct DomSnapshot {
    pub html: String,
    /// Base for resolving relative links (the page URL).
    pub base_url: Option<Url>,
}

impl DomSnapshot {
    pub fn new(html: impl Into<String>, base_url: &str) -> Self {
        Self {
            html: html.into(),
            base_url: Url::parse(base_url).ok(),
        }
    }
}

/// Records pulled from one snapshot.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: Vec<Record>,
    /// The container candidate that matched, if any did.
    pub container_selector: Option<String>,
}

impl Extraction {
    pub fn unkeyed(&self) -> usize {
        self.records.iter().filter(|r| !r.is_keyed()).count()
    }
}

/// Match-count range of a plausible listing container.
///
/// A candidate matching once is usually page chrome, and one matching
/// hundreds of times is usually too broad. When no candidate falls inside
/// the range, the first candidate with any match is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerDetection {
    pub min: usize,
    pub max: usize,
}

impl Default for ContainerDetection {
    fn default() -> Self {
        Self { min: 3, max: 100 }
    }
}

impl ContainerDetection {
    pub fn accepts(&self, count: usize) -> bool {
        (self.min..=self.max).contains(&count)
    }
}

/// Applies one rule set for the duration of a run.
#[derive(Debug, Clone)]
pub struct Extractor {
    rules: SelectorRuleSet,
    key: KeyNormalization,
    detection: ContainerDetection,
}

impl Extractor {
    pub fn new(rules: SelectorRuleSet, key: KeyNormalization) -> Self {
        Self {
            rules,
            key,
            detection: ContainerDetection::default(),
        }
    }

    pub fn with_detection(mut self, detection: ContainerDetection) -> Self {
        self.detection = detection;
        self
    }

    pub fn rules(&self) -> &SelectorRuleSet {
        &self.rules
    }

    /// Parse `snapshot` and extract every container into a record.
    pub fn extract(&self, snapshot: &DomSnapshot) -> Extraction {
        let document = Html::parse_document(&snapshot.html);
        let scraped_at = Utc::now();

        let Some((selector, containers)) = self.match_containers(&document) else {
            debug!("no container selector matched");
            return Extraction::default();
        };

        let records: Vec<Record> = containers
            .into_iter()
            .map(|el| self.record_for(el, snapshot.base_url.as_ref(), scraped_at))
            .collect();

        debug!(
            container = selector,
            records = records.len(),
            "extracted snapshot"
        );

        Extraction {
            records,
            container_selector: Some(selector.to_string()),
        }
    }

    /// Lazily yield records from an already parsed document.
    pub fn records<'a>(
        &'a self,
        document: &'a Html,
        base_url: Option<&'a Url>,
        scraped_at: DateTime<Utc>,
    ) -> impl Iterator<Item = Record> + 'a {
        self.match_containers(document)
            .map(|(_, els)| els)
            .unwrap_or_default()
            .into_iter()
            .map(move |el| self.record_for(el, base_url, scraped_at))
    }

    /// The winning container candidate with its matches.
    ///
    /// Without detection this is the first candidate with at least one
    /// match. With detection it is the first candidate whose count the
    /// [`ContainerDetection`] range accepts, falling back to the former.
    fn match_containers<'a>(&'a self, document: &'a Html) -> Option<(&'a str, Vec<ElementRef<'a>>)> {
        let detect = self.rules.detects_container();
        let mut first_match = None;

        for candidate in self.rules.container() {
            let matches: Vec<ElementRef<'a>> = document.select(candidate.selector()).collect();
            if matches.is_empty() {
                continue;
            }
            if !detect {
                return Some((candidate.raw(), matches));
            }
            if self.detection.accepts(matches.len()) {
                debug!(container = candidate.raw(), count = matches.len(), "container detected");
                return Some((candidate.raw(), matches));
            }
            if first_match.is_none() {
                first_match = Some((candidate.raw(), matches));
            }
        }

        if let Some((raw, matches)) = &first_match {
            debug!(container = *raw, count = matches.len(), "no container in detection range");
        }
        first_match
    }

    fn record_for(
        &self,
        container: ElementRef<'_>,
        base_url: Option<&Url>,
        scraped_at: DateTime<Utc>,
    ) -> Record {
        let mut fields = RecordFields::default();

        for field in Field::ALL {
            let mut candidates = self.rules.candidates(field).iter();
            let value = if field == Field::Link {
                // An href only counts once it resolves; `#top` and script
                // links fall through to the next element or candidate.
                candidates
                    .flat_map(|c| c.values(container, Some("href")))
                    .find_map(|href| resolve_link(base_url, &href))
            } else {
                candidates.find_map(|c| c.first_value(container, None))
            };
            fields.set(field, value);
        }

        let key = fields
            .link
            .as_deref()
            .map(|link| self.key.key_for(link))
            .unwrap_or_default();

        Record::captured_at(key, fields, scraped_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"
        <html><body>
          <article>
            <h2>First post</h2>
            <span class="author">Ana</span>
            <time datetime="2024-01-02">Jan 2</time>
            <p>Body one</p>
            <a href="/posts/1">read</a>
          </article>
          <article>
            <h2>Second post</h2>
            <a href="https://other.example/posts/2/">read</a>
          </article>
          <article>
            <h3>No link here</h3>
          </article>
        </body></html>
    "#;

    fn extractor() -> Extractor {
        Extractor::new(
            SelectorRuleSet::generic().unwrap(),
            KeyNormalization::default(),
        )
    }

    #[test]
    fn test_extracts_all_containers() {
        let snap = DomSnapshot::new(FEED, "https://blog.example/feed");
        let out = extractor().extract(&snap);

        assert_eq!(out.container_selector.as_deref(), Some("article"));
        assert_eq!(out.records.len(), 3);

        let first = &out.records[0];
        assert_eq!(first.fields.title.as_deref(), Some("First post"));
        assert_eq!(first.fields.author.as_deref(), Some("Ana"));
        assert_eq!(first.fields.date.as_deref(), Some("2024-01-02"));
        assert_eq!(first.fields.content.as_deref(), Some("Body one"));
        assert_eq!(
            first.fields.link.as_deref(),
            Some("https://blog.example/posts/1")
        );
        assert_eq!(first.container_key(), "https://blog.example/posts/1");
    }

    #[test]
    fn test_missing_fields_are_none_not_errors() {
        let snap = DomSnapshot::new(FEED, "https://blog.example/feed");
        let out = extractor().extract(&snap);

        let second = &out.records[1];
        assert_eq!(second.fields.author, None);
        assert_eq!(second.fields.date, None);
        assert_eq!(second.container_key(), "https://other.example/posts/2");
    }

    #[test]
    fn test_container_without_link_is_unkeyed() {
        let snap = DomSnapshot::new(FEED, "https://blog.example/feed");
        let out = extractor().extract(&snap);

        assert_eq!(out.unkeyed(), 1);
        assert!(!out.records[2].is_keyed());
        assert_eq!(out.records[2].fields.title.as_deref(), Some("No link here"));
    }

    #[test]
    fn test_fields_do_not_bleed_across_containers() {
        let html = r#"
            <div class="item"><a href="/a">A</a></div>
            <div class="item"><span class="author">Bob</span><a href="/b">B</a></div>
        "#;
        let snap = DomSnapshot::new(html, "https://x.example/");
        let out = extractor().extract(&snap);

        assert_eq!(out.container_selector.as_deref(), Some(".item"));
        assert_eq!(out.records[0].fields.author, None);
        assert_eq!(out.records[1].fields.author.as_deref(), Some("Bob"));
    }

    #[test]
    fn test_first_matching_container_candidate_wins_without_merging() {
        let html = r#"
            <div class="post"><a href="/p1">p1</a></div>
            <div class="card"><a href="/c1">c1</a></div>
            <div class="card"><a href="/c2">c2</a></div>
        "#;
        let snap = DomSnapshot::new(html, "https://x.example/");
        let out = extractor().extract(&snap);

        assert_eq!(out.container_selector.as_deref(), Some(".post"));
        assert_eq!(out.records.len(), 1);
    }

    #[test]
    fn test_field_candidates_fall_back_in_order() {
        let rules = SelectorRuleSet::from_json(
            r#"{"container": ["li"], "link": ["a"], "title": [".headline", "b"]}"#,
        )
        .unwrap();
        let ex = Extractor::new(rules, KeyNormalization::default());
        let html = r#"<ul>
            <li><span class="headline">Primary</span><b>Secondary</b><a href="/1">x</a></li>
            <li><span class="headline">  </span><b>Fallback</b><a href="/2">x</a></li>
        </ul>"#;
        let out = ex.extract(&DomSnapshot::new(html, "https://x.example/"));

        assert_eq!(out.records[0].fields.title.as_deref(), Some("Primary"));
        assert_eq!(out.records[1].fields.title.as_deref(), Some("Fallback"));
    }

    #[test]
    fn test_no_container_match_yields_nothing() {
        let snap = DomSnapshot::new("<html><body><div>hi</div></body></html>", "https://x.example/");
        let out = extractor().extract(&snap);
        assert!(out.records.is_empty());
        assert_eq!(out.container_selector, None);
    }

    #[test]
    fn test_lazy_records_iterator() {
        let document = Html::parse_document(FEED);
        let base = Url::parse("https://blog.example/").unwrap();
        let ex = extractor();
        let mut iter = ex.records(&document, Some(&base), Utc::now());

        let first = iter.next().unwrap();
        assert_eq!(first.fields.title.as_deref(), Some("First post"));
        assert_eq!(iter.count(), 2);
    }

    #[test]
    fn test_anchor_only_link_is_unkeyed() {
        let html = r##"<article><h2>T</h2><a href="#top">up</a></article>"##;
        let out = extractor().extract(&DomSnapshot::new(html, "https://x.example/"));
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].fields.link, None);
        assert!(!out.records[0].is_keyed());
    }

    #[test]
    fn test_unresolvable_link_falls_through_to_next_candidate() {
        let rules = SelectorRuleSet::from_json(
            r#"{"container": ["article"], "title": ["h2"], "link": ["a.top", "a.story"]}"#,
        )
        .unwrap();
        let ex = Extractor::new(rules, KeyNormalization::default());
        let html = r##"<article><h2>T</h2>
            <a class="top" href="#top">top</a>
            <a class="story" href="/post/1">story</a>
        </article>"##;
        let out = ex.extract(&DomSnapshot::new(html, "https://x.example/"));

        assert_eq!(out.records.len(), 1);
        assert_eq!(
            out.records[0].fields.link.as_deref(),
            Some("https://x.example/post/1")
        );
        assert_eq!(out.records[0].container_key(), "https://x.example/post/1");
    }

    #[test]
    fn test_unresolvable_link_falls_through_to_next_element() {
        let rules =
            SelectorRuleSet::from_json(r#"{"container": ["li"], "link": ["a"]}"#).unwrap();
        let ex = Extractor::new(rules, KeyNormalization::default());
        let html = r##"<ul><li>
            <a href="javascript:void(0)">menu</a>
            <a href="#comments">comments</a>
            <a href="/item/7">item</a>
        </li></ul>"##;
        let out = ex.extract(&DomSnapshot::new(html, "https://x.example/"));

        assert_eq!(out.records[0].container_key(), "https://x.example/item/7");
    }

    fn cards(count: usize) -> String {
        (0..count)
            .map(|i| format!(r#"<div class="card"><h3>Card {i}</h3><a href="/c/{i}">c</a></div>"#))
            .collect()
    }

    #[test]
    fn test_detection_prefers_candidate_with_listing_sized_count() {
        let html = format!(
            r#"<article><h1>Page wrapper</h1><a href="/about">about</a></article>{}"#,
            cards(30)
        );
        let out = extractor().extract(&DomSnapshot::new(html, "https://x.example/"));

        assert_eq!(out.container_selector.as_deref(), Some(".card"));
        assert_eq!(out.records.len(), 30);
        assert_eq!(out.records[0].container_key(), "https://x.example/c/0");
    }

    #[test]
    fn test_detection_range_is_configurable() {
        let html = format!(r#"<article><a href="/about">about</a></article>{}"#, cards(30));
        let ex = extractor().with_detection(ContainerDetection { min: 1, max: 10 });
        let out = ex.extract(&DomSnapshot::new(html, "https://x.example/"));

        assert_eq!(out.container_selector.as_deref(), Some("article"));
        assert_eq!(out.records.len(), 1);
    }

    #[test]
    fn test_detection_falls_back_to_first_match_when_none_in_range() {
        let html = format!(r#"<article><a href="/about">about</a></article>{}"#, cards(150));
        let out = extractor().extract(&DomSnapshot::new(html, "https://x.example/"));

        assert_eq!(out.container_selector.as_deref(), Some("article"));
    }

    #[test]
    fn test_explicit_rules_keep_first_match_order() {
        let rules = SelectorRuleSet::from_json(
            r#"{"container": ["article", ".card"], "link": ["a"]}"#,
        )
        .unwrap();
        assert!(!rules.detects_container());
        let ex = Extractor::new(rules, KeyNormalization::default());
        let html = format!(r#"<article><a href="/about">about</a></article>{}"#, cards(30));
        let out = ex.extract(&DomSnapshot::new(html, "https://x.example/"));

        assert_eq!(out.container_selector.as_deref(), Some("article"));
        assert_eq!(out.records.len(), 1);
    }

    #[test]
    fn test_detection_range_bounds() {
        let d = ContainerDetection::default();
        assert!(!d.accepts(2));
        assert!(d.accepts(3));
        assert!(d.accepts(100));
        assert!(!d.accepts(101));
    }
}
