//! Strongly typed selector rule sets.
//!
//! A rule set maps the container and each [`Field`] to an ordered list of
//! selector candidates. Candidates are compiled when the rule set is loaded,
//! so a malformed selector is rejected before any browser is launched.
//!
//! A candidate is a CSS selector optionally followed by `::attr(name)`, in
//! which case the attribute value is read instead of the element's text:
//!
//! ```text
//! time::attr(datetime)
//! .titleline > a
//! ```
//!
//! The generic rule set is embedded at compile time from
//! `default_rules.json`.

pub mod templates;

use scraper::{ElementRef, Selector};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::SelectorError;
use crate::normalize::clean_text;
use crate::types::Field;

const DEFAULT_RULES_JSON: &str = include_str!("default_rules.json");

const CONTAINER_KEY: &str = "container";

/// One compiled selector candidate.
#[derive(Debug, Clone)]
pub struct SelectorCandidate {
    raw: String,
    selector: Selector,
    attr: Option<String>,
}

impl SelectorCandidate {
    /// Compile a candidate string. `field` is only used for error messages.
    pub fn parse(raw: &str, field: Option<Field>) -> Result<Self, SelectorError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SelectorError::invalid(field, raw, "empty selector"));
        }

        let (css, attr) = match trimmed.rsplit_once("::attr(") {
            Some((css, rest)) => {
                let name = rest
                    .strip_suffix(')')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| SelectorError::invalid(field, raw, "malformed ::attr()"))?;
                (css.trim(), Some(name.to_string()))
            }
            None => (trimmed, None),
        };

        let selector = Selector::parse(css)
            .map_err(|e| SelectorError::invalid(field, raw, format!("{e:?}")))?;

        Ok(Self {
            raw: trimmed.to_string(),
            selector,
            attr,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn attr(&self) -> Option<&str> {
        self.attr.as_deref()
    }

    /// First non-empty value this candidate yields inside `scope`.
    ///
    /// `default_attr` is read when the candidate names no attribute (the link
    /// field reads `href`).
    pub fn first_value(&self, scope: ElementRef<'_>, default_attr: Option<&str>) -> Option<String> {
        self.values(scope, default_attr).next()
    }

    /// Every non-empty value this candidate yields inside `scope`, in
    /// document order.
    pub fn values<'a>(
        &'a self,
        scope: ElementRef<'a>,
        default_attr: Option<&'a str>,
    ) -> impl Iterator<Item = String> + 'a {
        let attr = self.attr.as_deref().or(default_attr);
        scope.select(&self.selector).filter_map(move |el| {
            let value = match attr {
                Some(name) => el.value().attr(name).map(clean_text),
                None => Some(clean_text(&el.text().collect::<String>())),
            };
            value.filter(|v| !v.is_empty())
        })
    }
}

/// Either one selector string or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Ordered selector configuration for one run. Read-only once built.
#[derive(Debug, Clone)]
pub struct SelectorRuleSet {
    container: Vec<SelectorCandidate>,
    fields: BTreeMap<Field, Vec<SelectorCandidate>>,
    detect_container: bool,
}

impl SelectorRuleSet {
    /// Build from raw `(name, candidates)` pairs, validating everything.
    ///
    /// Rejects: no entries at all, unknown names, empty candidate lists,
    /// invalid selectors, and a missing container or link rule.
    pub fn from_entries<I, S>(entries: I) -> Result<Self, SelectorError>
    where
        I: IntoIterator<Item = (S, Vec<String>)>,
        S: AsRef<str>,
    {
        let mut container = None;
        let mut fields = BTreeMap::new();
        let mut seen_any = false;

        for (name, raws) in entries {
            seen_any = true;
            let name = name.as_ref();
            if name == CONTAINER_KEY {
                if raws.is_empty() {
                    return Err(SelectorError::NoCandidates(CONTAINER_KEY.to_string()));
                }
                container = Some(
                    raws.iter()
                        .map(|r| SelectorCandidate::parse(r, None))
                        .collect::<Result<Vec<_>, _>>()?,
                );
                continue;
            }

            let field: Field = name
                .parse()
                .map_err(SelectorError::UnknownField)?;
            if raws.is_empty() {
                return Err(SelectorError::NoCandidates(field.to_string()));
            }
            let compiled = raws
                .iter()
                .map(|r| SelectorCandidate::parse(r, Some(field)))
                .collect::<Result<Vec<_>, _>>()?;
            fields.insert(field, compiled);
        }

        if !seen_any {
            return Err(SelectorError::Empty);
        }
        let container =
            container.ok_or_else(|| SelectorError::NoCandidates(CONTAINER_KEY.to_string()))?;
        if !fields.contains_key(&Field::Link) {
            return Err(SelectorError::NoCandidates(Field::Link.to_string()));
        }

        Ok(Self {
            container,
            fields,
            detect_container: false,
        })
    }

    /// Parse a JSON object of `name → selector | [selectors]`.
    pub fn from_json(json: &str) -> Result<Self, SelectorError> {
        let map: BTreeMap<String, OneOrMany> =
            serde_json::from_str(json).map_err(|e| SelectorError::Parse(e.to_string()))?;
        Self::from_entries(map.into_iter().map(|(k, v)| (k, v.into_vec())))
    }

    /// Load a rule set file.
    pub fn from_path(path: &Path) -> Result<Self, SelectorError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| SelectorError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_json(&data)
    }

    /// The built-in generic rule set. It detects its container by match
    /// count instead of taking the first candidate that matches.
    pub fn generic() -> Result<Self, SelectorError> {
        Ok(Self::from_json(DEFAULT_RULES_JSON)?.with_container_detection(true))
    }

    pub fn with_container_detection(mut self, detect: bool) -> Self {
        self.detect_container = detect;
        self
    }

    /// Whether the extractor picks the container by match count.
    pub fn detects_container(&self) -> bool {
        self.detect_container
    }

    /// Container candidates, in priority order.
    pub fn container(&self) -> &[SelectorCandidate] {
        &self.container
    }

    /// Candidates for a field; empty when the rule set does not map it.
    pub fn candidates(&self, field: Field) -> &[SelectorCandidate] {
        self.fields.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fields this rule set maps.
    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.fields.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_generic_rules_load() {
        let rules = SelectorRuleSet::generic().unwrap();
        assert_eq!(rules.container().len(), 5);
        assert_eq!(rules.candidates(Field::Date)[0].attr(), Some("datetime"));
        assert_eq!(rules.fields().count(), 5);
        assert!(rules.detects_container());
    }

    #[test]
    fn test_single_string_accepted() {
        let rules = SelectorRuleSet::from_json(
            r#"{"container": "li.row", "link": "a", "title": ["h2", "h3"]}"#,
        )
        .unwrap();
        assert_eq!(rules.container()[0].raw(), "li.row");
        assert_eq!(rules.candidates(Field::Title).len(), 2);
        assert!(rules.candidates(Field::Author).is_empty());
    }

    #[test]
    fn test_rejects_empty_rule_set() {
        assert_eq!(
            SelectorRuleSet::from_json("{}").unwrap_err(),
            SelectorError::Empty
        );
    }

    #[test]
    fn test_rejects_unknown_field() {
        let err = SelectorRuleSet::from_json(
            r#"{"container": ["article"], "link": ["a"], "price": [".price"]}"#,
        )
        .unwrap_err();
        assert_eq!(err, SelectorError::UnknownField("price".into()));
    }

    #[test]
    fn test_rejects_missing_container_and_link() {
        let err = SelectorRuleSet::from_json(r#"{"link": ["a"]}"#).unwrap_err();
        assert_eq!(err, SelectorError::NoCandidates("container".into()));

        let err = SelectorRuleSet::from_json(r#"{"container": ["article"]}"#).unwrap_err();
        assert_eq!(err, SelectorError::NoCandidates("link".into()));
    }

    #[test]
    fn test_rejects_empty_candidate_list() {
        let err = SelectorRuleSet::from_entries(vec![
            ("container", vec!["article".to_string()]),
            ("link", vec!["a".to_string()]),
            ("title", Vec::new()),
        ])
        .unwrap_err();
        assert_eq!(err, SelectorError::NoCandidates("title".into()));
    }

    #[test]
    fn test_rejects_invalid_selector() {
        let err = SelectorRuleSet::from_json(
            r#"{"container": ["article"], "link": ["a"], "title": ["h2[["]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SelectorError::InvalidSelector { field, .. } if field == "title"));
    }

    #[test]
    fn test_attr_suffix_parsing() {
        let c = SelectorCandidate::parse("time::attr(datetime)", Some(Field::Date)).unwrap();
        assert_eq!(c.attr(), Some("datetime"));
        assert!(SelectorCandidate::parse("time::attr()", Some(Field::Date)).is_err());
        assert!(SelectorCandidate::parse("time::attr(datetime", Some(Field::Date)).is_err());
    }

    #[test]
    fn test_first_value_skips_empty_matches() {
        let html = Html::parse_fragment(
            r#"<div><h2>   </h2><h2> Second
               title </h2></div>"#,
        );
        let root = html.root_element();
        let c = SelectorCandidate::parse("h2", Some(Field::Title)).unwrap();
        assert_eq!(c.first_value(root, None).as_deref(), Some("Second title"));
    }

    #[test]
    fn test_first_value_reads_attribute() {
        let html = Html::parse_fragment(r#"<time datetime="2024-05-01">May 1</time>"#);
        let root = html.root_element();
        let attr = SelectorCandidate::parse("time::attr(datetime)", None).unwrap();
        let text = SelectorCandidate::parse("time", None).unwrap();
        assert_eq!(attr.first_value(root, None).as_deref(), Some("2024-05-01"));
        assert_eq!(text.first_value(root, None).as_deref(), Some("May 1"));
    }
}
