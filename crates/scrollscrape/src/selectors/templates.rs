//! Built-in rule sets for well-known sites, matched by host.
//!
//! Templates live in `site_templates.json`, embedded at compile time. A host
//! matches a template when it equals the template's domain or is a
//! sub-domain of it; the longest matching domain wins, so
//! `folha.uol.com.br` beats `uol.com.br`.

use serde_json::Value;
use tracing::debug;
use url::Url;

use super::SelectorRuleSet;
use crate::error::SelectorError;

const SITE_TEMPLATES_JSON: &str = include_str!("site_templates.json");

fn templates() -> serde_json::Map<String, Value> {
    serde_json::from_str(SITE_TEMPLATES_JSON).unwrap_or_default()
}

/// Domains with a built-in template, sorted.
pub fn domains() -> Vec<String> {
    let mut names: Vec<String> = templates().keys().cloned().collect();
    names.sort();
    names
}

/// The template domain that best matches `host`, if any.
pub fn match_host(host: &str) -> Option<String> {
    let host = host.trim_start_matches("www.").to_ascii_lowercase();
    templates()
        .keys()
        .filter(|domain| host == **domain || host.ends_with(&format!(".{domain}")))
        .max_by_key(|domain| domain.len())
        .cloned()
}

/// Rule set for a template domain.
pub fn for_domain(domain: &str) -> Option<Result<SelectorRuleSet, SelectorError>> {
    templates()
        .get(domain)
        .map(|value| SelectorRuleSet::from_json(&value.to_string()))
}

/// Rule set for `url`: the best-matching template, else the generic rules.
pub fn for_url(url: &str) -> Result<SelectorRuleSet, SelectorError> {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string));

    if let Some(domain) = host.as_deref().and_then(match_host) {
        debug!(url, template = %domain, "using site template");
        if let Some(rules) = for_domain(&domain) {
            return rules;
        }
    }
    SelectorRuleSet::generic()
}
