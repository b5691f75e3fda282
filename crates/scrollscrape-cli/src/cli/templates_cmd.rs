//! `scrollscrape templates`: list built-in site templates.

use anyhow::Result;

use scrollscrape::selectors::templates;

use crate::cli::output;

pub fn run(url: Option<&str>) -> Result<()> {
    if let Some(url) = url {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        let matched = templates::match_host(&host);
        if output::is_json() {
            output::print_json(&serde_json::json!({ "url": url, "template": matched }));
        } else {
            match matched {
                Some(domain) => println!("  {url} uses the {domain} template"),
                None => println!("  {url} uses the generic rules"),
            }
        }
        return Ok(());
    }

    let domains = templates::domains();
    if output::is_json() {
        output::print_json(&serde_json::json!({ "templates": domains }));
        return Ok(());
    }
    for domain in domains {
        println!("  {domain}");
    }
    Ok(())
}
