use anyhow::{Context, Result};
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use super::{PageFetcher, select_text};
use crate::models::{Board, RawPosting, SearchProfile};

/// WeWorkRemotely search has no pagination; everything is on one page.
pub fn scrape(fetcher: &dyn PageFetcher, profile: &SearchProfile) -> Result<Vec<RawPosting>> {
    let url = Url::parse_with_params(
        "https://weworkremotely.com/remote-jobs/search",
        &[("term", profile.query.as_str())],
    )
    .context("Failed to build WeWorkRemotely URL")?;

    info!(query = %profile.query, "weworkremotely: fetching search page");
    let body = fetcher
        .fetch(url.as_str(), &[])
        .context("WeWorkRemotely: search page fetch failed")?;

    let document = Html::parse_document(&body);
    let item_selector = super::selector("section.jobs li")?;

    let mut postings = Vec::new();
    for item in document.select(&item_selector) {
        // Section footers ("View all") are list items without a title span.
        let Some(title) = select_text(&item, "span.title") else {
            continue;
        };
        let link_selector = match Selector::parse("a[href^='/remote-jobs/'], a[href^='/listings/']")
        {
            Ok(s) => s,
            Err(_) => continue,
        };
        let Some(link) = item.select(&link_selector).next() else {
            warn!("weworkremotely: listing without a job link, skipped");
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };

        let mut posting = RawPosting::new(
            Board::WeWorkRemotely,
            title,
            format!("https://weworkremotely.com{}", href),
        );
        posting.company = select_text(&item, "span.company");
        posting.location = select_text(&item, "span.region")
            .or_else(|| Some("Remote".to_string()));
        postings.push(posting);
    }

    info!(count = postings.len(), query = %profile.query, "weworkremotely: scrape complete");
    Ok(postings)
}
