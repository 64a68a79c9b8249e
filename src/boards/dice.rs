use anyhow::{Context, Result};
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use super::{PageFetcher, select_text, strip_query};
use crate::models::{Board, RawPosting, SearchProfile};

fn build_url(profile: &SearchProfile, page: usize) -> Result<String> {
    let mut url = Url::parse_with_params(
        "https://www.dice.com/jobs",
        &[
            ("q", profile.query.as_str()),
            ("location", profile.location.as_str()),
        ],
    )
    .context("Failed to build Dice URL")?;
    if page > 1 {
        url.query_pairs_mut().append_pair("page", &page.to_string());
    }
    Ok(url.into())
}

pub fn scrape(
    fetcher: &dyn PageFetcher,
    profile: &SearchProfile,
    max_pages: usize,
) -> Result<Vec<RawPosting>> {
    let mut postings = Vec::new();

    for page in 1..=max_pages {
        let url = build_url(profile, page)?;
        info!(page, query = %profile.query, "dice: fetching page");

        let body = match fetcher.fetch(&url, &[]) {
            Ok(body) => body,
            Err(e) if page == 1 => {
                return Err(e).context("Dice: first page fetch failed");
            }
            Err(e) => {
                warn!(page, error = %e, "dice: page fetch failed, keeping partial results");
                break;
            }
        };

        let document = Html::parse_document(&body);
        let card_selector =
            super::selector(r#"div[data-cy="search-card"], dhi-search-card"#)?;
        let cards: Vec<_> = document.select(&card_selector).collect();
        if cards.is_empty() {
            break;
        }

        for card in &cards {
            match extract_card(card) {
                Some(posting) => postings.push(posting),
                None => warn!("dice: card missing title link, skipped"),
            }
        }

        if page < max_pages {
            fetcher.pause(2, 5);
        }
    }

    info!(count = postings.len(), query = %profile.query, "dice: scrape complete");
    Ok(postings)
}

fn extract_card(card: &scraper::ElementRef) -> Option<RawPosting> {
    let link_selector = Selector::parse(r#"a[data-cy="card-title-link"], h5 a"#).ok()?;
    let link = card.select(&link_selector).next()?;

    let title = super::collapse_whitespace(&link.text().collect::<Vec<_>>().join(" "));
    let href = link.value().attr("href").unwrap_or("");
    if title.is_empty() || href.is_empty() {
        return None;
    }
    let url = if href.starts_with('/') {
        format!("https://www.dice.com{}", strip_query(href))
    } else {
        strip_query(href)
    };

    let mut posting = RawPosting::new(Board::Dice, title, url);
    posting.external_id = link.value().attr("id").map(str::to_string);
    posting.company = select_text(card, r#"a[data-cy="search-result-company-name"], .company-name"#);
    posting.location = select_text(card, r#"span[data-cy="search-result-location"], .search-result-location"#);
    posting.description = select_text(card, r#"div[data-cy="card-summary"], .card-description"#);
    Some(posting)
}
