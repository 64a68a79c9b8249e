use anyhow::{Context, Result};
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use super::{PageFetcher, parse_salary_text, select_text, strip_query};
use crate::models::{Board, RawPosting, SearchProfile};

/// Indeed view URLs carry the job key as the first query param; keep it and
/// drop the tracking params that follow so the same posting dedupes by URL.
fn canonical_url(href: &str) -> String {
    if href.contains("jk=") {
        match href.find('&') {
            Some(idx) => href[..idx].to_string(),
            None => href.to_string(),
        }
    } else {
        strip_query(href)
    }
}

const RESULTS_PER_PAGE: usize = 10;

fn build_url(profile: &SearchProfile, max_days: u32, start: usize) -> Result<String> {
    let mut query = profile.query.clone();
    if profile.salary_min > 0 {
        query.push_str(&format!(" ${}", profile.salary_min));
    }

    let mut url = Url::parse_with_params(
        "https://www.indeed.com/jobs",
        &[
            ("q", query.as_str()),
            ("l", profile.location.as_str()),
            ("radius", &profile.radius_miles.to_string()),
            ("sort", "date"),
            ("fromage", &max_days.to_string()),
        ],
    )
    .context("Failed to build Indeed URL")?;
    if start > 0 {
        url.query_pairs_mut().append_pair("start", &start.to_string());
    }
    Ok(url.into())
}

pub fn scrape(
    fetcher: &dyn PageFetcher,
    profile: &SearchProfile,
    max_days: u32,
    max_pages: usize,
) -> Result<Vec<RawPosting>> {
    let mut postings = Vec::new();

    for page_num in 0..max_pages {
        let url = build_url(profile, max_days, page_num * RESULTS_PER_PAGE)?;
        info!(page = page_num + 1, query = %profile.query, "indeed: fetching page");

        let body = match fetcher.fetch(&url, &[]) {
            Ok(body) => body,
            Err(e) if page_num == 0 => {
                return Err(e).context("Indeed: first page fetch failed");
            }
            Err(e) => {
                warn!(page = page_num + 1, error = %e, "indeed: page fetch failed, keeping partial results");
                break;
            }
        };

        let document = Html::parse_document(&body);
        let card_selector = super::selector("div.job_seen_beacon, div.cardOutline")?;
        let cards: Vec<_> = document.select(&card_selector).collect();
        if cards.is_empty() {
            info!(page = page_num + 1, "indeed: no job cards, stopping");
            break;
        }

        for card in &cards {
            match extract_card(card) {
                Some(posting) => postings.push(posting),
                None => warn!("indeed: card missing title link, skipped"),
            }
        }

        // No next-page control means the result set is exhausted
        let next_selector = super::selector(r#"a[data-testid="pagination-page-next"]"#)?;
        if document.select(&next_selector).next().is_none() {
            break;
        }
        if page_num + 1 < max_pages {
            fetcher.pause(2, 5);
        }
    }

    info!(count = postings.len(), query = %profile.query, "indeed: scrape complete");
    Ok(postings)
}

fn extract_card(card: &scraper::ElementRef) -> Option<RawPosting> {
    let link_selector = Selector::parse("h2.jobTitle a, h2 a, a[data-jk]").ok()?;
    let link = card.select(&link_selector).next()?;

    let title = super::collapse_whitespace(&link.text().collect::<Vec<_>>().join(" "));
    if title.is_empty() {
        return None;
    }

    let href = link.value().attr("href").unwrap_or("");
    if href.is_empty() {
        return None;
    }
    let href = if href.starts_with('/') {
        format!("https://www.indeed.com{}", href)
    } else {
        href.to_string()
    };
    let url = canonical_url(&href);

    let mut posting = RawPosting::new(Board::Indeed, title, url);
    posting.external_id = link.value().attr("data-jk").map(str::to_string);
    posting.company = select_text(card, r#"[data-testid="company-name"], .companyName"#);
    posting.location = select_text(card, r#"[data-testid="text-location"], .companyLocation"#);

    if let Some(salary) =
        select_text(card, r#"[data-testid="attribute_snippet_testid"], .salary-snippet-container"#)
    {
        let lower = salary.to_lowercase();
        if salary.contains('$') || lower.contains("year") || lower.contains("hour") {
            let (min, max) = parse_salary_text(&salary);
            posting.salary_min = min;
            posting.salary_max = max;
            posting.salary_text = Some(salary);
        }
    }

    posting.description = select_text(card, r#".job-snippet, [data-testid="job-snippet"]"#);
    Some(posting)
}
