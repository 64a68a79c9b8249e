use anyhow::{Context, Result};
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use super::{PageFetcher, select_text, strip_query};
use crate::models::{Board, RawPosting, SearchProfile};

fn build_url(profile: &SearchProfile, page: usize) -> Result<String> {
    let mut url = Url::parse_with_params(
        "https://www.rigzone.com/oil/jobs/search/",
        &[
            ("keywords", profile.query.as_str()),
            ("location", profile.location.as_str()),
        ],
    )
    .context("Failed to build Rigzone URL")?;
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
        info!(page, query = %profile.query, "rigzone: fetching page");

        let body = match fetcher.fetch(&url, &[]) {
            Ok(body) => body,
            Err(e) if page == 1 => {
                return Err(e).context("Rigzone: first page fetch failed");
            }
            Err(e) => {
                warn!(page, error = %e, "rigzone: page fetch failed, keeping partial results");
                break;
            }
        };

        let document = Html::parse_document(&body);
        let card_selector = super::selector("article.update-block, div.job-result")?;
        let cards: Vec<_> = document.select(&card_selector).collect();
        if cards.is_empty() {
            break;
        }

        for card in &cards {
            match extract_card(card) {
                Some(posting) => postings.push(posting),
                None => warn!("rigzone: card missing title link, skipped"),
            }
        }

        if page < max_pages {
            fetcher.pause(2, 5);
        }
    }

    info!(count = postings.len(), query = %profile.query, "rigzone: scrape complete");
    Ok(postings)
}

fn extract_card(card: &scraper::ElementRef) -> Option<RawPosting> {
    let link_selector = Selector::parse("h3 a, h2 a, a.job-title").ok()?;
    let link = card.select(&link_selector).next()?;

    let title = super::collapse_whitespace(&link.text().collect::<Vec<_>>().join(" "));
    let href = link.value().attr("href").unwrap_or("");
    if title.is_empty() || href.is_empty() {
        return None;
    }
    let url = if href.starts_with('/') {
        format!("https://www.rigzone.com{}", strip_query(href))
    } else {
        strip_query(href)
    };

    let mut posting = RawPosting::new(Board::Rigzone, title, url);
    posting.company = select_text(card, ".heading address, .company-name");
    posting.location = select_text(card, ".heading .location, .job-location");
    posting.description = select_text(card, ".description p, .job-snippet");
    Some(posting)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boards::test_support::StubFetcher;

    fn profile() -> SearchProfile {
        SearchProfile {
            name: "rig".to_string(),
            query: "drilling supervisor".to_string(),
            location: "Midland, TX".to_string(),
            radius_miles: 50,
            salary_min: 0,
            boards: vec![Board::Rigzone],
            enabled: true,
        }
    }

    const PAGE: &str = r#"
        <html><body>
        <article class="update-block">
          <h3><a href="/oil/jobs/postings/123456-drilling-supervisor/">Drilling Supervisor</a></h3>
          <div class="heading"><address>Permian Drilling Co</address><span class="location">Midland, TX</span></div>
          <div class="description"><p>Supervise rig crews on day shift.</p></div>
        </article>
        </body></html>
    "#;

    #[test]
    fn test_extracts_card_fields() {
        let fetcher = StubFetcher::serving(PAGE);
        let postings = scrape(&fetcher, &profile(), 1).unwrap();

        assert_eq!(postings.len(), 1);
        let p = &postings[0];
        assert_eq!(p.title, "Drilling Supervisor");
        assert_eq!(
            p.url,
            "https://www.rigzone.com/oil/jobs/postings/123456-drilling-supervisor/"
        );
        assert_eq!(p.company.as_deref(), Some("Permian Drilling Co"));
        assert_eq!(p.location.as_deref(), Some("Midland, TX"));
    }

    #[test]
    fn test_empty_page_terminates() {
        let fetcher = StubFetcher::serving("<html><body></body></html>");
        let postings = scrape(&fetcher, &profile(), 3).unwrap();
        assert!(postings.is_empty());
        assert_eq!(fetcher.requested.borrow().len(), 1);
    }
}
