use anyhow::{Context, Result};
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use super::{PageFetcher, parse_salary_text, select_text, strip_query};
use crate::models::{Board, RawPosting, SearchProfile};

fn build_url(profile: &SearchProfile, page: usize) -> Result<String> {
    let mut url = Url::parse_with_params(
        "https://www.ziprecruiter.com/jobs-search",
        &[
            ("search", profile.query.as_str()),
            ("location", profile.location.as_str()),
            ("radius", &profile.radius_miles.to_string()),
        ],
    )
    .context("Failed to build ZipRecruiter URL")?;
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
        info!(page, query = %profile.query, "ziprecruiter: fetching page");

        let body = match fetcher.fetch(&url, &[]) {
            Ok(body) => body,
            Err(e) if page == 1 => {
                return Err(e).context("ZipRecruiter: first page fetch failed");
            }
            Err(e) => {
                warn!(page, error = %e, "ziprecruiter: page fetch failed, keeping partial results");
                break;
            }
        };

        let document = Html::parse_document(&body);
        let card_selector = super::selector("article.job_result, div.job_content")?;
        let cards: Vec<_> = document.select(&card_selector).collect();
        if cards.is_empty() {
            break;
        }

        for card in &cards {
            match extract_card(card) {
                Some(posting) => postings.push(posting),
                None => warn!("ziprecruiter: card missing title link, skipped"),
            }
        }

        if page < max_pages {
            fetcher.pause(2, 5);
        }
    }

    info!(count = postings.len(), query = %profile.query, "ziprecruiter: scrape complete");
    Ok(postings)
}

fn extract_card(card: &scraper::ElementRef) -> Option<RawPosting> {
    let link_selector = Selector::parse("h2 a, a.job_link").ok()?;
    let link = card.select(&link_selector).next()?;

    let title = super::collapse_whitespace(&link.text().collect::<Vec<_>>().join(" "));
    let href = link.value().attr("href").unwrap_or("");
    if title.is_empty() || href.is_empty() {
        return None;
    }
    let url = if href.starts_with('/') {
        format!("https://www.ziprecruiter.com{}", strip_query(href))
    } else {
        strip_query(href)
    };

    let mut posting = RawPosting::new(Board::ZipRecruiter, title, url);
    posting.company = select_text(card, "a.company_name, [data-testid=\"job-card-company\"]");
    posting.location = select_text(card, ".location, [data-testid=\"job-card-location\"]");
    if let Some(salary) = select_text(card, ".perc_salary, .salary") {
        let (min, max) = parse_salary_text(&salary);
        posting.salary_min = min;
        posting.salary_max = max;
        posting.salary_text = Some(salary);
    }
    posting.description = select_text(card, ".job_snippet, p.snippet");
    Some(posting)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boards::test_support::StubFetcher;

    fn profile() -> SearchProfile {
        SearchProfile {
            name: "ops".to_string(),
            query: "warehouse manager".to_string(),
            location: "Norman, OK".to_string(),
            radius_miles: 25,
            salary_min: 0,
            boards: vec![Board::ZipRecruiter],
            enabled: true,
        }
    }

    const PAGE: &str = r#"
        <html><body>
        <article class="job_result">
          <h2><a class="job_link" href="/c/Granary-Co/Job/Warehouse-Manager/-in-Norman,OK?zrclid=t1">Warehouse Manager</a></h2>
          <a class="company_name">Granary Co</a>
          <div class="location">Norman, OK</div>
          <div class="perc_salary">$55,000 to $65,000 Annually</div>
          <p class="job_snippet">Oversee receiving and fulfillment.</p>
        </article>
        </body></html>
    "#;

    #[test]
    fn test_extracts_card_fields() {
        let fetcher = StubFetcher::serving(PAGE);
        let postings = scrape(&fetcher, &profile(), 1).unwrap();

        assert_eq!(postings.len(), 1);
        let p = &postings[0];
        assert_eq!(p.title, "Warehouse Manager");
        assert_eq!(
            p.url,
            "https://www.ziprecruiter.com/c/Granary-Co/Job/Warehouse-Manager/-in-Norman,OK"
        );
        assert_eq!(p.salary_min, Some(55_000.0));
        assert_eq!(p.salary_max, Some(65_000.0));
    }

    #[test]
    fn test_search_url_carries_radius() {
        let fetcher = StubFetcher::serving(PAGE);
        scrape(&fetcher, &profile(), 1).unwrap();
        let requested = fetcher.requested.borrow();
        assert!(requested[0].contains("radius=25"));
    }
}
