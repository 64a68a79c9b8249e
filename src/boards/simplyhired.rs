use anyhow::{Context, Result};
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use super::{PageFetcher, parse_salary_text, select_text, strip_query};
use crate::models::{Board, RawPosting, SearchProfile};

fn build_url(profile: &SearchProfile, page: usize) -> Result<String> {
    let mut url = Url::parse_with_params(
        "https://www.simplyhired.com/search",
        &[("q", profile.query.as_str()), ("l", profile.location.as_str())],
    )
    .context("Failed to build SimplyHired URL")?;
    if page > 1 {
        url.query_pairs_mut().append_pair("pn", &page.to_string());
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
        info!(page, query = %profile.query, "simplyhired: fetching page");

        let body = match fetcher.fetch(&url, &[]) {
            Ok(body) => body,
            Err(e) if page == 1 => {
                return Err(e).context("SimplyHired: first page fetch failed");
            }
            Err(e) => {
                warn!(page, error = %e, "simplyhired: page fetch failed, keeping partial results");
                break;
            }
        };

        let document = Html::parse_document(&body);
        let card_selector =
            super::selector(r#"div[data-testid="searchSerpJob"], li.SerpJob"#)?;
        let cards: Vec<_> = document.select(&card_selector).collect();
        if cards.is_empty() {
            break;
        }

        for card in &cards {
            match extract_card(card) {
                Some(posting) => postings.push(posting),
                None => warn!("simplyhired: card missing title link, skipped"),
            }
        }

        if page < max_pages {
            fetcher.pause(2, 5);
        }
    }

    info!(count = postings.len(), query = %profile.query, "simplyhired: scrape complete");
    Ok(postings)
}

fn extract_card(card: &scraper::ElementRef) -> Option<RawPosting> {
    let link_selector =
        Selector::parse(r#"h2 a, a[data-testid="searchSerpJobTitle"]"#).ok()?;
    let link = card.select(&link_selector).next()?;

    let title = super::collapse_whitespace(&link.text().collect::<Vec<_>>().join(" "));
    let href = link.value().attr("href").unwrap_or("");
    if title.is_empty() || href.is_empty() {
        return None;
    }
    let url = if href.starts_with('/') {
        format!("https://www.simplyhired.com{}", strip_query(href))
    } else {
        strip_query(href)
    };

    let mut posting = RawPosting::new(Board::SimplyHired, title, url);
    posting.company =
        select_text(card, r#"[data-testid="companyName"], .jobposting-company"#);
    posting.location =
        select_text(card, r#"[data-testid="searchSerpJobLocation"], .jobposting-location"#);
    if let Some(salary) =
        select_text(card, r#"[data-testid="searchSerpJobSalaryEst"], .jobposting-salary"#)
    {
        let (min, max) = parse_salary_text(&salary);
        posting.salary_min = min;
        posting.salary_max = max;
        posting.salary_text = Some(salary);
    }
    posting.description =
        select_text(card, r#"[data-testid="searchSerpJobSnippet"], .jobposting-snippet"#);
    Some(posting)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boards::test_support::StubFetcher;

    fn profile() -> SearchProfile {
        SearchProfile {
            name: "ops".to_string(),
            query: "plant manager".to_string(),
            location: "Tulsa, OK".to_string(),
            radius_miles: 30,
            salary_min: 0,
            boards: vec![Board::SimplyHired],
            enabled: true,
        }
    }

    const PAGE: &str = r#"
        <html><body>
        <div data-testid="searchSerpJob">
          <h2><a href="/job/xyz789?from=serp">Plant Manager</a></h2>
          <span data-testid="companyName">Harvest Foods</span>
          <span data-testid="searchSerpJobLocation">Tulsa, OK</span>
          <span data-testid="searchSerpJobSalaryEst">Estimated: $70K - $90K a year</span>
          <p data-testid="searchSerpJobSnippet">Lead production teams.</p>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_extracts_card_fields() {
        let fetcher = StubFetcher::serving(PAGE);
        let postings = scrape(&fetcher, &profile(), 1).unwrap();

        assert_eq!(postings.len(), 1);
        let p = &postings[0];
        assert_eq!(p.title, "Plant Manager");
        assert_eq!(p.url, "https://www.simplyhired.com/job/xyz789");
        assert_eq!(p.company.as_deref(), Some("Harvest Foods"));
        assert_eq!(p.salary_min, Some(70_000.0));
        assert_eq!(p.salary_max, Some(90_000.0));
    }

    #[test]
    fn test_second_page_carries_page_number() {
        let fetcher = StubFetcher::with_pages(vec![Ok(PAGE.to_string()), Ok(PAGE.to_string())]);
        scrape(&fetcher, &profile(), 2).unwrap();

        let requested = fetcher.requested.borrow();
        assert_eq!(requested.len(), 2);
        assert!(!requested[0].contains("pn="));
        assert!(requested[1].contains("pn=2"));
    }

    #[test]
    fn test_first_page_failure_is_an_error() {
        let fetcher = StubFetcher::failing("503 service unavailable");
        assert!(scrape(&fetcher, &profile(), 2).is_err());
    }
}
