use anyhow::{Result, anyhow, bail};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use super::PageFetcher;
use crate::models::{Board, RawPosting, SearchProfile};
use crate::settings::Settings;

const RESULTS_PER_PAGE: usize = 25;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(rename = "SearchResult")]
    search_result: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(rename = "SearchResultItems", default)]
    items: Vec<SearchItem>,
    #[serde(rename = "SearchResultCountAll", default)]
    count_all: usize,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(rename = "MatchedObjectId", default)]
    id: Option<String>,
    #[serde(rename = "MatchedObjectDescriptor")]
    descriptor: Descriptor,
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    #[serde(rename = "PositionTitle", default)]
    title: Option<String>,
    #[serde(rename = "OrganizationName", default)]
    organization: Option<String>,
    #[serde(rename = "PositionLocationDisplay", default)]
    location: Option<String>,
    #[serde(rename = "PositionURI", default)]
    uri: Option<String>,
    #[serde(rename = "PositionRemuneration", default)]
    remuneration: Vec<Remuneration>,
    #[serde(rename = "PublicationStartDate", default)]
    published: Option<String>,
    #[serde(rename = "UserArea", default)]
    user_area: Option<UserArea>,
}

/// Remuneration ranges arrive as decimal strings, e.g. "72553.0".
#[derive(Debug, Deserialize)]
struct Remuneration {
    #[serde(rename = "MinimumRange", default)]
    minimum: Option<String>,
    #[serde(rename = "MaximumRange", default)]
    maximum: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct UserArea {
    #[serde(rename = "Details", default)]
    details: Option<Details>,
}

#[derive(Debug, Deserialize)]
struct Details {
    #[serde(rename = "JobSummary", default)]
    job_summary: Option<String>,
}

pub fn scrape(
    fetcher: &dyn PageFetcher,
    profile: &SearchProfile,
    settings: &Settings,
    max_pages: usize,
) -> Result<Vec<RawPosting>> {
    if settings.usajobs_api_key.is_empty() {
        bail!("USAJobs API key not configured (set usajobs_api_key in settings)");
    }
    let user_agent = if settings.usajobs_user_agent.is_empty() {
        "jobhunter"
    } else {
        settings.usajobs_user_agent.as_str()
    };

    let mut postings = Vec::new();
    for page in 1..=max_pages {
        let mut url = Url::parse_with_params(
            "https://data.usajobs.gov/api/search",
            &[
                ("Keyword", profile.query.as_str()),
                ("ResultsPerPage", &RESULTS_PER_PAGE.to_string()),
                ("Page", &page.to_string()),
            ],
        )
        .map_err(|e| anyhow!("Failed to build USAJobs URL: {e}"))?;
        if !profile.location.is_empty() {
            url.query_pairs_mut()
                .append_pair("LocationName", &profile.location)
                .append_pair("Radius", &profile.radius_miles.to_string());
        }

        info!(page, query = %profile.query, "usajobs: fetching page");
        let headers = [
            ("Authorization-Key", settings.usajobs_api_key.as_str()),
            ("User-Agent", user_agent),
            ("Host", "data.usajobs.gov"),
        ];
        let body = match fetcher.fetch(url.as_str(), &headers) {
            Ok(body) => body,
            Err(e) if page == 1 => {
                return Err(e.context("USAJobs: first page fetch failed"));
            }
            Err(e) => {
                warn!(page, error = %e, "usajobs: page fetch failed, keeping partial results");
                break;
            }
        };

        let response: ApiResponse = match serde_json::from_str(&body) {
            Ok(r) => r,
            Err(e) if page == 1 => {
                return Err(anyhow!("USAJobs: response was not valid JSON: {e}"));
            }
            Err(e) => {
                warn!(page, error = %e, "usajobs: bad response body, keeping partial results");
                break;
            }
        };

        let result = response.search_result;
        if result.items.is_empty() {
            break;
        }
        for item in &result.items {
            match extract_item(item) {
                Some(posting) => postings.push(posting),
                None => warn!("usajobs: item missing title or URI, skipped"),
            }
        }
        if postings.len() >= result.count_all {
            break;
        }
        if page < max_pages {
            fetcher.pause(1, 3);
        }
    }

    info!(count = postings.len(), query = %profile.query, "usajobs: scrape complete");
    Ok(postings)
}

fn extract_item(item: &SearchItem) -> Option<RawPosting> {
    let descriptor = &item.descriptor;
    let title = descriptor.title.clone()?;
    let url = descriptor.uri.clone()?;

    let mut posting = RawPosting::new(Board::UsaJobs, title, url);
    posting.external_id = item.id.clone();
    posting.company = descriptor.organization.clone();
    posting.location = descriptor.location.clone();
    if let Some(pay) = descriptor.remuneration.first() {
        posting.salary_min = pay.minimum.as_deref().and_then(|s| s.parse::<f64>().ok());
        posting.salary_max = pay.maximum.as_deref().and_then(|s| s.parse::<f64>().ok());
        if let (Some(min), Some(max)) = (posting.salary_min, posting.salary_max) {
            posting.salary_text = Some(format!("${:.0} - ${:.0} per year", min, max));
        }
    }
    posting.description = descriptor
        .user_area
        .as_ref()
        .and_then(|ua| ua.details.as_ref())
        .and_then(|d| d.job_summary.clone());
    posting.posted_date = descriptor.published.clone();
    Some(posting)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boards::test_support::StubFetcher;

    fn profile() -> SearchProfile {
        SearchProfile {
            name: "fed".to_string(),
            query: "program analyst".to_string(),
            location: "Oklahoma City, OK".to_string(),
            radius_miles: 30,
            salary_min: 0,
            boards: vec![Board::UsaJobs],
            enabled: true,
        }
    }

    fn settings() -> Settings {
        Settings {
            usajobs_api_key: "test-key".to_string(),
            usajobs_user_agent: "hunter@example.com".to_string(),
            ..Settings::default()
        }
    }

    const RESPONSE: &str = r#"{
      "SearchResult": {
        "SearchResultCountAll": 1,
        "SearchResultItems": [
          {
            "MatchedObjectId": "834201500",
            "MatchedObjectDescriptor": {
              "PositionTitle": "Program Analyst",
              "OrganizationName": "Federal Aviation Administration",
              "PositionLocationDisplay": "Oklahoma City, Oklahoma",
              "PositionURI": "https://www.usajobs.gov/job/834201500",
              "PositionRemuneration": [
                {"MinimumRange": "72553.0", "MaximumRange": "94317.0"}
              ],
              "PublicationStartDate": "2026-08-18",
              "UserArea": {"Details": {"JobSummary": "Analyze program performance."}}
            }
          }
        ]
      }
    }"#;

    #[test]
    fn test_parses_api_response() {
        let fetcher = StubFetcher::serving(RESPONSE);
        let postings = scrape(&fetcher, &profile(), &settings(), 2).unwrap();

        assert_eq!(postings.len(), 1);
        let p = &postings[0];
        assert_eq!(p.title, "Program Analyst");
        assert_eq!(p.external_id.as_deref(), Some("834201500"));
        assert_eq!(p.company.as_deref(), Some("Federal Aviation Administration"));
        assert_eq!(p.salary_min, Some(72_553.0));
        assert_eq!(p.salary_max, Some(94_317.0));
        assert_eq!(p.description.as_deref(), Some("Analyze program performance."));
        // All results fit on page one, so page two is never requested.
        assert_eq!(fetcher.requested.borrow().len(), 1);
    }

    #[test]
    fn test_missing_api_key_is_a_configuration_error() {
        let fetcher = StubFetcher::serving(RESPONSE);
        let err = scrape(&fetcher, &profile(), &Settings::default(), 1).unwrap_err();
        assert!(err.to_string().contains("API key"));
        assert!(fetcher.requested.borrow().is_empty());
    }

    #[test]
    fn test_request_carries_location_params() {
        let fetcher = StubFetcher::serving(RESPONSE);
        scrape(&fetcher, &profile(), &settings(), 1).unwrap();
        let requested = fetcher.requested.borrow();
        assert!(requested[0].contains("LocationName=Oklahoma+City%2C+OK"));
        assert!(requested[0].contains("Radius=30"));
    }
}
