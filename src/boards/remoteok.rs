use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::models::{Board, RawPosting, SearchProfile};

use super::PageFetcher;

const API_URL: &str = "https://remoteok.com/api";

/// One entry from the RemoteOK feed. The first array element is a legal
/// notice without an `id`, so every field must tolerate absence.
#[derive(Debug, Deserialize)]
struct FeedEntry {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    salary_min: Option<f64>,
    #[serde(default)]
    salary_max: Option<f64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

pub fn scrape(fetcher: &dyn PageFetcher, profile: &SearchProfile) -> Result<Vec<RawPosting>> {
    info!(query = %profile.query, "remoteok: fetching feed");
    let body = fetcher
        .fetch(API_URL, &[("Accept", "application/json")])
        .context("RemoteOK: feed fetch failed")?;

    let entries: Vec<FeedEntry> =
        serde_json::from_str(&body).context("RemoteOK: feed was not valid JSON")?;

    let terms: Vec<String> = profile
        .query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let mut postings = Vec::new();
    for entry in entries {
        let Some(id) = entry.id else { continue };
        let (Some(position), Some(url)) = (entry.position, entry.url) else {
            warn!("remoteok: entry missing position or url, skipped");
            continue;
        };

        // The feed is unfiltered; match the profile query client-side.
        let haystack = format!(
            "{} {} {}",
            position,
            entry.description.as_deref().unwrap_or(""),
            entry.tags.join(" ")
        )
        .to_lowercase();
        if !terms.iter().any(|t| haystack.contains(t.as_str())) {
            continue;
        }

        let mut posting = RawPosting::new(Board::RemoteOk, position, url);
        posting.external_id = Some(id.to_string().trim_matches('"').to_string());
        posting.company = entry.company;
        posting.location = entry.location.or_else(|| Some("Remote".to_string()));
        posting.salary_min = entry.salary_min.filter(|v| *v > 0.0);
        posting.salary_max = entry.salary_max.filter(|v| *v > 0.0);
        if let (Some(min), Some(max)) = (posting.salary_min, posting.salary_max) {
            posting.salary_text = Some(format!("${:.0} - ${:.0}", min, max));
        }
        posting.description = entry.description;
        posting.posted_date = entry.date;
        postings.push(posting);
    }

    info!(count = postings.len(), query = %profile.query, "remoteok: scrape complete");
    Ok(postings)
}
