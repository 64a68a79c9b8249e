pub mod dice;
pub mod indeed;
pub mod remoteok;
pub mod rigzone;
pub mod simplyhired;
pub mod usajobs;
pub mod weworkremotely;
pub mod ziprecruiter;

use anyhow::{Context, Result};
use rand::Rng;
use scraper::{ElementRef, Selector};
use std::time::Duration;

use crate::models::{Board, RawPosting, SearchProfile};
use crate::settings::Settings;

// Rotated between requests to look like ordinary desktop browsing.
const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
];

/// How adapters reach the network. Production uses a blocking HTTP client;
/// tests swap in canned pages and a no-op pause.
pub trait PageFetcher {
    fn fetch(&self, url: &str, headers: &[(&str, &str)]) -> Result<String>;

    /// Courtesy pacing between page fetches. Randomized to look human.
    fn pause(&self, min_s: u64, max_s: u64) {
        let secs = rand::thread_rng().gen_range(min_s..=max_s);
        std::thread::sleep(Duration::from_secs(secs));
    }
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str, headers: &[(&str, &str)]) -> Result<String> {
        let user_agent = USER_AGENTS[rand::thread_rng().gen_range(0..USER_AGENTS.len())];
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", user_agent)
            .header("Accept-Language", "en-US,en;q=0.9");
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request
            .send()
            .with_context(|| format!("Request failed: {}", url))?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "HTTP {} fetching {}",
                response.status(),
                url
            ));
        }
        response.text().context("Failed to read response body")
    }
}

/// Dispatch a scrape to the adapter for the given board. Closed match: a new
/// Board variant won't compile until it is wired here.
pub fn scrape_board(
    board: Board,
    fetcher: &dyn PageFetcher,
    profile: &SearchProfile,
    settings: &Settings,
) -> Result<Vec<RawPosting>> {
    let budget = settings.page_budget.max(1);
    match board {
        Board::Indeed => indeed::scrape(fetcher, profile, settings.max_days_old, budget),
        Board::SimplyHired => simplyhired::scrape(fetcher, profile, budget),
        Board::Rigzone => rigzone::scrape(fetcher, profile, budget),
        Board::RemoteOk => remoteok::scrape(fetcher, profile),
        Board::Dice => dice::scrape(fetcher, profile, budget),
        Board::ZipRecruiter => ziprecruiter::scrape(fetcher, profile, budget),
        Board::WeWorkRemotely => weworkremotely::scrape(fetcher, profile),
        Board::UsaJobs => usajobs::scrape(fetcher, profile, settings, budget),
    }
}

// --- Shared extraction helpers ---

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("Invalid selector '{}': {}", css, e))
}

/// First non-empty inner text matching any of the selectors, whitespace
/// collapsed.
pub(crate) fn select_text(element: &ElementRef, selectors: &str) -> Option<String> {
    let selector = Selector::parse(selectors).ok()?;
    for found in element.select(&selector) {
        let text = collapse_whitespace(&found.text().collect::<Vec<_>>().join(" "));
        if !text.is_empty() {
            return Some(text);
        }
    }
    None
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a salary blurb like "$60,000 - $75,000 a year" or "$90k-$110k" into
/// an annual (min, max) pair. Hourly rates are left unparsed; the raw text is
/// kept on the posting either way.
pub(crate) fn parse_salary_text(text: &str) -> (Option<f64>, Option<f64>) {
    let lower = text.to_lowercase();
    if lower.contains("hour") {
        return (None, None);
    }

    let mut amounts: Vec<f64> = Vec::new();
    let chars: Vec<char> = lower.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' {
            let mut j = i + 1;
            let mut num = String::new();
            while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == ',' || chars[j] == '.') {
                if chars[j] != ',' {
                    num.push(chars[j]);
                }
                j += 1;
            }
            if let Ok(value) = num.parse::<f64>() {
                let value = if j < chars.len() && chars[j] == 'k' {
                    value * 1000.0
                } else {
                    value
                };
                // Plausible annual figures only
                if value >= 10_000.0 {
                    amounts.push(value);
                }
            }
            i = j;
        } else {
            i += 1;
        }
    }

    match amounts.len() {
        0 => (None, None),
        1 => (Some(amounts[0]), None),
        _ => {
            let (a, b) = (amounts[0], amounts[1]);
            if a <= b {
                (Some(a), Some(b))
            } else {
                (Some(b), Some(a))
            }
        }
    }
}

/// Strip tracking query parameters, keeping the path.
pub(crate) fn strip_query(url: &str) -> String {
    match url.find('?') {
        Some(idx) => url[..idx].to_string(),
        None => url.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Serves canned bodies in order; errors once the queue is drained or an
    /// injected error is reached. Never sleeps.
    pub struct StubFetcher {
        pages: RefCell<VecDeque<Result<String, String>>>,
        pub requested: RefCell<Vec<String>>,
    }

    impl StubFetcher {
        pub fn with_pages(pages: Vec<Result<String, String>>) -> Self {
            Self {
                pages: RefCell::new(pages.into_iter().collect()),
                requested: RefCell::new(Vec::new()),
            }
        }

        pub fn serving(body: &str) -> Self {
            Self::with_pages(vec![Ok(body.to_string())])
        }

        pub fn failing(message: &str) -> Self {
            Self::with_pages(vec![Err(message.to_string())])
        }
    }

    impl PageFetcher for StubFetcher {
        fn fetch(&self, url: &str, _headers: &[(&str, &str)]) -> Result<String> {
            self.requested.borrow_mut().push(url.to_string());
            match self.pages.borrow_mut().pop_front() {
                Some(Ok(body)) => Ok(body),
                Some(Err(message)) => Err(anyhow::anyhow!("{}", message)),
                None => Err(anyhow::anyhow!("no more canned pages")),
            }
        }

        fn pause(&self, _min_s: u64, _max_s: u64) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_salary_range() {
        let (min, max) = parse_salary_text("$60,000 - $75,000 a year");
        assert_eq!(min, Some(60_000.0));
        assert_eq!(max, Some(75_000.0));
    }

    #[test]
    fn test_parse_salary_k_suffix() {
        let (min, max) = parse_salary_text("$90k-$110k");
        assert_eq!(min, Some(90_000.0));
        assert_eq!(max, Some(110_000.0));
    }

    #[test]
    fn test_parse_salary_single_value() {
        let (min, max) = parse_salary_text("From $65,000 a year");
        assert_eq!(min, Some(65_000.0));
        assert_eq!(max, None);
    }

    #[test]
    fn test_parse_salary_orders_min_max() {
        let (min, max) = parse_salary_text("$110k to $90k");
        assert_eq!(min, Some(90_000.0));
        assert_eq!(max, Some(110_000.0));
    }

    #[test]
    fn test_parse_salary_ignores_hourly() {
        assert_eq!(parse_salary_text("$25 - $30 an hour"), (None, None));
    }

    #[test]
    fn test_parse_salary_no_amounts() {
        assert_eq!(parse_salary_text("Competitive pay"), (None, None));
    }

    #[test]
    fn test_strip_query() {
        assert_eq!(
            strip_query("https://example.com/viewjob?jk=abc&tk=tracking"),
            "https://example.com/viewjob"
        );
        assert_eq!(strip_query("https://example.com/job/1"), "https://example.com/job/1");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Ops \n  Manager  "), "Ops Manager");
    }
}
