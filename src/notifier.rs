use anyhow::{Context, Result};
use std::time::Duration;
use tracing::warn;

use crate::models::{Posting, ScoreDetail};
use crate::settings::Settings;

const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

/// A push alert ready to deliver.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub url: Option<String>,
    pub priority: i64,
}

/// Decide whether a scored posting warrants an alert. Fires when the score
/// clears the notify threshold, or unconditionally for a dream company.
/// Priority escalates at the second, higher threshold.
pub fn build_notification(
    posting: &Posting,
    detail: &ScoreDetail,
    settings: &Settings,
) -> Option<Notification> {
    let company = posting.company.as_deref().unwrap_or("");
    let company_lower = company.to_lowercase();
    let dream_match = settings
        .dream_companies
        .iter()
        .any(|d| !d.is_empty() && company_lower.contains(&d.to_lowercase()));

    if detail.score < settings.notify_threshold && !dream_match {
        return None;
    }

    let priority = if detail.score >= settings.priority_threshold {
        1
    } else {
        0
    };

    let mut lines = vec![
        format!(
            "{} at {}",
            posting.title,
            if company.is_empty() { "Unknown" } else { company }
        ),
        format!(
            "{} | {}",
            posting.location.as_deref().unwrap_or(""),
            posting.salary_text.as_deref().unwrap_or("Salary not listed")
        ),
        String::new(),
    ];

    if !detail.pros.is_empty() {
        lines.push(format!(
            "Pros: {}",
            detail.pros.iter().take(3).cloned().collect::<Vec<_>>().join("; ")
        ));
    }
    if !detail.cons.is_empty() {
        lines.push(format!(
            "Cons: {}",
            detail.cons.iter().take(2).cloned().collect::<Vec<_>>().join("; ")
        ));
    }
    if !detail.fit_summary.is_empty() {
        lines.push(String::new());
        lines.push(detail.fit_summary.clone());
    }

    Some(Notification {
        title: format!("jobhunter: {}/100", detail.score),
        message: lines.join("\n"),
        url: Some(posting.url.clone()).filter(|u| !u.is_empty()),
        priority,
    })
}

/// Something that can push an alert. The pipeline holds this as a trait
/// object so tests can count deliveries without a network.
pub trait Pusher {
    fn push(&self, notification: &Notification) -> Result<()>;
}

#[derive(Debug)]
pub struct PushoverClient {
    token: String,
    user: String,
    http: reqwest::blocking::Client,
}

impl PushoverClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        if settings.pushover_api_token.is_empty() || settings.pushover_user_key.is_empty() {
            return Err(anyhow::anyhow!("Pushover credentials not configured"));
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            token: settings.pushover_api_token.clone(),
            user: settings.pushover_user_key.clone(),
            http,
        })
    }
}

impl Pusher for PushoverClient {
    fn push(&self, notification: &Notification) -> Result<()> {
        let mut form = vec![
            ("token", self.token.clone()),
            ("user", self.user.clone()),
            ("title", notification.title.clone()),
            ("message", notification.message.clone()),
            ("priority", notification.priority.to_string()),
        ];
        if let Some(url) = &notification.url {
            form.push(("url", url.clone()));
            form.push(("url_title", "View Job Posting".to_string()));
        }

        let response = self
            .http
            .post(PUSHOVER_API_URL)
            .form(&form)
            .send()
            .context("Failed to send Pushover request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            warn!(%status, "pushover delivery failed");
            return Err(anyhow::anyhow!(
                "Pushover request failed with status {}: {}",
                status,
                body
            ));
        }
        Ok(())
    }
}
