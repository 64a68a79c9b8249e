use crate::models::RawPosting;
use crate::settings::Settings;

/// Blocklist rules applied to raw postings before persistence. Three
/// independent keyword sets, all matched as case-insensitive substrings.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    pub companies: Vec<String>,
    pub title_keywords: Vec<String>,
    pub description_keywords: Vec<String>,
}

impl ExclusionRules {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            companies: settings.exclude_companies.clone(),
            title_keywords: settings.exclude_title_keywords.clone(),
            description_keywords: settings.exclude_keywords.clone(),
        }
    }
}

/// Returns the reason a posting is excluded, or None if it passes. A single
/// hit excludes unconditionally; first match wins. The reported reason may
/// depend on rule order, but the excluded/included outcome is deterministic
/// for a fixed rule set.
pub fn exclusion_reason(posting: &RawPosting, rules: &ExclusionRules) -> Option<String> {
    let company = posting.company.as_deref().unwrap_or("").to_lowercase();
    for kw in &rules.companies {
        if !kw.is_empty() && company.contains(&kw.to_lowercase()) {
            return Some(format!("excluded company '{}'", kw));
        }
    }

    let title = posting.title.to_lowercase();
    for kw in &rules.title_keywords {
        if !kw.is_empty() && title.contains(&kw.to_lowercase()) {
            return Some(format!("excluded title keyword '{}'", kw));
        }
    }

    let text = format!(
        "{} {}",
        posting.title,
        posting.description.as_deref().unwrap_or("")
    )
    .to_lowercase();
    for kw in &rules.description_keywords {
        if !kw.is_empty() && text.contains(&kw.to_lowercase()) {
            return Some(format!("excluded keyword '{}'", kw));
        }
    }

    None
}
