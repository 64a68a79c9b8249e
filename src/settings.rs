use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::{Board, SearchProfile};

/// Which chat-completion backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenRouter,
    Ollama,
    Google,
}

impl Default for ProviderKind {
    fn default() -> Self {
        ProviderKind::OpenRouter
    }
}

/// Settings document, persisted as JSON under the XDG data dir. Missing keys
/// fall back to defaults so old files keep loading after upgrades.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // LLM backends
    pub llm_provider: ProviderKind,
    pub openrouter_api_key: String,
    pub openrouter_model: String,
    pub ollama_endpoint: String,
    pub ollama_model: String,
    pub google_api_key: String,
    pub google_model: String,
    /// Optional cheaper model routed to by the scoring engine only.
    pub scoring_provider: Option<ProviderKind>,
    pub scoring_model: Option<String>,

    // Pushover
    pub pushover_user_key: String,
    pub pushover_api_token: String,
    pub notify_threshold: i64,
    pub priority_threshold: i64,

    // Scraping
    pub search_profiles: Vec<SearchProfile>,
    pub page_budget: usize,
    pub max_days_old: u32,
    pub usajobs_api_key: String,
    /// USAJobs requires a contact e-mail as the User-Agent.
    pub usajobs_user_agent: String,

    // Exclusion rules (substring, case-insensitive)
    pub exclude_companies: Vec<String>,
    pub exclude_title_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,

    // Candidate preferences fed into the scoring prompt
    pub candidate_dealbreakers: Vec<String>,
    pub dream_companies: Vec<String>,
    pub candidate_location: String,
    pub candidate_radius_miles: u32,
    pub candidate_salary_min: u64,
    pub candidate_salary_max: u64,
    pub candidate_work_mode: String,
    pub candidate_target_roles: Vec<String>,
    pub candidate_target_industries: Vec<String>,
    pub candidate_nice_to_haves: Vec<String>,
    pub candidate_willing_to_travel: u32,
    pub candidate_technical_projects: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_provider: ProviderKind::OpenRouter,
            openrouter_api_key: String::new(),
            openrouter_model: "anthropic/claude-sonnet-4".to_string(),
            ollama_endpoint: "http://localhost:11434".to_string(),
            ollama_model: "qwen2.5-coder:32b".to_string(),
            google_api_key: String::new(),
            google_model: "gemini-2.0-flash".to_string(),
            scoring_provider: None,
            scoring_model: None,
            pushover_user_key: String::new(),
            pushover_api_token: String::new(),
            notify_threshold: 60,
            priority_threshold: 80,
            search_profiles: vec![SearchProfile {
                name: "Operations Manager".to_string(),
                query: "operations manager".to_string(),
                location: "Oklahoma City, OK".to_string(),
                radius_miles: 30,
                salary_min: 50_000,
                boards: vec![Board::Indeed, Board::SimplyHired],
                enabled: true,
            }],
            page_budget: 2,
            max_days_old: 14,
            usajobs_api_key: String::new(),
            usajobs_user_agent: String::new(),
            exclude_companies: Vec::new(),
            exclude_title_keywords: Vec::new(),
            exclude_keywords: vec![
                "security clearance required".to_string(),
                "commission only".to_string(),
                "CDL required".to_string(),
            ],
            candidate_dealbreakers: Vec::new(),
            dream_companies: Vec::new(),
            candidate_location: String::new(),
            candidate_radius_miles: 30,
            candidate_salary_min: 0,
            candidate_salary_max: 0,
            candidate_work_mode: "any".to_string(),
            candidate_target_roles: Vec::new(),
            candidate_target_industries: Vec::new(),
            candidate_nice_to_haves: Vec::new(),
            candidate_willing_to_travel: 10,
            candidate_technical_projects: String::new(),
        }
    }
}

impl Settings {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobhunter") {
            Ok(proj_dirs.data_dir().join("settings.json"))
        } else {
            Ok(PathBuf::from("settings.json"))
        }
    }

    /// Load from the default location; a missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, text)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        Ok(path)
    }

    pub fn enabled_profiles(&self) -> Vec<&SearchProfile> {
        self.search_profiles.iter().filter(|p| p.enabled).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.llm_provider, ProviderKind::OpenRouter);
        assert_eq!(s.notify_threshold, 60);
        assert_eq!(s.priority_threshold, 80);
        assert_eq!(s.page_budget, 2);
        assert!(s.exclude_keywords.contains(&"CDL required".to_string()));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let s: Settings = serde_json::from_str(
            r#"{"notify_threshold": 75, "llm_provider": "ollama"}"#,
        )
        .unwrap();
        assert_eq!(s.notify_threshold, 75);
        assert_eq!(s.llm_provider, ProviderKind::Ollama);
        // untouched keys keep their defaults
        assert_eq!(s.priority_threshold, 80);
        assert_eq!(s.ollama_endpoint, "http://localhost:11434");
    }

    #[test]
    fn test_enabled_profiles_filters_disabled() {
        let mut s = Settings::default();
        s.search_profiles.push(SearchProfile {
            name: "disabled one".to_string(),
            query: "x".to_string(),
            location: "y".to_string(),
            radius_miles: 30,
            salary_min: 0,
            boards: vec![Board::Dice],
            enabled: false,
        });
        let enabled = s.enabled_profiles();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "Operations Manager");
    }

    #[test]
    fn test_settings_round_trip() {
        let s = Settings::default();
        let json = serde_json::to_string(&s).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.search_profiles.len(), s.search_profiles.len());
        assert_eq!(back.openrouter_model, s.openrouter_model);
    }
}
