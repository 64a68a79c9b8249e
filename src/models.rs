use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Supported job boards. Adapter dispatch matches on this enum so a new
/// board can't be half-wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Board {
    Indeed,
    SimplyHired,
    Rigzone,
    RemoteOk,
    Dice,
    ZipRecruiter,
    WeWorkRemotely,
    UsaJobs,
}

impl Board {
    pub const ALL: [Board; 8] = [
        Board::Indeed,
        Board::SimplyHired,
        Board::Rigzone,
        Board::RemoteOk,
        Board::Dice,
        Board::ZipRecruiter,
        Board::WeWorkRemotely,
        Board::UsaJobs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Board::Indeed => "indeed",
            Board::SimplyHired => "simplyhired",
            Board::Rigzone => "rigzone",
            Board::RemoteOk => "remoteok",
            Board::Dice => "dice",
            Board::ZipRecruiter => "ziprecruiter",
            Board::WeWorkRemotely => "weworkremotely",
            Board::UsaJobs => "usajobs",
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Board {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "indeed" => Ok(Board::Indeed),
            "simplyhired" => Ok(Board::SimplyHired),
            "rigzone" => Ok(Board::Rigzone),
            "remoteok" => Ok(Board::RemoteOk),
            "dice" => Ok(Board::Dice),
            "ziprecruiter" => Ok(Board::ZipRecruiter),
            "weworkremotely" => Ok(Board::WeWorkRemotely),
            "usajobs" => Ok(Board::UsaJobs),
            other => Err(anyhow!("Unknown board '{}'", other)),
        }
    }
}

/// Lifecycle status of a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostingStatus {
    New,
    Interested,
    Applied,
    Interviewing,
    Rejected,
    Offer,
    Accepted,
    Archived,
}

impl PostingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostingStatus::New => "new",
            PostingStatus::Interested => "interested",
            PostingStatus::Applied => "applied",
            PostingStatus::Interviewing => "interviewing",
            PostingStatus::Rejected => "rejected",
            PostingStatus::Offer => "offer",
            PostingStatus::Accepted => "accepted",
            PostingStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for PostingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "new" => Ok(PostingStatus::New),
            "interested" => Ok(PostingStatus::Interested),
            "applied" => Ok(PostingStatus::Applied),
            "interviewing" => Ok(PostingStatus::Interviewing),
            "rejected" => Ok(PostingStatus::Rejected),
            "offer" => Ok(PostingStatus::Offer),
            "accepted" => Ok(PostingStatus::Accepted),
            "archived" => Ok(PostingStatus::Archived),
            other => Err(anyhow!("Invalid status '{}'", other)),
        }
    }
}

/// A raw posting as it comes off a board adapter, before filtering and
/// persistence. Title and url are guaranteed; the rest is best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPosting {
    pub source: Board,
    pub external_id: Option<String>,
    pub url: String,
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub salary_text: Option<String>,
    pub description: Option<String>,
    pub posted_date: Option<String>,
    pub scraped_at: String,
}

impl RawPosting {
    pub fn new(source: Board, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source,
            external_id: None,
            url: url.into(),
            title: title.into(),
            company: None,
            location: None,
            salary_min: None,
            salary_max: None,
            salary_text: None,
            description: None,
            posted_date: None,
            scraped_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A stored posting row.
#[derive(Debug, Clone)]
pub struct Posting {
    pub id: i64,
    pub external_id: Option<String>,
    pub source: String,
    pub url: String,
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub salary_text: Option<String>,
    pub description: Option<String>,
    pub posted_date: Option<String>,
    pub scraped_at: Option<String>,
    pub score: Option<i64>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub fit_summary: Option<String>,
    pub summary: Option<String>,
    pub ghost_risk: Option<String>,
    pub salary_estimate: Option<String>,
    pub status: String,
    pub notified: bool,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// LLM-estimated likelihood a posting is non-genuine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GhostRisk {
    Low,
    Medium,
    High,
}

impl GhostRisk {
    pub fn as_str(&self) -> &'static str {
        match self {
            GhostRisk::Low => "low",
            GhostRisk::Medium => "medium",
            GhostRisk::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordMatch {
    pub keyword: String,
    #[serde(default)]
    pub category: String, // hard_skill, soft_skill, tool, certification
    #[serde(default)]
    pub matched: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapEntry {
    pub gap: String,
    /// Transferable skill that partially covers the gap, or empty.
    #[serde(default)]
    pub transferable: String,
}

/// Structured scoring verdict, persisted per posting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreDetail {
    pub score: i64,
    #[serde(default)]
    pub pros: Vec<String>,
    #[serde(default)]
    pub cons: Vec<String>,
    #[serde(default)]
    pub fit_summary: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub ghost_risk: Option<GhostRisk>,
    #[serde(default)]
    pub keyword_match: Vec<KeywordMatch>,
    #[serde(default)]
    pub gaps: Vec<GapEntry>,
    #[serde(default)]
    pub salary_estimate: Option<String>,
}

/// A named scraping campaign: query, location, and which boards to hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProfile {
    pub name: String,
    pub query: String,
    pub location: String,
    #[serde(default = "default_radius")]
    pub radius_miles: u32,
    #[serde(default)]
    pub salary_min: u64,
    pub boards: Vec<Board>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_radius() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkHistoryEntry {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub highlights: Vec<String>,
}

/// Synthesized from all resumes by the LLM; overwritten wholesale each run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub experience_years: u32,
    #[serde(default)]
    pub experience_level: String, // entry/mid/senior/executive
    #[serde(default)]
    pub core_strengths: Vec<String>,
    #[serde(default)]
    pub all_skills: Vec<String>,
    #[serde(default)]
    pub industries: Vec<String>,
    #[serde(default)]
    pub target_roles: Vec<String>,
    #[serde(default)]
    pub work_history: Vec<WorkHistoryEntry>,
    #[serde(default)]
    pub education: Vec<String>,
    #[serde(default)]
    pub unique_value: String,
    #[serde(default)]
    pub gaps: Vec<String>,
}

/// One row per pipeline invocation. Append-only audit log.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub jobs_found: i64,
    pub jobs_new: i64,
    pub jobs_scored: i64,
    pub notifications_sent: i64,
    pub status: String, // running, completed, error
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_round_trip() {
        for board in Board::ALL {
            let parsed: Board = board.as_str().parse().unwrap();
            assert_eq!(parsed, board);
        }
    }

    #[test]
    fn test_board_parse_case_insensitive() {
        let board: Board = "RemoteOK".parse().unwrap();
        assert_eq!(board, Board::RemoteOk);
        assert!("monster".parse::<Board>().is_err());
    }

    #[test]
    fn test_status_round_trip() {
        let status: PostingStatus = "interviewing".parse().unwrap();
        assert_eq!(status, PostingStatus::Interviewing);
        assert_eq!(status.as_str(), "interviewing");
        assert!("pending".parse::<PostingStatus>().is_err());
    }

    #[test]
    fn test_score_detail_tolerates_missing_optional_fields() {
        let detail: ScoreDetail = serde_json::from_str(r#"{"score": 40}"#).unwrap();
        assert_eq!(detail.score, 40);
        assert!(detail.pros.is_empty());
        assert!(detail.ghost_risk.is_none());
        assert!(detail.salary_estimate.is_none());
    }

    #[test]
    fn test_search_profile_defaults() {
        let profile: SearchProfile = serde_json::from_str(
            r#"{"name": "ops", "query": "operations manager", "location": "Oklahoma City, OK", "boards": ["indeed"]}"#,
        )
        .unwrap();
        assert!(profile.enabled);
        assert_eq!(profile.radius_miles, 30);
        assert_eq!(profile.salary_min, 0);
        assert_eq!(profile.boards, vec![Board::Indeed]);
    }
}
