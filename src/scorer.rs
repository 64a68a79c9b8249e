use anyhow::Result;
use serde::Deserialize;
use tracing::{info, warn};

use crate::db::Database;
use crate::llm::{ChatClient, ChatMessage};
use crate::models::{CandidateProfile, GapEntry, GhostRisk, KeywordMatch, Posting, ScoreDetail};
use crate::settings::Settings;

/// Result of scoring one posting. Degraded carries the raw LLM text when the
/// verdict could not be decoded; it is never silently dressed up as a normal
/// score.
#[derive(Debug, Clone)]
pub enum ScoreOutcome {
    Scored(ScoreDetail),
    Dealbreaker { keyword: String },
    Degraded { raw: String },
}

impl ScoreOutcome {
    /// Flatten to the persisted form.
    pub fn into_detail(self) -> ScoreDetail {
        match self {
            ScoreOutcome::Scored(detail) => detail,
            ScoreOutcome::Dealbreaker { keyword } => ScoreDetail {
                score: 0,
                cons: vec![format!("Dealbreaker: contains '{}'", keyword)],
                fit_summary: format!(
                    "Auto-rejected: job contains dealbreaker keyword '{}'.",
                    keyword
                ),
                ..Default::default()
            },
            ScoreOutcome::Degraded { raw } => ScoreDetail {
                score: 0,
                cons: vec!["Failed to parse scoring response".to_string()],
                fit_summary: truncate_chars(&raw, 200),
                ..Default::default()
            },
        }
    }
}

/// Score one posting against the candidate profile. Dealbreakers short-circuit
/// before any LLM call; a malformed verdict degrades instead of erroring.
/// Only transport-level chat failures surface as Err.
pub fn score_posting(
    posting: &Posting,
    profile: &CandidateProfile,
    settings: &Settings,
    chat: &dyn ChatClient,
) -> Result<ScoreOutcome> {
    let haystack = format!(
        "{} {} {}",
        posting.title,
        posting.description.as_deref().unwrap_or(""),
        posting.company.as_deref().unwrap_or("")
    )
    .to_lowercase();

    for dealbreaker in &settings.candidate_dealbreakers {
        if !dealbreaker.is_empty() && haystack.contains(&dealbreaker.to_lowercase()) {
            return Ok(ScoreOutcome::Dealbreaker {
                keyword: dealbreaker.clone(),
            });
        }
    }

    let prompt = build_scoring_prompt(posting, profile, settings);
    let raw = chat.chat(&[ChatMessage::user(prompt)])?;

    match parse_verdict(&raw) {
        Ok(detail) => Ok(ScoreOutcome::Scored(detail)),
        Err(_) => Ok(ScoreOutcome::Degraded { raw }),
    }
}

fn build_scoring_prompt(
    posting: &Posting,
    profile: &CandidateProfile,
    settings: &Settings,
) -> String {
    let description = posting.description.as_deref().unwrap_or("");
    let description: String = description.chars().take(3000).collect();

    let technical_projects = if settings.candidate_technical_projects.is_empty() {
        String::new()
    } else {
        format!(
            "Technical Projects/Homelab: {}\n",
            settings.candidate_technical_projects
        )
    };

    let salary_range = if settings.candidate_salary_max == 0 {
        format!("${}+ (flexible on upper)", settings.candidate_salary_min)
    } else {
        format!(
            "${} - ${}",
            settings.candidate_salary_min, settings.candidate_salary_max
        )
    };

    format!(
        r#"You are a job match analyst. Score how well this job matches the candidate on a scale of 0-100.

CANDIDATE PROFILE:
Name: {name}
Headline: {headline}
Experience: {years}+ years, {level} level
Core Strengths: {strengths}
Skills: {skills}
Industries: {industries}
Target Roles: {target_roles}
Unique Value: {unique_value}
{technical_projects}
SEARCH PREFERENCES:
Preferred Location: {pref_location} (within {pref_radius} miles)
Salary Range: {salary_range}
Work Mode: {work_mode}
Target Roles: {pref_roles}
Target Industries: {pref_industries}
Nice-to-Haves: {nice_to_haves}
Max Travel: {travel}%

JOB POSTING:
Title: {job_title}
Company: {job_company}
Location: {job_location}
Salary: {job_salary}
Source: {job_source}
Description:
{job_description}

SCORING GUIDE:
- 90-100: Perfect match - right role, right location, right pay, strong skill overlap
- 70-89: Strong match - most criteria met, worth applying
- 50-69: Moderate match - some fit, might be a stretch or compromise
- 30-49: Weak match - significant gaps or misalignment
- 0-29: Poor match - wrong field, wrong location, or doesn't fit at all

CRITICAL RULES (override the scale above):
- If the job requires a specific professional license the candidate does NOT have (pharmacist, nurse, RN, LPN, CPA, PE, attorney, CDL, etc.), score 0-10 regardless of other factors.
- If the job is in a completely unrelated field, score 0-20.
- If the job title is clearly a different profession, score 0-15.
- Only score above 60 if the candidate could genuinely perform this job with their actual experience.
- Be skeptical. When in doubt, score lower. A false positive wastes the candidate's time.

ALSO PROVIDE:
- "summary": A 2-sentence summary of the role. Write for a job seeker scanning 50 listings - be specific, not generic.
- "ghost_risk": Assess if this might be a ghost/fake job. Return "low", "medium", or "high".
- "keyword_match": Extract the top 10-12 most important required skills/tools/qualifications from the posting. For each, check if the candidate's profile contains a match. Category is one of "hard_skill", "soft_skill", "tool", "certification".
- "gaps": List 3-5 specific gaps between the candidate and this role, each with a transferable skill that partially covers it (or empty string).
- "salary_estimate": If the posting does NOT list a salary, estimate the likely annual range as a string like "$65,000 - $85,000"; return null if salary IS listed.

Return ONLY valid JSON (no markdown fences):
{{"score": 0, "pros": ["pro 1", "pro 2", "pro 3"], "cons": ["con 1", "con 2"], "fit_summary": "One sentence.", "summary": "Two sentences.", "ghost_risk": "low", "keyword_match": [{{"keyword": "Project Management", "category": "hard_skill", "matched": true}}], "gaps": [{{"gap": "PMP certification", "transferable": "20 years of project coordination"}}], "salary_estimate": "$65,000 - $85,000"}}"#,
        name = profile.name,
        headline = profile.headline,
        years = profile.experience_years,
        level = profile.experience_level,
        strengths = profile.core_strengths.join(", "),
        skills = profile.all_skills.iter().take(20).cloned().collect::<Vec<_>>().join(", "),
        industries = profile.industries.join(", "),
        target_roles = profile.target_roles.join(", "),
        unique_value = profile.unique_value,
        technical_projects = technical_projects,
        pref_location = settings.candidate_location,
        pref_radius = settings.candidate_radius_miles,
        salary_range = salary_range,
        work_mode = settings.candidate_work_mode,
        pref_roles = join_or(&settings.candidate_target_roles, "See candidate profile"),
        pref_industries = join_or(&settings.candidate_target_industries, "See candidate profile"),
        nice_to_haves = join_or(&settings.candidate_nice_to_haves, "None specified"),
        travel = settings.candidate_willing_to_travel,
        job_title = posting.title,
        job_company = posting.company.as_deref().unwrap_or("Unknown"),
        job_location = posting.location.as_deref().unwrap_or("Unknown"),
        job_salary = posting.salary_text.as_deref().unwrap_or("Not listed"),
        job_source = posting.source,
        job_description = description,
    )
}

fn join_or(items: &[String], fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items.join(", ")
    }
}

/// Strip optional ``` fences some models wrap JSON in.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    // Drop the opening fence line (which may carry a language tag)
    let body = match trimmed.split_once('\n') {
        Some((_, rest)) => rest,
        None => return trimmed,
    };
    let body = body.trim_end();
    body.strip_suffix("```").map(str::trim_end).unwrap_or(body)
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default, deserialize_with = "de_score")]
    score: i64,
    #[serde(default)]
    pros: Vec<String>,
    #[serde(default)]
    cons: Vec<String>,
    #[serde(default)]
    fit_summary: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    ghost_risk: Option<String>,
    #[serde(default)]
    keyword_match: Vec<KeywordMatch>,
    #[serde(default)]
    gaps: Vec<GapEntry>,
    #[serde(default)]
    salary_estimate: Option<String>,
}

// Models return scores as ints, floats, or quoted integers; anything else
// fails the decode and degrades the verdict.
fn de_score<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(|f| f.trunc() as i64)
            .ok_or_else(|| D::Error::custom("non-finite score")),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| D::Error::custom("non-integer score string")),
        other => Err(D::Error::custom(format!("unexpected score type: {}", other))),
    }
}

/// Decode a scoring verdict. The score is clamped to [0, 100].
pub fn parse_verdict(raw: &str) -> Result<ScoreDetail> {
    let cleaned = strip_code_fences(raw);
    let verdict: RawVerdict = serde_json::from_str(cleaned)?;

    let ghost_risk = verdict.ghost_risk.as_deref().and_then(|g| match g {
        "low" => Some(GhostRisk::Low),
        "medium" => Some(GhostRisk::Medium),
        "high" => Some(GhostRisk::High),
        _ => None,
    });

    Ok(ScoreDetail {
        score: verdict.score.clamp(0, 100),
        pros: verdict.pros,
        cons: verdict.cons,
        fit_summary: verdict.fit_summary,
        summary: verdict.summary,
        ghost_risk,
        keyword_match: verdict.keyword_match,
        gaps: verdict.gaps,
        salary_estimate: verdict.salary_estimate,
    })
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[derive(Debug, Default)]
pub struct ScoreSummary {
    pub scored: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Score a batch of postings: an explicit id list, all unscored rows, or
/// every row when force is set. Each row is scored and persisted on its own;
/// one failure never aborts the batch.
pub fn score_batch(
    db: &Database,
    chat: &dyn ChatClient,
    settings: &Settings,
    profile: &CandidateProfile,
    ids: Option<&[i64]>,
    force: bool,
) -> Result<ScoreSummary> {
    let postings = match ids {
        Some(ids) => db.postings_by_ids(ids)?,
        None if force => db.all_postings()?,
        None => db.unscored_postings()?,
    };

    let mut summary = ScoreSummary::default();

    for posting in &postings {
        if posting.score.is_some() && !force {
            summary.skipped += 1;
            continue;
        }

        match score_posting(posting, profile, settings, chat) {
            Ok(outcome) => {
                let detail = outcome.into_detail();
                info!(id = posting.id, score = detail.score, title = %posting.title, "scored posting");
                match db.store_score(posting.id, &detail) {
                    Ok(()) => summary.scored += 1,
                    Err(e) => summary
                        .errors
                        .push(format!("Job {} ({}): {}", posting.id, posting.title, e)),
                }
            }
            Err(e) => {
                warn!(id = posting.id, error = %e, "scoring failed");
                summary
                    .errors
                    .push(format!("Job {} ({}): {}", posting.id, posting.title, e));
            }
        }
    }

    Ok(summary)
}
