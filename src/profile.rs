//! Candidate profile document: who the candidate is, synthesized once from
//! their resumes and then read by every scoring call.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::llm::{ChatClient, ChatMessage};
use crate::models::CandidateProfile;
use crate::scorer::strip_code_fences;

const RESUME_CHAR_LIMIT: usize = 6_000;

pub fn default_path() -> Result<PathBuf> {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobhunter") {
        Ok(proj_dirs.data_dir().join("candidate_profile.json"))
    } else {
        Ok(PathBuf::from("candidate_profile.json"))
    }
}

/// Load the stored profile; None when it has never been synthesized.
pub fn load() -> Result<Option<CandidateProfile>> {
    load_from(&default_path()?)
}

pub fn load_from(path: &PathBuf) -> Result<Option<CandidateProfile>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read candidate profile: {}", path.display()))?;
    let profile = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse candidate profile: {}", path.display()))?;
    Ok(Some(profile))
}

pub fn save(profile: &CandidateProfile) -> Result<PathBuf> {
    let path = default_path()?;
    save_to(profile, &path)?;
    Ok(path)
}

pub fn save_to(profile: &CandidateProfile, path: &PathBuf) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(profile)?;
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write candidate profile: {}", path.display()))?;
    Ok(())
}

/// Build one profile from every resume at once. Unlike scoring, a response
/// the model mangles is a hard error here: synthesis is interactive and the
/// user can simply rerun it.
pub fn synthesize(chat: &dyn ChatClient, resumes: &[String]) -> Result<CandidateProfile> {
    if resumes.is_empty() {
        return Err(anyhow!("No resume text provided"));
    }
    let prompt = build_synthesis_prompt(resumes);
    info!(resumes = resumes.len(), "synthesizing candidate profile");
    let raw = chat.chat(&[ChatMessage::user(&prompt)])?;
    let cleaned = strip_code_fences(&raw);
    let profile: CandidateProfile = serde_json::from_str(cleaned)
        .map_err(|e| anyhow!("Profile synthesis response was not valid JSON: {e}"))?;
    Ok(profile)
}

fn build_synthesis_prompt(resumes: &[String]) -> String {
    let mut prompt = String::from(
        "You are building a single unified candidate profile from one or more resumes \
         belonging to the same person. Return ONLY valid JSON (no markdown fences, no \
         explanation) with this exact shape:\n\n\
         {\n\
           \"name\": \"...\",\n\
           \"headline\": \"One-line professional headline\",\n\
           \"experience_years\": 0,\n\
           \"experience_level\": \"entry/mid/senior/executive\",\n\
           \"core_strengths\": [\"...\"],\n\
           \"all_skills\": [\"...\"],\n\
           \"industries\": [\"...\"],\n\
           \"target_roles\": [\"...\"],\n\
           \"work_history\": [{\"title\": \"...\", \"company\": \"...\", \"duration\": \"...\", \"highlights\": [\"...\"]}],\n\
           \"education\": [\"...\"],\n\
           \"unique_value\": \"What sets this candidate apart\",\n\
           \"gaps\": [\"weakness or missing credential\"]\n\
         }\n",
    );
    for (i, resume) in resumes.iter().enumerate() {
        let truncated: String = resume.chars().take(RESUME_CHAR_LIMIT).collect();
        prompt.push_str(&format!("\nRESUME {}:\n{}\n", i + 1, truncated));
    }
    prompt
}
