//! The full campaign: scrape every enabled profile across its boards, score
//! whatever is new, push alerts for anything that clears the bar. Each phase
//! is fault-isolated; errors are collected into the run record instead of
//! aborting the run.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::boards::{PageFetcher, scrape_board};
use crate::db::{Database, Upsert};
use crate::filter::{ExclusionRules, exclusion_reason};
use crate::llm::ChatClient;
use crate::models::{CandidateProfile, RunRecord, ScoreDetail};
use crate::notifier::{Pusher, build_notification};
use crate::scorer::score_batch;
use crate::settings::Settings;

pub struct RunOutcome {
    pub record: RunRecord,
    pub excluded: usize,
}

/// Execute one scrape-score-notify cycle and record it in scrape_runs.
///
/// `chat` and `candidate` are both required for scoring; when either is
/// absent the scoring phase is skipped and recorded as an error. `pusher` is
/// optional so a run without configured notification credentials still
/// scrapes and scores.
pub fn run_campaign(
    db: &Database,
    settings: &Settings,
    fetcher: &dyn PageFetcher,
    chat: Option<&dyn ChatClient>,
    pusher: Option<&dyn Pusher>,
    candidate: Option<&CandidateProfile>,
) -> Result<RunOutcome> {
    let run_id = db.start_run()?;
    let mut errors: Vec<String> = Vec::new();

    // Phase 1: scrape
    let rules = ExclusionRules::from_settings(settings);
    let mut jobs_found = 0i64;
    let mut jobs_new = 0i64;
    let mut excluded = 0usize;

    let profiles = settings.enabled_profiles();
    for (p_idx, profile) in profiles.iter().enumerate() {
        for (b_idx, board) in profile.boards.iter().enumerate() {
            info!(profile = %profile.name, board = %board, "starting board scrape");
            match scrape_board(*board, fetcher, profile, settings) {
                Ok(batch) => {
                    jobs_found += batch.len() as i64;
                    for raw in &batch {
                        if let Some(reason) = exclusion_reason(raw, &rules) {
                            excluded += 1;
                            info!(title = %raw.title, %reason, "posting excluded");
                            continue;
                        }
                        match db.upsert_posting(raw) {
                            Ok(Upsert::Inserted(_)) => jobs_new += 1,
                            Ok(Upsert::Skipped) => {}
                            Err(e) => {
                                errors.push(format!("{board}: failed to store posting: {e:#}"));
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(profile = %profile.name, board = %board, error = %format!("{e:#}"), "board scrape failed");
                    errors.push(format!("{board} ({}): {e:#}", profile.name));
                }
            }
            let last_board = b_idx + 1 == profile.boards.len();
            let last_profile = p_idx + 1 == profiles.len();
            if !(last_board && last_profile) {
                fetcher.pause(5, 12);
            }
        }
    }
    info!(jobs_found, jobs_new, excluded, "scrape phase complete");

    // Phase 2: score
    let mut jobs_scored = 0i64;
    match (candidate, chat) {
        (Some(candidate), Some(chat)) => {
            match score_batch(db, chat, settings, candidate, None, false) {
                Ok(summary) => {
                    jobs_scored = summary.scored as i64;
                    errors.extend(summary.errors);
                }
                Err(e) => errors.push(format!("scoring phase failed: {e:#}")),
            }
        }
        (None, _) => {
            warn!("no candidate profile, skipping scoring phase");
            errors.push("scoring skipped: no candidate profile".to_string());
        }
        (_, None) => {
            warn!("no LLM client, skipping scoring phase");
            errors.push("scoring skipped: LLM provider not configured".to_string());
        }
    }

    // Phase 3: notify
    let mut notifications_sent = 0i64;
    match pusher {
        Some(pusher) => {
            let candidates = match db.notify_candidates() {
                Ok(candidates) => candidates,
                Err(e) => {
                    errors.push(format!("notify phase failed: {e:#}"));
                    Vec::new()
                }
            };
            for posting in candidates {
                let detail = ScoreDetail {
                    score: posting.score.unwrap_or(0),
                    pros: posting.pros.clone(),
                    cons: posting.cons.clone(),
                    fit_summary: posting.fit_summary.clone().unwrap_or_default(),
                    ..ScoreDetail::default()
                };
                let Some(notification) = build_notification(&posting, &detail, settings) else {
                    continue;
                };
                match pusher.push(&notification) {
                    Ok(()) => match db.mark_notified(posting.id) {
                        Ok(()) => notifications_sent += 1,
                        Err(e) => {
                            errors.push(format!(
                                "failed to record notification for job {}: {e:#}",
                                posting.id
                            ));
                        }
                    },
                    Err(e) => {
                        errors.push(format!("notification for job {} failed: {e:#}", posting.id));
                    }
                }
            }
        }
        None => info!("notifications not configured, skipping notify phase"),
    }

    let status = if errors.is_empty() { "completed" } else { "error" };
    let joined = if errors.is_empty() {
        None
    } else {
        Some(errors.join("; "))
    };
    db.finish_run(
        run_id,
        jobs_found,
        jobs_new,
        jobs_scored,
        notifications_sent,
        status,
        joined.as_deref(),
    )?;
    info!(run_id, status, jobs_found, jobs_new, jobs_scored, notifications_sent, "run complete");

    let record = db
        .get_run(run_id)?
        .context("run record vanished after finish")?;
    Ok(RunOutcome { record, excluded })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boards::test_support::StubFetcher;
    use crate::llm::ChatMessage;
    use crate::models::{Board, SearchProfile};
    use crate::notifier::Notification;
    use std::cell::RefCell;

    struct StubChat {
        reply: String,
    }

    impl ChatClient for StubChat {
        fn chat(&self, _messages: &[ChatMessage]) -> Result<String> {
            Ok(self.reply.clone())
        }
    }

    #[derive(Default)]
    struct StubPusher {
        sent: RefCell<Vec<Notification>>,
        fail: bool,
    }

    impl Pusher for StubPusher {
        fn push(&self, notification: &Notification) -> Result<()> {
            if self.fail {
                anyhow::bail!("pushover returned 400");
            }
            self.sent.borrow_mut().push(notification.clone());
            Ok(())
        }
    }

    fn settings() -> Settings {
        Settings {
            search_profiles: vec![SearchProfile {
                name: "ops".to_string(),
                query: "operations manager".to_string(),
                location: "Oklahoma City, OK".to_string(),
                radius_miles: 30,
                salary_min: 0,
                boards: vec![Board::Indeed, Board::Dice],
                enabled: true,
            }],
            ..Settings::default()
        }
    }

    fn candidate() -> CandidateProfile {
        CandidateProfile {
            name: "Test Candidate".to_string(),
            headline: "Operations leader".to_string(),
            ..CandidateProfile::default()
        }
    }

    const INDEED_PAGE: &str = r#"
        <html><body>
        <div class="job_seen_beacon">
          <h2 class="jobTitle"><a href="/viewjob?jk=a1" data-jk="a1">Operations Manager</a></h2>
          <span data-testid="company-name">Acme</span>
        </div>
        <div class="job_seen_beacon">
          <h2 class="jobTitle"><a href="/viewjob?jk=b2" data-jk="b2">Night Shift Supervisor</a></h2>
          <span data-testid="company-name">Borealis</span>
        </div>
        </body></html>
    "#;

    const VERDICT: &str = r#"{"score": 85, "pros": ["Relevant title"], "cons": [],
        "fit_summary": "Strong match.", "summary": "Ops role.", "ghost_risk": "low",
        "keyword_match": [], "gaps": [], "salary_estimate": null}"#;

    #[test]
    fn test_board_failure_is_recorded_but_run_continues() {
        let db = Database::open_in_memory().unwrap();
        let settings = settings();
        // Indeed serves one page; Dice's first fetch fails.
        let fetcher = StubFetcher::with_pages(vec![
            Ok(INDEED_PAGE.to_string()),
            Err("connection reset".to_string()),
        ]);
        let chat = StubChat { reply: VERDICT.to_string() };
        let pusher = StubPusher::default();
        let candidate = candidate();

        let outcome = run_campaign(&db, &settings, &fetcher, Some(&chat), Some(&pusher), Some(&candidate))
            .unwrap();
        let record = outcome.record;

        assert_eq!(record.status, "error");
        let error = record.error.unwrap();
        assert!(error.contains("dice"), "error should name the failed board: {error}");
        assert_eq!(record.jobs_found, 2);
        assert_eq!(record.jobs_new, 2);
        // Scoring still ran despite the scrape error.
        assert_eq!(record.jobs_scored, 2);
        assert_eq!(record.notifications_sent, 2);
        assert_eq!(pusher.sent.borrow().len(), 2);
    }

    #[test]
    fn test_clean_run_is_completed_and_second_run_finds_nothing_new() {
        let db = Database::open_in_memory().unwrap();
        let mut settings = settings();
        settings.search_profiles[0].boards = vec![Board::Indeed];
        let chat = StubChat { reply: VERDICT.to_string() };
        let pusher = StubPusher::default();
        let candidate = candidate();

        let fetcher = StubFetcher::serving(INDEED_PAGE);
        let first = run_campaign(&db, &settings, &fetcher, Some(&chat), Some(&pusher), Some(&candidate))
            .unwrap()
            .record;
        assert_eq!(first.status, "completed");
        assert!(first.error.is_none());
        assert_eq!(first.jobs_new, 2);

        let fetcher = StubFetcher::serving(INDEED_PAGE);
        let second = run_campaign(&db, &settings, &fetcher, Some(&chat), Some(&pusher), Some(&candidate))
            .unwrap()
            .record;
        assert_eq!(second.jobs_found, 2);
        assert_eq!(second.jobs_new, 0);
        assert_eq!(second.jobs_scored, 0);
        // Everything was already notified on the first pass.
        assert_eq!(second.notifications_sent, 0);
        assert_eq!(pusher.sent.borrow().len(), 2);
    }

    #[test]
    fn test_exclusion_rules_keep_postings_out_of_the_db() {
        let db = Database::open_in_memory().unwrap();
        let mut settings = settings();
        settings.search_profiles[0].boards = vec![Board::Indeed];
        settings.exclude_title_keywords = vec!["night shift".to_string()];
        let chat = StubChat { reply: VERDICT.to_string() };
        let candidate = candidate();

        let fetcher = StubFetcher::serving(INDEED_PAGE);
        let outcome =
            run_campaign(&db, &settings, &fetcher, Some(&chat), None, Some(&candidate)).unwrap();

        assert_eq!(outcome.excluded, 1);
        assert_eq!(outcome.record.jobs_found, 2);
        assert_eq!(outcome.record.jobs_new, 1);
        assert_eq!(db.all_postings().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_candidate_profile_skips_scoring_and_marks_run_errored() {
        let db = Database::open_in_memory().unwrap();
        let mut settings = settings();
        settings.search_profiles[0].boards = vec![Board::Indeed];
        let chat = StubChat { reply: VERDICT.to_string() };

        let fetcher = StubFetcher::serving(INDEED_PAGE);
        let record = run_campaign(&db, &settings, &fetcher, Some(&chat), None, None)
            .unwrap()
            .record;

        assert_eq!(record.status, "error");
        assert_eq!(record.jobs_scored, 0);
        assert!(record.error.unwrap().contains("candidate profile"));
    }

    #[test]
    fn test_failed_push_leaves_posting_unnotified() {
        let db = Database::open_in_memory().unwrap();
        let mut settings = settings();
        settings.search_profiles[0].boards = vec![Board::Indeed];
        let chat = StubChat { reply: VERDICT.to_string() };
        let pusher = StubPusher { fail: true, ..StubPusher::default() };
        let candidate = candidate();

        let fetcher = StubFetcher::serving(INDEED_PAGE);
        let record = run_campaign(&db, &settings, &fetcher, Some(&chat), Some(&pusher), Some(&candidate))
            .unwrap()
            .record;

        assert_eq!(record.notifications_sent, 0);
        assert_eq!(record.status, "error");
        // Still eligible next run.
        assert_eq!(db.notify_candidates().unwrap().len(), 2);
    }

    #[test]
    fn test_jobs_table_failure_still_finalizes_the_run_record() {
        let db = Database::open_in_memory().unwrap();
        let mut settings = settings();
        settings.search_profiles[0].boards = vec![Board::Indeed];
        let chat = StubChat { reply: VERDICT.to_string() };
        let pusher = StubPusher::default();
        let candidate = candidate();

        // Every jobs-table access fails; the run record must still be closed.
        db.execute_batch("DROP TABLE jobs").unwrap();

        let fetcher = StubFetcher::serving(INDEED_PAGE);
        let record = run_campaign(&db, &settings, &fetcher, Some(&chat), Some(&pusher), Some(&candidate))
            .unwrap()
            .record;

        assert_eq!(record.status, "error");
        assert!(record.completed_at.is_some(), "run must not stay open");
        assert_eq!(record.notifications_sent, 0);
        let error = record.error.unwrap_or_default();
        assert!(error.contains("failed to store posting"), "{error}");
        assert!(error.contains("notify phase failed"), "{error}");
        assert!(pusher.sent.borrow().is_empty());
    }
}
