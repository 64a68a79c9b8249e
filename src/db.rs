use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

use crate::models::{Posting, PostingStatus, RawPosting, RunRecord, ScoreDetail};

/// Outcome of a URL-keyed upsert. Skipped means a row with that URL already
/// exists; the existing row is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted(i64),
    Skipped,
}

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open() -> Result<Self> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        Ok(Self { conn, path })
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    #[cfg(test)]
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn default_path() -> Result<PathBuf> {
        // XDG data directory or fallback to cwd
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobhunter") {
            Ok(proj_dirs.data_dir().join("jobs.db"))
        } else {
            Ok(PathBuf::from("jobs.db"))
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT,
                source TEXT NOT NULL,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                company TEXT,
                location TEXT,
                salary_min REAL,
                salary_max REAL,
                salary_text TEXT,
                description TEXT,
                posted_date TEXT,
                scraped_at TEXT,
                score INTEGER,
                score_details TEXT,
                pros TEXT,
                cons TEXT,
                fit_summary TEXT,
                summary TEXT,
                ghost_risk TEXT,
                keyword_match TEXT,
                salary_estimate TEXT,
                status TEXT NOT NULL DEFAULT 'new',
                notified INTEGER NOT NULL DEFAULT 0,
                notes TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS scrape_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                jobs_found INTEGER NOT NULL DEFAULT 0,
                jobs_new INTEGER NOT NULL DEFAULT 0,
                jobs_scored INTEGER NOT NULL DEFAULT 0,
                notifications_sent INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'running',
                error TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_url ON jobs(url);
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_score ON jobs(score DESC);
            CREATE INDEX IF NOT EXISTS idx_jobs_source ON jobs(source);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='jobs'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!("Database not initialized. Run 'jobhunter init' first."));
        }
        Ok(())
    }

    // --- Posting operations ---

    /// Insert keyed by URL. If a row with the same URL exists, the insert is
    /// skipped and the existing row is NOT refreshed.
    pub fn upsert_posting(&self, posting: &RawPosting) -> Result<Upsert> {
        let existing: Option<i64> = self
            .conn
            .query_row("SELECT id FROM jobs WHERE url = ?1", [&posting.url], |row| {
                row.get(0)
            })
            .optional()?;

        if existing.is_some() {
            return Ok(Upsert::Skipped);
        }

        self.conn.execute(
            "INSERT INTO jobs (external_id, source, url, title, company, location,
                               salary_min, salary_max, salary_text, description,
                               posted_date, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                posting.external_id,
                posting.source.as_str(),
                posting.url,
                posting.title,
                posting.company,
                posting.location,
                posting.salary_min,
                posting.salary_max,
                posting.salary_text,
                posting.description,
                posting.posted_date,
                posting.scraped_at,
            ],
        )?;
        Ok(Upsert::Inserted(self.conn.last_insert_rowid()))
    }

    const POSTING_COLUMNS: &'static str = "id, external_id, source, url, title, company, location,
         salary_min, salary_max, salary_text, description, posted_date, scraped_at,
         score, pros, cons, fit_summary, summary, ghost_risk, salary_estimate,
         status, notified, notes, created_at, updated_at";

    pub fn get_posting(&self, id: i64) -> Result<Option<Posting>> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", Self::POSTING_COLUMNS);
        self.conn
            .query_row(&sql, [id], Self::row_to_posting)
            .optional()
            .context("Failed to load posting")
    }

    pub fn list_postings(
        &self,
        status: Option<&str>,
        source: Option<&str>,
        min_score: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Posting>> {
        let mut sql = format!("SELECT {} FROM jobs WHERE 1=1", Self::POSTING_COLUMNS);
        let mut args: Vec<String> = Vec::new();

        if let Some(s) = status {
            sql.push_str(&format!(" AND status = ?{}", args.len() + 1));
            args.push(s.to_string());
        } else {
            // Hide archived unless explicitly asked for
            sql.push_str(" AND status != 'archived'");
        }
        if let Some(src) = source {
            sql.push_str(&format!(" AND source = ?{}", args.len() + 1));
            args.push(src.to_string());
        }
        if let Some(min) = min_score {
            sql.push_str(&format!(" AND (score >= ?{} OR score IS NULL)", args.len() + 1));
            args.push(min.to_string());
        }

        // Scored first, NULL scores at the bottom, newest first within a score
        sql.push_str(
            " ORDER BY CASE WHEN score IS NULL THEN 1 ELSE 0 END, score DESC, created_at DESC",
        );
        sql.push_str(&format!(" LIMIT {}", limit));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter()),
            Self::row_to_posting,
        )?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list postings")
    }

    pub fn unscored_postings(&self) -> Result<Vec<Posting>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE score IS NULL ORDER BY id",
            Self::POSTING_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_posting)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list unscored postings")
    }

    pub fn all_postings(&self) -> Result<Vec<Posting>> {
        let sql = format!("SELECT {} FROM jobs ORDER BY id", Self::POSTING_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_posting)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list postings")
    }

    pub fn postings_by_ids(&self, ids: &[i64]) -> Result<Vec<Posting>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(posting) = self.get_posting(*id)? {
                out.push(posting);
            }
        }
        Ok(out)
    }

    /// Scored, not-yet-notified postings, candidates for the notify phase.
    pub fn notify_candidates(&self) -> Result<Vec<Posting>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE score IS NOT NULL AND notified = 0 ORDER BY score DESC",
            Self::POSTING_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_posting)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list notify candidates")
    }

    pub fn store_score(&self, id: i64, detail: &ScoreDetail) -> Result<()> {
        let details_json = serde_json::to_string(detail)?;
        self.conn.execute(
            "UPDATE jobs SET score = ?1, pros = ?2, cons = ?3, fit_summary = ?4,
                             score_details = ?5, summary = ?6, ghost_risk = ?7,
                             keyword_match = ?8, salary_estimate = ?9,
                             updated_at = datetime('now')
             WHERE id = ?10",
            params![
                detail.score,
                serde_json::to_string(&detail.pros)?,
                serde_json::to_string(&detail.cons)?,
                detail.fit_summary,
                details_json,
                detail.summary,
                detail.ghost_risk.map(|g| g.as_str()),
                serde_json::to_string(&detail.keyword_match)?,
                detail.salary_estimate,
                id,
            ],
        )?;
        Ok(())
    }

    /// Set once after a successful delivery; postings are never re-alerted.
    pub fn mark_notified(&self, id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE jobs SET notified = 1, updated_at = datetime('now') WHERE id = ?1",
            [id],
        )?;
        Ok(())
    }

    pub fn set_status(&self, id: i64, status: PostingStatus) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE jobs SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(changed > 0)
    }

    pub fn set_notes(&self, id: i64, notes: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE jobs SET notes = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![notes, id],
        )?;
        Ok(changed > 0)
    }

    fn row_to_posting(row: &rusqlite::Row) -> rusqlite::Result<Posting> {
        let pros: Option<String> = row.get(14)?;
        let cons: Option<String> = row.get(15)?;
        Ok(Posting {
            id: row.get(0)?,
            external_id: row.get(1)?,
            source: row.get(2)?,
            url: row.get(3)?,
            title: row.get(4)?,
            company: row.get(5)?,
            location: row.get(6)?,
            salary_min: row.get(7)?,
            salary_max: row.get(8)?,
            salary_text: row.get(9)?,
            description: row.get(10)?,
            posted_date: row.get(11)?,
            scraped_at: row.get(12)?,
            score: row.get(13)?,
            pros: parse_string_list(pros.as_deref()),
            cons: parse_string_list(cons.as_deref()),
            fit_summary: row.get(16)?,
            summary: row.get(17)?,
            ghost_risk: row.get(18)?,
            salary_estimate: row.get(19)?,
            status: row.get(20)?,
            notified: row.get::<_, i64>(21)? != 0,
            notes: row.get(22)?,
            created_at: row.get(23)?,
            updated_at: row.get(24)?,
        })
    }

    // --- Run records ---

    pub fn start_run(&self) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO scrape_runs (started_at, status) VALUES (datetime('now'), 'running')",
            [],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn finish_run(
        &self,
        run_id: i64,
        jobs_found: i64,
        jobs_new: i64,
        jobs_scored: i64,
        notifications_sent: i64,
        status: &str,
        error: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE scrape_runs SET completed_at = datetime('now'),
                 jobs_found = ?1, jobs_new = ?2, jobs_scored = ?3,
                 notifications_sent = ?4, status = ?5, error = ?6
             WHERE id = ?7",
            params![jobs_found, jobs_new, jobs_scored, notifications_sent, status, error, run_id],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: i64) -> Result<Option<RunRecord>> {
        self.conn
            .query_row(
                "SELECT id, started_at, completed_at, jobs_found, jobs_new, jobs_scored,
                        notifications_sent, status, error
                 FROM scrape_runs WHERE id = ?1",
                [run_id],
                Self::row_to_run,
            )
            .optional()
            .context("Failed to load run record")
    }

    pub fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, completed_at, jobs_found, jobs_new, jobs_scored,
                    notifications_sent, status, error
             FROM scrape_runs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], Self::row_to_run)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list runs")
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<RunRecord> {
        Ok(RunRecord {
            id: row.get(0)?,
            started_at: row.get(1)?,
            completed_at: row.get(2)?,
            jobs_found: row.get(3)?,
            jobs_new: row.get(4)?,
            jobs_scored: row.get(5)?,
            notifications_sent: row.get(6)?,
            status: row.get(7)?,
            error: row.get(8)?,
        })
    }
}

fn parse_string_list(json: Option<&str>) -> Vec<String> {
    json.and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Board;

    fn sample(url: &str, title: &str) -> RawPosting {
        let mut p = RawPosting::new(Board::Indeed, title, url);
        p.company = Some("Acme Corp".to_string());
        p
    }

    #[test]
    fn test_upsert_same_url_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let first = db
            .upsert_posting(&sample("https://board.example/job/123", "Operations Manager"))
            .unwrap();
        let id = match first {
            Upsert::Inserted(id) => id,
            Upsert::Skipped => panic!("first upsert must insert"),
        };

        let second = db
            .upsert_posting(&sample("https://board.example/job/123", "Operations Manager"))
            .unwrap();
        assert_eq!(second, Upsert::Skipped);

        let all = db.all_postings().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
    }

    #[test]
    fn test_upsert_keeps_first_seen_fields() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_posting(&sample("https://board.example/job/123", "Operations Manager"))
            .unwrap();
        // Re-scrape with a different title: insert is skipped, nothing refreshed
        let second = db
            .upsert_posting(&sample("https://board.example/job/123", "Ops Manager II"))
            .unwrap();
        assert_eq!(second, Upsert::Skipped);

        let stored = db.all_postings().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Operations Manager");
    }

    #[test]
    fn test_different_urls_stay_distinct_even_with_same_title() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_posting(&sample("https://a.example/1", "Operations Manager"))
            .unwrap();
        db.upsert_posting(&sample("https://b.example/2", "Operations Manager"))
            .unwrap();
        assert_eq!(db.all_postings().unwrap().len(), 2);
    }

    #[test]
    fn test_store_score_and_unscored_query() {
        let db = Database::open_in_memory().unwrap();
        let Upsert::Inserted(id) = db
            .upsert_posting(&sample("https://a.example/1", "Facility Manager"))
            .unwrap()
        else {
            panic!("insert expected");
        };

        assert_eq!(db.unscored_postings().unwrap().len(), 1);

        let detail = ScoreDetail {
            score: 72,
            pros: vec!["close to home".into()],
            cons: vec!["salary unclear".into()],
            fit_summary: "Decent fit.".into(),
            ..Default::default()
        };
        db.store_score(id, &detail).unwrap();

        assert!(db.unscored_postings().unwrap().is_empty());
        let stored = db.get_posting(id).unwrap().unwrap();
        assert_eq!(stored.score, Some(72));
        assert_eq!(stored.pros, vec!["close to home".to_string()]);
        assert_eq!(stored.fit_summary.as_deref(), Some("Decent fit."));
    }

    #[test]
    fn test_mark_notified_removes_from_candidates() {
        let db = Database::open_in_memory().unwrap();
        let Upsert::Inserted(id) = db
            .upsert_posting(&sample("https://a.example/1", "NOC Technician"))
            .unwrap()
        else {
            panic!("insert expected");
        };
        db.store_score(id, &ScoreDetail { score: 85, ..Default::default() })
            .unwrap();

        assert_eq!(db.notify_candidates().unwrap().len(), 1);
        db.mark_notified(id).unwrap();
        assert!(db.notify_candidates().unwrap().is_empty());

        // Re-scoring later does not clear the flag
        db.store_score(id, &ScoreDetail { score: 95, ..Default::default() })
            .unwrap();
        assert!(db.notify_candidates().unwrap().is_empty());
    }

    #[test]
    fn test_run_record_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let run_id = db.start_run().unwrap();
        let running = db.get_run(run_id).unwrap().unwrap();
        assert_eq!(running.status, "running");
        assert!(running.completed_at.is_none());

        db.finish_run(run_id, 12, 5, 5, 2, "error", Some("Profile 'ops': boom"))
            .unwrap();
        let finished = db.get_run(run_id).unwrap().unwrap();
        assert_eq!(finished.status, "error");
        assert_eq!(finished.jobs_found, 12);
        assert_eq!(finished.jobs_new, 5);
        assert_eq!(finished.notifications_sent, 2);
        assert_eq!(finished.error.as_deref(), Some("Profile 'ops': boom"));
        assert!(finished.completed_at.is_some());
    }

    #[test]
    fn test_set_status_and_notes() {
        let db = Database::open_in_memory().unwrap();
        let Upsert::Inserted(id) = db
            .upsert_posting(&sample("https://a.example/1", "Data Center Tech"))
            .unwrap()
        else {
            panic!("insert expected");
        };

        assert!(db.set_status(id, PostingStatus::Applied).unwrap());
        assert!(db.set_notes(id, "phone screen Friday").unwrap());
        let stored = db.get_posting(id).unwrap().unwrap();
        assert_eq!(stored.status, "applied");
        assert_eq!(stored.notes.as_deref(), Some("phone screen Friday"));

        assert!(!db.set_status(9999, PostingStatus::Applied).unwrap());
    }
}
