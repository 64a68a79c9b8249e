mod boards;
mod db;
mod filter;
mod llm;
mod models;
mod notifier;
mod pipeline;
mod profile;
mod scorer;
mod settings;

use anyhow::{Context, Result, anyhow};
use boards::PageFetcher;
use clap::{Parser, Subcommand};
use db::Database;
use llm::{ChatMessage, LlmClient};
use models::PostingStatus;
use notifier::{Notification, Pusher, PushoverClient};
use settings::Settings;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "jobhunter")]
#[command(about = "Job search automation - scrape boards, score with AI, get alerts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and settings file
    Init,

    /// Run the full pipeline: scrape, score, notify
    Run,

    /// Scrape all enabled search profiles without scoring
    Scrape,

    /// Score postings against the candidate profile
    Score {
        /// Specific posting IDs (default: all unscored)
        #[arg(long, value_delimiter = ',')]
        ids: Option<Vec<i64>>,

        /// Re-score postings that already have a score
        #[arg(long)]
        force: bool,
    },

    /// Send alerts for scored postings that clear the thresholds
    Notify,

    /// Inspect stored postings
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Show recent pipeline runs
    Runs {
        /// Number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Manage the candidate profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Inspect settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },

    /// Send a test prompt to the configured LLM
    TestLlm,

    /// Send a test push notification
    TestNotify,
}

#[derive(Subcommand)]
enum JobCommands {
    /// List postings
    List {
        /// Filter by status (new, interested, applied, ...)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by board name
        #[arg(long)]
        source: Option<String>,

        /// Only postings scoring at least this
        #[arg(long)]
        min_score: Option<i64>,

        /// Number of postings to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show full details for one posting
    Show {
        /// Posting ID
        id: i64,
    },

    /// Set a posting's status
    Status {
        /// Posting ID
        id: i64,

        /// New status (new, interested, applied, interviewing, rejected, offer, accepted, archived)
        status: String,
    },

    /// Attach a note to a posting
    Note {
        /// Posting ID
        id: i64,

        /// Note text
        text: String,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Build the candidate profile from resume text files
    Synthesize {
        /// Paths to plain-text resume files
        files: Vec<std::path::PathBuf>,
    },

    /// Show the stored candidate profile
    Show,
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Print the current settings as JSON
    Show,

    /// Print the settings file path
    Path,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("jobhunter=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let db = Database::open()?;
            db.init()?;
            println!("Database initialized at {}", db.path().display());
            let settings = Settings::load()?;
            let path = settings.save()?;
            println!("Settings written to {}", path.display());
        }

        Commands::Run => {
            let db = Database::open()?;
            db.ensure_initialized()?;
            let settings = Settings::load()?;
            let fetcher = boards::HttpFetcher::new()?;
            let chat = match LlmClient::scoring_client(&settings) {
                Ok(chat) => Some(chat),
                Err(e) => {
                    eprintln!("LLM unavailable, scoring will be skipped: {e}");
                    None
                }
            };
            let pusher = PushoverClient::from_settings(&settings).ok();
            let candidate = profile::load()?;

            let outcome = pipeline::run_campaign(
                &db,
                &settings,
                &fetcher,
                chat.as_ref().map(|c| c as &dyn llm::ChatClient),
                pusher.as_ref().map(|p| p as &dyn Pusher),
                candidate.as_ref(),
            )?;
            print_run(&outcome.record);
            if outcome.excluded > 0 {
                println!("Excluded by filter rules: {}", outcome.excluded);
            }
        }

        Commands::Scrape => {
            let db = Database::open()?;
            db.ensure_initialized()?;
            let settings = Settings::load()?;
            let fetcher = boards::HttpFetcher::new()?;
            let rules = filter::ExclusionRules::from_settings(&settings);

            let mut found = 0usize;
            let mut new = 0usize;
            let mut excluded = 0usize;
            let profiles = settings.enabled_profiles();
            for (p_idx, profile) in profiles.iter().enumerate() {
                for (b_idx, board) in profile.boards.iter().enumerate() {
                    match boards::scrape_board(*board, &fetcher, profile, &settings) {
                        Ok(batch) => {
                            found += batch.len();
                            for raw in &batch {
                                if filter::exclusion_reason(raw, &rules).is_some() {
                                    excluded += 1;
                                    continue;
                                }
                                if let db::Upsert::Inserted(_) = db.upsert_posting(raw)? {
                                    new += 1;
                                }
                            }
                        }
                        Err(e) => eprintln!("{board} failed: {e:#}"),
                    }
                    let last = p_idx + 1 == profiles.len() && b_idx + 1 == profile.boards.len();
                    if !last {
                        fetcher.pause(5, 12);
                    }
                }
            }
            println!("Found {} postings ({} new, {} excluded).", found, new, excluded);
        }

        Commands::Score { ids, force } => {
            let db = Database::open()?;
            db.ensure_initialized()?;
            let settings = Settings::load()?;
            let chat = LlmClient::scoring_client(&settings)?;
            let candidate = profile::load()?
                .ok_or_else(|| anyhow!("No candidate profile. Run `jobhunter profile synthesize` first."))?;

            let summary =
                scorer::score_batch(&db, &chat, &settings, &candidate, ids.as_deref(), force)?;
            println!("Scored {} postings ({} skipped).", summary.scored, summary.skipped);
            for error in &summary.errors {
                eprintln!("  {error}");
            }
        }

        Commands::Notify => {
            let db = Database::open()?;
            db.ensure_initialized()?;
            let settings = Settings::load()?;
            let pusher = PushoverClient::from_settings(&settings)?;

            let mut sent = 0usize;
            for posting in db.notify_candidates()? {
                let detail = models::ScoreDetail {
                    score: posting.score.unwrap_or(0),
                    pros: posting.pros.clone(),
                    cons: posting.cons.clone(),
                    fit_summary: posting.fit_summary.clone().unwrap_or_default(),
                    ..models::ScoreDetail::default()
                };
                if let Some(notification) =
                    notifier::build_notification(&posting, &detail, &settings)
                {
                    pusher.push(&notification)?;
                    db.mark_notified(posting.id)?;
                    sent += 1;
                }
            }
            println!("Sent {} notifications.", sent);
        }

        Commands::Jobs { command } => {
            let db = Database::open()?;
            db.ensure_initialized()?;
            match command {
                JobCommands::List { status, source, min_score, limit } => {
                    let postings =
                        db.list_postings(status.as_deref(), source.as_deref(), min_score, limit)?;
                    if postings.is_empty() {
                        println!("No postings found.");
                    } else {
                        println!(
                            "{:<6} {:<7} {:<12} {:<32} {:<24} {:<14}",
                            "ID", "SCORE", "STATUS", "TITLE", "COMPANY", "SOURCE"
                        );
                        println!("{}", "-".repeat(99));
                        for p in &postings {
                            let score = p.score.map_or("-".to_string(), |s| s.to_string());
                            println!(
                                "{:<6} {:<7} {:<12} {:<32} {:<24} {:<14}",
                                p.id,
                                score,
                                p.status,
                                truncate(&p.title, 30),
                                truncate(p.company.as_deref().unwrap_or("-"), 22),
                                p.source,
                            );
                        }
                    }
                }

                JobCommands::Show { id } => match db.get_posting(id)? {
                    Some(p) => {
                        println!("Job #{}", p.id);
                        println!("Title: {}", p.title);
                        if let Some(company) = &p.company {
                            println!("Company: {}", company);
                        }
                        if let Some(location) = &p.location {
                            println!("Location: {}", location);
                        }
                        println!("Source: {}", p.source);
                        println!("Status: {}", p.status);
                        println!("URL: {}", p.url);
                        match (p.salary_min, p.salary_max) {
                            (Some(min), Some(max)) => println!("Pay: ${:.0} - ${:.0}", min, max),
                            (Some(min), None) => println!("Pay: ${:.0}+", min),
                            (None, Some(max)) => println!("Pay: up to ${:.0}", max),
                            (None, None) => {
                                if let Some(text) = &p.salary_text {
                                    println!("Pay: {}", text);
                                }
                            }
                        }
                        if let Some(score) = p.score {
                            println!("Score: {}/100", score);
                            if !p.pros.is_empty() {
                                println!("Pros:");
                                for pro in &p.pros {
                                    println!("  + {}", pro);
                                }
                            }
                            if !p.cons.is_empty() {
                                println!("Cons:");
                                for con in &p.cons {
                                    println!("  - {}", con);
                                }
                            }
                            if let Some(summary) = &p.fit_summary {
                                println!("Fit: {}", summary);
                            }
                            if let Some(risk) = &p.ghost_risk {
                                println!("Ghost risk: {}", risk);
                            }
                        }
                        if let Some(notes) = &p.notes {
                            println!("Notes: {}", notes);
                        }
                        if let Some(description) = &p.description {
                            println!("\n--- Description ---\n{}", description);
                        }
                    }
                    None => println!("Posting #{} not found.", id),
                },

                JobCommands::Status { id, status } => {
                    let status: PostingStatus = status.parse()?;
                    if db.set_status(id, status)? {
                        println!("Posting #{} marked {}.", id, status.as_str());
                    } else {
                        println!("Posting #{} not found.", id);
                    }
                }

                JobCommands::Note { id, text } => {
                    if db.set_notes(id, &text)? {
                        println!("Note saved on posting #{}.", id);
                    } else {
                        println!("Posting #{} not found.", id);
                    }
                }
            }
        }

        Commands::Runs { limit } => {
            let db = Database::open()?;
            db.ensure_initialized()?;
            let runs = db.list_runs(limit)?;
            if runs.is_empty() {
                println!("No runs recorded.");
            } else {
                println!(
                    "{:<6} {:<22} {:<10} {:>6} {:>5} {:>7} {:>6}",
                    "ID", "STARTED", "STATUS", "FOUND", "NEW", "SCORED", "SENT"
                );
                println!("{}", "-".repeat(68));
                for run in &runs {
                    println!(
                        "{:<6} {:<22} {:<10} {:>6} {:>5} {:>7} {:>6}",
                        run.id,
                        run.started_at,
                        run.status,
                        run.jobs_found,
                        run.jobs_new,
                        run.jobs_scored,
                        run.notifications_sent,
                    );
                    if let Some(error) = &run.error {
                        println!("       {}", truncate(error, 90));
                    }
                }
            }
        }

        Commands::Profile { command } => match command {
            ProfileCommands::Synthesize { files } => {
                if files.is_empty() {
                    return Err(anyhow!("Provide at least one resume text file"));
                }
                let settings = Settings::load()?;
                let chat = LlmClient::from_settings(&settings)?;
                let mut resumes = Vec::new();
                for file in &files {
                    let text = std::fs::read_to_string(file)
                        .with_context(|| format!("Failed to read {}", file.display()))?;
                    resumes.push(text);
                }
                let candidate = profile::synthesize(&chat, &resumes)?;
                let path = profile::save(&candidate)?;
                println!("Candidate profile written to {}", path.display());
                println!("Name: {}", candidate.name);
                println!("Headline: {}", candidate.headline);
            }

            ProfileCommands::Show => match profile::load()? {
                Some(candidate) => {
                    println!("{}", serde_json::to_string_pretty(&candidate)?);
                }
                None => println!("No candidate profile. Run `jobhunter profile synthesize`."),
            },
        },

        Commands::Settings { command } => match command {
            SettingsCommands::Show => {
                let settings = Settings::load()?;
                println!("{}", serde_json::to_string_pretty(&settings)?);
            }
            SettingsCommands::Path => {
                println!("{}", Settings::default_path()?.display());
            }
        },

        Commands::TestLlm => {
            let settings = Settings::load()?;
            let chat = LlmClient::scoring_client(&settings)?;
            let reply = llm::ChatClient::chat(
                &chat,
                &[ChatMessage::user("Reply with exactly: OK")],
            )?;
            println!("LLM replied: {}", reply.trim());
        }

        Commands::TestNotify => {
            let settings = Settings::load()?;
            let pusher = PushoverClient::from_settings(&settings)?;
            pusher.push(&Notification {
                title: "jobhunter test".to_string(),
                message: "Notifications are working.".to_string(),
                url: None,
                priority: 0,
            })?;
            println!("Test notification sent.");
        }
    }

    Ok(())
}

fn print_run(record: &models::RunRecord) {
    println!("Run #{} {}", record.id, record.status);
    println!(
        "Found {} postings, {} new, {} scored, {} notifications sent.",
        record.jobs_found, record.jobs_new, record.jobs_scored, record.notifications_sent
    );
    if let Some(error) = &record.error {
        println!("Errors: {}", error);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
