use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use quarry_client::{ReqwestFetcher, SourceEndpoints, build_registry};
use quarry_core::models::{ApplicationStatus, ApplicationUpdate, NewApplication, NewResume, PostingFilter};
use quarry_core::platform::Platform;
use quarry_core::traits::{NullStore, PostingStore};
use quarry_core::{FetchOrchestrator, OrchestratorConfig, RateLimiter, SearchRequest, SearchResult};
use quarry_db::{Database, DatabaseConfig, Repository};

#[derive(Parser)]
#[command(name = "quarry", version, about = "Multi-platform job search aggregator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search job platforms and store the results
    Search {
        /// Search terms; several terms run as one batch
        #[arg(required = true)]
        terms: Vec<String>,

        #[arg(short, long)]
        location: Option<String>,

        /// Platforms to query (defaults to all)
        #[arg(short, long, value_delimiter = ',')]
        platforms: Vec<Platform>,

        /// Maximum results per platform
        #[arg(short = 'n', long, default_value_t = 50)]
        max_results: usize,

        /// Only keep postings from the last N days
        #[arg(long)]
        max_age_days: Option<u64>,

        /// Overall timeout per search, in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Terms searched concurrently when several are given
        #[arg(long, default_value_t = 3)]
        batch_size: usize,

        /// Fetch and print without writing to the database
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// List stored job postings
    Jobs {
        #[arg(short, long)]
        platform: Option<Platform>,

        /// Company name contains
        #[arg(short, long)]
        company: Option<String>,

        /// Location contains
        #[arg(short, long)]
        location: Option<String>,

        /// Only postings from the last N days
        #[arg(long)]
        since_days: Option<i64>,

        #[arg(long, default_value_t = 50)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Record an application for a stored posting
    Apply {
        job_id: i64,

        #[arg(short, long)]
        resume_id: Option<i64>,

        #[arg(long)]
        notes: Option<String>,

        /// Match score between 0 and 100
        #[arg(long)]
        score: Option<f64>,
    },

    /// Change an application's status, notes or score
    UpdateApplication {
        id: i64,

        #[arg(short, long)]
        status: Option<ApplicationStatus>,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        score: Option<f64>,
    },

    /// List applications with their postings
    Applications {
        #[arg(short, long)]
        status: Option<ApplicationStatus>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Register a resume file
    AddResume {
        path: PathBuf,
    },

    /// List stored resumes
    Resumes,

    /// Show database totals
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("quarry=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            terms,
            location,
            platforms,
            max_results,
            max_age_days,
            timeout,
            batch_size,
            dry_run,
        } => {
            let requests: Vec<SearchRequest> = terms
                .into_iter()
                .map(|term| {
                    let mut request = SearchRequest::new(term)
                        .with_platforms(platforms.iter().copied())
                        .with_max_results(max_results);
                    if let Some(location) = &location {
                        request = request.with_location(location.clone());
                    }
                    if let Some(days) = max_age_days {
                        request = request.with_max_age(Duration::from_secs(days * 86_400));
                    }
                    if let Some(secs) = timeout {
                        request = request.with_timeout(Duration::from_secs(secs));
                    }
                    request
                })
                .collect();

            let results = if dry_run {
                cmd_search(NullStore, &requests, batch_size).await?
            } else {
                let db = connect_db().await?;
                let results = cmd_search(db.repository(), &requests, batch_size).await?;
                db.close().await;
                results
            };
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Jobs {
            platform,
            company,
            location,
            since_days,
            limit,
            offset,
        } => {
            let db = connect_db().await?;
            let filter = PostingFilter {
                platform,
                company,
                location,
                posted_since: since_days
                    .and_then(TimeDelta::try_days)
                    .and_then(|age| Utc::now().date_naive().checked_sub_signed(age)),
                limit,
                offset,
                ..Default::default()
            };
            let jobs = db.repository().get_postings(&filter).await.context("Failed to list jobs")?;
            println!("{}", serde_json::to_string_pretty(&jobs)?);
        }
        Commands::Apply {
            job_id,
            resume_id,
            notes,
            score,
        } => {
            let db = connect_db().await?;
            let mut new = NewApplication::new(job_id);
            new.resume_id = resume_id;
            new.notes = notes;
            new.match_score = score;
            let application = db
                .repository()
                .create_application(&new)
                .await
                .with_context(|| format!("Failed to apply to job {job_id}"))?;
            println!("{}", serde_json::to_string_pretty(&application)?);
        }
        Commands::UpdateApplication {
            id,
            status,
            notes,
            score,
        } => {
            let db = connect_db().await?;
            let update = ApplicationUpdate {
                status,
                notes,
                match_score: score,
            };
            let application = db
                .repository()
                .update_application(id, &update)
                .await
                .with_context(|| format!("Failed to update application {id}"))?;
            println!("{}", serde_json::to_string_pretty(&application)?);
        }
        Commands::Applications { status, limit } => {
            let db = connect_db().await?;
            let applications = db
                .repository()
                .list_applications(status, limit)
                .await
                .context("Failed to list applications")?;
            println!("{}", serde_json::to_string_pretty(&applications)?);
        }
        Commands::AddResume { path } => {
            let db = connect_db().await?;
            let resume = db
                .repository()
                .create_resume(&read_resume(&path)?)
                .await
                .context("Failed to store resume")?;
            println!("{}", serde_json::to_string_pretty(&resume)?);
        }
        Commands::Resumes => {
            let db = connect_db().await?;
            let resumes = db.repository().list_resumes().await.context("Failed to list resumes")?;
            println!("{}", serde_json::to_string_pretty(&resumes)?);
        }
        Commands::Stats => {
            let db = connect_db().await?;
            let stats = db.repository().compute_stats().await.context("Failed to compute stats")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

/// Open the SQLite database from `DATABASE_PATH` and apply migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env().context("Invalid database configuration")?;
    let db = Database::connect(&config)
        .await
        .with_context(|| format!("Failed to open database at {}", config.path.display()))?;
    db.migrate().await.context("Failed to run migrations")?;
    Ok(db)
}

async fn cmd_search<S: PostingStore>(
    store: S,
    requests: &[SearchRequest],
    batch_size: usize,
) -> Result<Vec<SearchResult>> {
    let config = OrchestratorConfig::from_env().context("Invalid orchestrator configuration")?;
    let endpoints = SourceEndpoints::from_env().context("Invalid endpoint configuration")?;
    let fetcher = ReqwestFetcher::with_timeout(endpoints.http_timeout).context("Failed to create HTTP client")?;
    let limiter = Arc::new(RateLimiter::with_defaults());
    let registry = build_registry(fetcher, &endpoints, limiter, &config.retry);

    let orchestrator = FetchOrchestrator::new(registry, store).with_config(config);
    tracing::info!(
        platforms = orchestrator.registry().len(),
        searches = requests.len(),
        "Starting search"
    );

    let results = match requests {
        [request] => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling unfinished sources");
                    on_interrupt.cancel();
                }
            });
            vec![orchestrator.search_with_cancel(request, cancel).await]
        }
        _ => orchestrator.batch_search(requests, batch_size).await,
    };

    for result in &results {
        let failed = result.failed_platforms();
        if !failed.is_empty() && failed.len() == result.reports.len() {
            tracing::warn!(search_id = %result.search_id, "Every platform failed");
        }
    }
    Ok(results)
}

fn read_resume(path: &Path) -> Result<NewResume> {
    let metadata = std::fs::metadata(path).with_context(|| format!("Cannot read resume: {}", path.display()))?;
    anyhow::ensure!(metadata.is_file(), "Not a file: {}", path.display());

    let file_type = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_else(|| "unknown".to_string());
    // Only plain-text formats are stored inline.
    let content = match file_type.as_str() {
        "txt" | "md" => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read resume text: {}", path.display()))?,
        ),
        _ => None,
    };

    Ok(NewResume {
        filename: path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("resume")
            .to_string(),
        file_path: path.display().to_string(),
        file_type,
        content,
    })
}
