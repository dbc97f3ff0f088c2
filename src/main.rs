//! # adsmith CLI
//!
//! Runs the Research → Marketing → Ad Generation pipeline from the command
//! line, inspects run history and the generation cache, and starts the
//! dashboard API.
//!
//! ## Usage
//!
//! ```bash
//! adsmith --config ./config/adsmith.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `adsmith init` | Create the SQLite database and run schema migrations |
//! | `adsmith run <company>` | Run the full pipeline |
//! | `adsmith research <company>` | Run the research stage only |
//! | `adsmith history` | List recent runs |
//! | `adsmith show <run-id>` | Print one run with its stage outputs |
//! | `adsmith cache stats` | Count durable cache entries |
//! | `adsmith cache clear` | Delete every cached generation (both tiers) |
//! | `adsmith serve` | Start the dashboard HTTP API |
//!
//! Credentials (`AZURE_OPENAI_*`, `TAVILY_API_KEY`) are read from the
//! environment or a `.env` file and are only required by `run`, `research`
//! and `serve`.

use adsmith::agents::ResearchRequest;
use adsmith::cache::TwoTierCache;
use adsmith::config;
use adsmith::history::{check_list_limit, HistoryStore, DEFAULT_LIST_LIMIT};
use adsmith::pipeline::PipelineOutcome;
use adsmith::progress::ProgressMode;
use adsmith::runtime;
use adsmith::server::{self, AppState};
use adsmith::settings::Settings;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// adsmith: LLM-driven market research, marketing strategy and ad copy.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means all defaults.
#[derive(Parser)]
#[command(
    name = "adsmith",
    about = "LLM-driven market research, marketing strategy and ad copy pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/adsmith.toml")]
    config: PathBuf,

    /// Stage progress on stderr. Defaults to `human` on a terminal, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file with the cache and history tables.
    /// Safe to run repeatedly.
    Init,

    /// Run research, marketing and ad generation for a company.
    Run {
        /// Company (or product) to market.
        company: String,

        /// Target audience.
        #[arg(long)]
        audience: Option<String>,

        /// Number of campaigns to generate (1-10). Overrides the config.
        #[arg(long)]
        campaigns: Option<usize>,

        /// Write campaign assets under this directory. Overrides the config.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the full outcome as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Run only the research stage.
    Research {
        company: String,

        #[arg(long)]
        audience: Option<String>,

        /// A follow-up question about the company and audience.
        #[arg(long)]
        follow_up: Option<String>,
    },

    /// List recent pipeline runs, newest first.
    History {
        /// Number of runs to show (1-200).
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT, allow_negative_numbers = true)]
        limit: i64,
    },

    /// Show a run with its stage outputs as JSON.
    Show {
        run_id: String,
    },

    /// Inspect or clear the generation cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Start the dashboard HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Number of entries in the durable tier.
    Stats,
    /// Delete every cached generation.
    Clear,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("adsmith=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_summary(outcome: &PipelineOutcome) {
    if let Some(id) = &outcome.run_id {
        println!("run {}", id);
    }
    println!("company: {}", outcome.research.company);
    println!(
        "research: {} questions, analysis {} chars",
        outcome.research.questions.len(),
        outcome.research.analysis.len()
    );
    println!("campaigns: {}", outcome.ads.campaigns.len());
    for (i, ad) in outcome.ads.campaigns.iter().enumerate() {
        println!();
        println!("{}. {}", i + 1, ad.campaign.campaign_name);
        println!("   tagline: {}", ad.tagline);
        if let Some(dir) = &ad.asset_dir {
            println!("   assets:  {}", dir.display());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut cfg = config::load_config(&cli.config)?;
    let progress = cli
        .progress
        .map(ProgressMode::from)
        .unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Init => {
            let pool = runtime::open_database(&cfg).await?;
            pool.close().await;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Run {
            company,
            audience,
            campaigns,
            output,
            json,
        } => {
            if let Some(n) = campaigns {
                cfg.pipeline.num_campaigns = n;
            }
            if output.is_some() {
                cfg.pipeline.output_dir = output;
            }
            let settings = Settings::load()?;
            let rt = runtime::build(&cfg, &settings, progress.reporter()).await?;

            let mut request = ResearchRequest::new(company);
            if let Some(aud) = audience {
                request = request.with_audience(aud);
            }
            let outcome = rt.pipeline.run(&request).await?;
            tracing::debug!(stats = ?rt.cache.stats(), "cache usage");

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_summary(&outcome);
            }
        }
        Commands::Research {
            company,
            audience,
            follow_up,
        } => {
            let settings = Settings::load()?;
            let rt = runtime::build(&cfg, &settings, progress.reporter()).await?;

            let mut request = ResearchRequest::new(company);
            if let Some(aud) = audience {
                request = request.with_audience(aud);
            }
            if let Some(q) = follow_up {
                request = request.with_follow_up(q);
            }
            let outcome = rt.pipeline.research_only(&request).await?;
            println!("{}", outcome.research.to_text());
        }
        Commands::History { limit } => {
            let limit = check_list_limit(limit)?;
            let history = HistoryStore::new(runtime::open_database(&cfg).await?);
            let runs = history.list_runs(limit).await?;
            if runs.is_empty() {
                println!("No runs recorded.");
            }
            for run in runs {
                let detail = match (&run.failed_stage, &run.audience) {
                    (Some(stage), _) => format!("failed at {}", stage),
                    (None, Some(aud)) => format!("audience: {}", aud),
                    (None, None) => String::new(),
                };
                println!(
                    "{}  {}  {:<9}  {}  {}",
                    run.id,
                    run.started_at,
                    run.status.as_str(),
                    run.company,
                    detail
                );
            }
        }
        Commands::Show { run_id } => {
            let history = HistoryStore::new(runtime::open_database(&cfg).await?);
            match history.get_run(&run_id).await? {
                Some(run) => println!("{}", serde_json::to_string_pretty(&run)?),
                None => anyhow::bail!("run not found: {}", run_id),
            }
        }
        Commands::Cache { action } => {
            let pool = runtime::open_database(&cfg).await?;
            let cache = TwoTierCache::new(runtime::durable_backend(&cfg, &pool));
            match action {
                CacheAction::Stats => {
                    println!("durable entries: {}", cache.durable().len().await?);
                }
                CacheAction::Clear => {
                    let before = cache.durable().len().await?;
                    cache.clear_all().await?;
                    println!("Cleared {} cache entries.", before);
                }
            }
            pool.close().await;
        }
        Commands::Serve => {
            let settings = Settings::load()?;
            let rt = runtime::build(&cfg, &settings, ProgressMode::Off.reporter()).await?;
            let state = AppState {
                pipeline: rt.pipeline,
                history: rt.history,
            };
            server::run_server(&cfg.server.bind, state).await?;
        }
    }

    Ok(())
}
