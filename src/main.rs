use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod aggregator;
mod analysis;
mod classifier;
mod config;
mod db;
mod error;
mod filter;
mod import;
mod memory;
mod models;
mod routes;
mod store;
#[cfg(test)]
mod testing;

use crate::analysis::CommentInput;
use crate::config::AppConfig;
use crate::memory::MemoryStore;
use crate::models::EvaluationFilter;
use crate::store::{EvaluationStore, TieredStore};

#[derive(Parser)]
#[command(name = "teacher-evaluation")]
#[command(about = "Teacher evaluation aggregation and comment screening", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample teachers and evaluations
    Seed {
        #[arg(long)]
        period: Option<String>,
    },
    /// Import evaluations from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Classify and store the comments of one evaluation
    AnalyzeComments {
        #[arg(long)]
        evaluation_id: Uuid,
        #[arg(long)]
        positive: Option<String>,
        #[arg(long)]
        negative: Option<String>,
        #[arg(long)]
        suggestions: Option<String>,
    },
    /// Recompute every teacher's aggregate result
    ComputeResults {
        #[arg(long)]
        period: Option<String>,
    },
    /// List teachers ranked by overall rating
    Rank {
        #[arg(long)]
        period: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Manage the keyword filter
    Filter {
        #[command(subcommand)]
        action: FilterAction,
    },
    /// Delete all evaluations, comment analysis and results
    Reset {
        #[arg(long)]
        confirm: bool,
    },
    /// Serve the compute-results and analyze-comments endpoints
    Serve,
}

#[derive(Subcommand)]
enum FilterAction {
    /// Add a word to the filter list
    Add { word: String },
    /// Remove a word from the filter list
    Remove { word: String },
    /// Show the filter list
    List,
    /// Show evaluations whose comments contain a filter word
    Review {
        #[arg(long)]
        period: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::from_env()?;

    let pool = db::connect(&cfg.database_url, cfg.max_connections)
        .context("invalid DATABASE_URL")?;
    let fallback = MemoryStore::open(&cfg.fallback_cache_path).with_context(|| {
        format!(
            "failed to open fallback cache at {}",
            cfg.fallback_cache_path.display()
        )
    })?;
    let store = TieredStore::new(db::PgStore::new(pool.clone()), fallback);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool)
                .await
                .context("failed to apply migrations")?;
            println!("Schema ready.");
        }
        Commands::Seed { period } => {
            let period = period.unwrap_or_else(|| cfg.evaluation_period());
            let summary = import::seed(&store, &period).await?;
            println!(
                "Seeded {} evaluations for {period} ({} already present).",
                summary.inserted, summary.duplicates
            );
        }
        Commands::Import { csv } => {
            let summary = import::import_csv(&store, &csv).await?;
            println!(
                "Inserted {} evaluations from {} ({} duplicates, {} rejected).",
                summary.inserted,
                csv.display(),
                summary.duplicates,
                summary.rejected
            );
        }
        Commands::AnalyzeComments {
            evaluation_id,
            positive,
            negative,
            suggestions,
        } => {
            let comments = CommentInput {
                positive_feedback: positive,
                negative_feedback: negative,
                suggestions,
            };
            let outcome = analysis::analyze_comments(&store, evaluation_id, &comments).await;
            println!(
                "Analyzed {} comments, {} flagged.",
                outcome.analyzed, outcome.flagged
            );
        }
        Commands::ComputeResults { period } => {
            let period = period.unwrap_or_else(|| cfg.evaluation_period());
            aggregator::compute_results(&store, &period).await?;
            println!("Results computed for {period}.");
        }
        Commands::Rank { period, limit } => {
            let period = period.unwrap_or_else(|| cfg.evaluation_period());
            let results = store.query_teacher_results(&period).await?;
            let teachers = store.query_teachers().await?;
            let ranked = aggregator::rank_results(&results, &teachers);

            if ranked.is_empty() {
                println!("No results computed for {period}.");
                return Ok(());
            }

            println!("Teachers ranked for {period}:");
            for entry in ranked.iter().take(limit) {
                println!(
                    "{}. {} ({}) {:.2}% across {} evaluations",
                    entry.rank,
                    entry.teacher_name,
                    entry.department,
                    entry.overall_rating,
                    entry.total_evaluations
                );
            }
        }
        Commands::Filter { action } => run_filter(&store, action).await?,
        Commands::Reset { confirm } => {
            if !confirm {
                bail!("reset deletes every evaluation; rerun with --confirm");
            }
            store.reset_evaluations().await?;
            info!("evaluation data reset");
            println!("All evaluations, comment analysis and results deleted.");
        }
        Commands::Serve => {
            let state = Arc::new(routes::AppState {
                store: Arc::new(store),
                evaluation_period: cfg.evaluation_period(),
            });
            let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
                .await
                .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;
            info!(addr = %cfg.bind_addr, "listening");
            axum::serve(listener, routes::router(state))
                .await
                .context("server error")?;
        }
    }

    Ok(())
}

async fn run_filter<S>(store: &S, action: FilterAction) -> anyhow::Result<()>
where
    S: EvaluationStore,
{
    match action {
        FilterAction::Add { word } => match filter::add_word(store, &word).await {
            Ok(stored) => println!("Added '{stored}' to the filter list."),
            Err(err) if err.is_validation() => println!("Not added: {err}"),
            Err(err) => return Err(err.into()),
        },
        FilterAction::Remove { word } => {
            filter::remove_word(store, &word).await?;
            println!("Removed '{word}' from the filter list.");
        }
        FilterAction::List => {
            let words = store.query_filter_words().await?;
            if words.is_empty() {
                println!("The filter list is empty.");
            }
            for word in words {
                println!("- {word}");
            }
        }
        FilterAction::Review { period } => {
            let words = store.query_filter_words().await?;
            let evaluations = store
                .query_evaluations(&EvaluationFilter {
                    teacher_id: None,
                    evaluation_period: period,
                })
                .await?;
            let hidden = filter::hidden_evaluations(&evaluations, &words);

            if hidden.is_empty() {
                println!("No evaluations contain filtered words.");
            }
            for evaluation in hidden {
                println!(
                    "- {} (student {}): {}",
                    evaluation.id,
                    evaluation.student_id,
                    filter::redact(&evaluation.combined_comments(), &words)
                );
            }
        }
    }

    Ok(())
}
