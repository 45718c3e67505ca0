use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pollit::analytics::MetricUpdater;
use pollit::config::{Config, DatabaseBackend};
use pollit::storage::{PostgresStorage, SqliteStorage, Storage};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pollit-admin")]
#[command(about = "Pollit analytics admin CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the most viewed polls
    Top {
        /// Maximum number of polls to show
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Print the analytics summary for one poll
    Summary {
        /// Poll ID
        poll_id: String,
    },
    /// Recompute all derived metrics for one poll
    Recompute {
        /// Poll ID
        poll_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => Arc::new(SqliteStorage::from_config(&config.database).await?),
        DatabaseBackend::Postgres => {
            Arc::new(PostgresStorage::from_config(&config.database).await?)
        }
    };

    // Ensure database is initialized
    storage.init().await?;

    match cli.command {
        Commands::Top { limit } => {
            let polls = storage.list_polls(limit, 0).await?;
            if polls.is_empty() {
                println!("No polls found.");
                return Ok(());
            }

            let ids: Vec<String> = polls.iter().map(|p| p.id.clone()).collect();
            let summaries = storage.get_bulk_analytics(&ids).await?;

            println!(
                "{:<12} {:>8} {:>8} {:>8} {:>12}  {}",
                "Poll ID", "Views", "Votes", "Shares", "Completion", "Question"
            );
            println!("{}", "-".repeat(80));
            for summary in summaries {
                let question = polls
                    .iter()
                    .find(|p| p.id == summary.poll_id)
                    .map(|p| p.question.as_str())
                    .unwrap_or("");
                println!(
                    "{:<12} {:>8} {:>8} {:>8} {:>11.1}%  {}",
                    summary.poll_id,
                    summary.total_views,
                    summary.total_votes,
                    summary.total_shares,
                    summary.completion_rate * 100.0,
                    truncate(question, 40),
                );
            }
        }
        Commands::Summary { poll_id } => {
            let poll = storage
                .get_poll(&poll_id)
                .await?
                .with_context(|| format!("poll '{}' not found", poll_id))?;
            let summary = storage
                .get_poll_analytics(&poll_id)
                .await?
                .unwrap_or_else(|| pollit::analytics::PollAnalyticsSummary::empty(&poll_id));

            println!("Poll:      {} ({:?})", poll.question, poll.poll_type);
            println!("Options:   {}", poll.options.join(", "));
            println!();
            println!("Views:               {}", summary.total_views);
            println!("Unique viewers:      {}", summary.unique_viewers);
            println!("Votes:               {}", summary.total_votes);
            println!("Shares:              {}", summary.total_shares);
            println!("Completion rate:     {:.1}%", summary.completion_rate * 100.0);
            println!("Interaction rate:    {:.1}%", summary.interaction_rate * 100.0);
            println!("Bounce rate:         {:.1}%", summary.bounce_rate * 100.0);
            println!("Return visitors:     {:.1}%", summary.return_visitor_rate * 100.0);
            println!("Avg time on page:    {:.1}s", summary.avg_time_on_page);
            println!("Avg time to vote:    {:.1}s", summary.avg_time_to_vote);
            println!("Viral coefficient:   {:.2}", summary.viral_coefficient);
            println!("Share-to-vote ratio: {:.2}", summary.share_to_vote_ratio);
            match summary.peak_hour {
                Some(hour) => println!("Peak hour (UTC):     {:02}:00", hour),
                None => println!("Peak hour (UTC):     n/a"),
            }
            if !summary.device_breakdown.is_empty() {
                println!();
                println!("Devices:");
                for (device, count) in &summary.device_breakdown {
                    println!("  {:<12} {}", device, count);
                }
            }
        }
        Commands::Recompute { poll_id } => {
            storage
                .get_poll(&poll_id)
                .await?
                .with_context(|| format!("poll '{}' not found", poll_id))?;

            let updater = MetricUpdater::new(Arc::clone(&storage));
            updater.update_all(&poll_id).await?;
            println!("✓ Recomputed metrics for poll '{}'", poll_id);
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
