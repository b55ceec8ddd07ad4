use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use pressclip::classify::{ClassifyError, LlmClassifier};
use pressclip::config::Config;
use pressclip::dates::DateWindow;
use pressclip::process::{run_consumer, Processor};
use pressclip::queue::MemoryQueue;
use pressclip::retry::RetryPolicy;
use pressclip::search::{FetchError, SearchClient};
use pressclip::storage::{Database, DatabaseError, TriggerType};
use pressclip::sync::{SyncRequest, SyncService};

#[derive(Parser, Debug)]
#[command(
    name = "pressclip",
    about = "Crawls news search results per publication and stores deduplicated headlines"
)]
struct Args {
    /// Config file path
    #[arg(long, value_name = "FILE", default_value = "pressclip.toml")]
    config: PathBuf,

    /// Database file path (overrides config)
    #[arg(long, value_name = "FILE")]
    db: Option<String>,

    /// Restrict the crawl to headlines from the last N days
    #[arg(
        long,
        value_name = "N",
        conflicts_with_all = ["from", "to"],
        value_parser = clap::value_parser!(i64).range(1..)
    )]
    days: Option<i64>,

    /// Window start date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", requires = "to")]
    from: Option<NaiveDate>,

    /// Window end date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", requires = "from")]
    to: Option<NaiveDate>,

    /// Pages to fetch per publication (overrides config)
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,

    /// Provider country code, e.g. "us" (overrides config)
    #[arg(long, value_name = "CODE")]
    region: Option<String>,

    /// Mark this run as scheduler-originated
    #[arg(long)]
    scheduled: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if let Some(db_path) = &args.db {
        config.database.path = db_path.clone();
    }

    let search = match SearchClient::new(&config.search, RetryPolicy::from(&config.retry)) {
        Ok(client) => client,
        Err(e @ FetchError::MissingApiKey) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to set up search client"),
    };

    let classifier = match LlmClassifier::new(&config.classifier) {
        Ok(c) => Arc::new(c),
        Err(e @ ClassifyError::MissingApiKey) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to set up classifier"),
    };

    let db = match Database::open(&config.database.path).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another pressclip instance appears to be using the database. Close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let now = Utc::now();
    let window = if let Some(days) = args.days {
        Some(DateWindow::last_days(now, days))
    } else if let (Some(from), Some(to)) = (args.from, args.to) {
        let start = from.and_hms_opt(0, 0, 0).context("Invalid --from date")?;
        let end = to.and_hms_opt(23, 59, 59).context("Invalid --to date")?;
        Some(DateWindow::new(
            Utc.from_utc_datetime(&start),
            Utc.from_utc_datetime(&end),
        ))
    } else {
        None
    };

    let request = SyncRequest {
        trigger: if args.scheduled {
            TriggerType::Scheduled
        } else {
            TriggerType::Manual
        },
        window,
        max_pages: args.max_pages,
        region: args.region.clone(),
    };

    let queue = Arc::new(MemoryQueue::new(&config.queue));
    let processor = Processor::new(
        db.clone(),
        classifier,
        RetryPolicy::from(&config.retry),
        config.database.op_timeout(),
    );
    let service = SyncService::new(db.clone(), search, queue.clone(), config);

    // Consume in parallel with the crawl so staggered deliveries are
    // processed as they become visible.
    let consumer_queue = Arc::clone(&queue);
    let consumer =
        tokio::spawn(async move { run_consumer(consumer_queue.as_ref(), &processor).await });

    let run_result = service.run(&request).await;

    // Whatever was queued before a failure still gets processed.
    queue.close();
    let stats = consumer.await.context("Consumer task panicked")?;

    let report = run_result.context("Sync run failed")?;
    println!(
        "Run {}: {} publications fetched, {} headlines found, {} within range, {} queued",
        report.run_id,
        report.summary.publications_fetched,
        report.summary.total_headlines_fetched,
        report.summary.headlines_within_range,
        report.summary.messages_queued,
    );
    println!(
        "Stored {} new headlines ({} already stored, {} invalid references, {} failed deliveries)",
        stats.inserted,
        stats.already_stored + stats.concurrent_inserts,
        stats.invalid_references,
        stats.failures,
    );

    Ok(())
}
