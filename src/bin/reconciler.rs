//! reconciler CLI: run one population or processing pass, or inspect the queue.

use std::sync::Arc;

use case_reconciler::client::{CaseClient, HttpCaseClient};
use case_reconciler::config::Config;
use case_reconciler::db::Db;
use case_reconciler::engine::{PopulationOutcome, Populator, Processor, WorkQueue};
use case_reconciler::model::entity::QueryFilter;
use case_reconciler::model::work::{State, WorkItem};
use case_reconciler::remediation::Remediation;
use case_reconciler::telemetry::{TelemetryConfig, init_telemetry};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "reconciler",
    about = "Case marker reconciliation worker",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Populate the queue (clearing pending items first) instead of processing it
    #[arg(long)]
    queue: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List work items, newest first
    List {
        /// Filter by state (new, in_progress, done, failed)
        #[arg(long)]
        state: Option<String>,
        /// Maximum items to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show every work item recorded for a reference
    Show {
        /// Entity reference (national identifier)
        reference: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Some(command) => {
            let db = Db::connect(&Config::database_url_from_env()).await?;
            db.migrate().await?;
            match command {
                Command::List { state, limit } => cmd_list(&db, state, limit).await,
                Command::Show { reference } => cmd_show(&db, &reference).await,
            }
        }
        None => cmd_run(cli.queue).await,
    }
}

async fn cmd_run(populate: bool) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        default_filter: config.log_level.clone(),
        endpoint: config.otel_endpoint.clone(),
        service_name: "case-reconciler".to_string(),
    })?;

    let db = Db::connect(&config.database_url).await?;
    db.migrate().await?;
    let queue = WorkQueue::new(db.clone());
    let client: Arc<dyn CaseClient> = Arc::new(HttpCaseClient::new(config.case_api.clone())?);

    if populate {
        let query = vec![QueryFilter::target_group(&config.target_group_code)];
        let outcome = Populator::new(queue, client, query).run(true).await?;
        if let PopulationOutcome::DiscoveryFailed { error } = outcome {
            // Non-fatal: the next scheduled run retries.
            tracing::warn!(%error, "population skipped");
        }
    } else {
        Processor::new(queue, Remediation::new(client)).run().await?;
    }

    db.close().await;
    Ok(())
}

async fn cmd_list(db: &Db, state: Option<String>, limit: i64) -> anyhow::Result<()> {
    let state: Option<State> = state.map(|s| s.parse::<State>()).transpose()?;

    let counts = db.count_by_state().await?;
    let summary: Vec<String> = counts.iter().map(|(s, n)| format!("{s}={n}")).collect();
    println!("Queue: {}", if summary.is_empty() { "empty".to_string() } else { summary.join(" ") });

    let items = db.list_work_items(state, limit).await?;
    if items.is_empty() {
        println!("No work items found.");
        return Ok(());
    }

    println!(
        "{:<8}  {:<12}  {:<11}  {:<3}  {:<16}  REASON",
        "ID", "REFERENCE", "STATE", "TRY", "UPDATED"
    );
    println!("{}", "-".repeat(90));
    for item in &items {
        print_row(item);
    }
    println!("\n{} item(s)", items.len());
    Ok(())
}

fn print_row(item: &WorkItem) {
    println!(
        "{:<8}  {:<12}  {:<11}  {:<3}  {:<16}  {}",
        item.id.to_string(),
        item.reference,
        item.state.as_str(),
        item.attempts,
        item.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        item.failure_reason.as_deref().unwrap_or("-")
    );
}

async fn cmd_show(db: &Db, reference: &str) -> anyhow::Result<()> {
    let items = db.list_by_reference(reference).await?;
    if items.is_empty() {
        anyhow::bail!("no work items for reference '{reference}'");
    }

    for item in &items {
        println!("ID:         {}", item.id.0);
        println!("Reference:  {}", item.reference);
        println!("State:      {}", item.state);
        println!("Payload:    {}", serde_json::to_string(&item.payload)?);
        println!("Attempts:   {}", item.attempts);
        println!("Created:    {}", item.created_at);
        println!("Updated:    {}", item.updated_at);
        if let Some(completed) = item.completed_at {
            println!("Completed:  {completed}");
        }
        if let Some(ref reason) = item.failure_reason {
            println!("Reason:     {reason}");
        }
        println!("---");
    }
    Ok(())
}
