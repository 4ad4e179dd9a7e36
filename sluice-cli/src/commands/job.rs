//! Job command handlers
//!
//! Submitting definitions, inspecting the queue and the operator actions
//! (cancel, finished, prune).

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use sluice_client::SchedulerClient;
use sluice_core::domain::job::{JobRecord, JobState};
use sluice_core::dto::job::{CreateJob, JobStatusEntry};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::Config;
use crate::id_resolver::resolve_job_id;
use crate::types::IdOrPrefix;

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// Queue a job definition (JSON file, `-` for stdin)
    Submit {
        file: PathBuf,

        /// Use this id instead of a generated one
        #[arg(long)]
        id: Option<Uuid>,
    },
    /// List queued and finished jobs in arrival order
    List,
    /// Get job details
    Get {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Cancel a job that has not been scheduled yet
    Cancel {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Report that the cluster finished a scheduled job
    Finished {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Remove scheduled, failed and done records
    Prune,
}

pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let client = SchedulerClient::new(&config.server_url);

    match command {
        JobCommands::Submit { file, id } => submit_job(&client, &file, id).await,
        JobCommands::List => list_jobs(&client).await,
        JobCommands::Get { id } => get_job(&client, &id).await,
        JobCommands::Cancel { id } => cancel_job(&client, &id).await,
        JobCommands::Finished { id } => finish_job(&client, &id).await,
        JobCommands::Prune => prune_jobs(&client).await,
    }
}

async fn submit_job(client: &SchedulerClient, file: &Path, id: Option<Uuid>) -> Result<()> {
    let definition = read_definition(file)?;
    let record = client
        .submit_job(CreateJob { id, definition })
        .await
        .context("Failed to submit job")?;

    println!("{} Job queued", "✓".green());
    println!("  ID:       {}", record.id.to_string().cyan());
    println!("  Sequence: {}", record.sequence);
    Ok(())
}

async fn list_jobs(client: &SchedulerClient) -> Result<()> {
    let jobs = client.list_jobs().await?;

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} job(s):", jobs.len()).bold());
    println!();
    for job in &jobs {
        print_job_summary(job);
    }
    Ok(())
}

async fn get_job(client: &SchedulerClient, id: &str) -> Result<()> {
    let uuid = resolve_job_id(client, &IdOrPrefix::parse(id)).await?;
    let job = client.get_job(uuid).await?;

    print_job_details(&job);
    Ok(())
}

async fn cancel_job(client: &SchedulerClient, id: &str) -> Result<()> {
    let uuid = resolve_job_id(client, &IdOrPrefix::parse(id)).await?;
    let job = client
        .cancel_job(uuid)
        .await
        .with_context(|| format!("Failed to cancel job {}", uuid))?;

    println!("{} Job {} cancelled", "✓".green(), job.id.to_string().cyan());
    Ok(())
}

async fn finish_job(client: &SchedulerClient, id: &str) -> Result<()> {
    let uuid = resolve_job_id(client, &IdOrPrefix::parse(id)).await?;
    let job = client
        .mark_finished(uuid)
        .await
        .with_context(|| format!("Failed to mark job {} finished", uuid))?;

    println!(
        "{} Job {} marked {}",
        "✓".green(),
        job.id.to_string().cyan(),
        colorize_state(job.state)
    );
    Ok(())
}

async fn prune_jobs(client: &SchedulerClient) -> Result<()> {
    let removed = client.prune_jobs().await?;

    if removed == 0 {
        println!("{}", "Nothing to prune.".yellow());
    } else {
        println!("{} Removed {} finished job record(s)", "✓".green(), removed);
    }
    Ok(())
}

/// Reads a job definition from a file, or stdin for `-`
fn read_definition(file: &Path) -> Result<serde_json::Value> {
    let raw = if file == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read definition from stdin")?
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?
    };

    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", file.display()))
}

fn print_job_summary(job: &JobStatusEntry) {
    println!(
        "  {} #{} Job {}",
        "▸".cyan(),
        job.sequence,
        job.id.to_string().dimmed()
    );
    println!("    State:    {}", colorize_state(job.state));
    if job.attempt_count > 0 {
        println!("    Attempts: {}", job.attempt_count);
    }
    if let Some(at) = job.next_eligible_time {
        println!(
            "    Retry at: {}",
            at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    if let Some(error) = &job.last_error {
        println!("    Reason:   {}", error.red());
    }
    println!();
}

fn print_job_details(job: &JobRecord) {
    println!("{}", "Job Details:".bold());
    println!("  ID:        {}", job.id.to_string().cyan());
    println!("  Sequence:  {}", job.sequence);
    println!("  State:     {}", colorize_state(job.state));
    println!("  Attempts:  {}", job.attempt_count);
    println!("  Enqueued:  {}", job.enqueued_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Updated:   {}", job.updated_at.format("%Y-%m-%d %H:%M:%S"));

    if let Some(at) = job.next_eligible_time {
        println!("  Retry at:  {}", at.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(error) = &job.last_error {
        println!("\n{}", "Last error:".bold());
        println!("{}", error.red());
    }

    println!("\n{}", "Definition:".bold());
    match serde_json::to_string_pretty(&job.definition) {
        Ok(pretty) => println!("{}", pretty),
        Err(_) => println!("{}", job.definition),
    }
}

fn colorize_state(state: JobState) -> ColoredString {
    let text = state.to_string();
    match state {
        JobState::Pending => text.yellow(),
        JobState::Admitting => text.cyan(),
        JobState::Backoff => text.magenta(),
        JobState::Scheduled => text.green(),
        JobState::Failed => text.red(),
        JobState::Done => text.dimmed(),
    }
}
