//! Manual reconcile request

use anyhow::{Context, Result};
use colored::*;
use sluice_client::SchedulerClient;

use crate::config::Config;

pub async fn handle_reconcile(config: &Config) -> Result<()> {
    let client = SchedulerClient::new(&config.server_url);

    client
        .trigger_reconcile()
        .await
        .context("Failed to request a reconciliation pass")?;

    println!("{} Reconciliation pass requested", "✓".green());
    Ok(())
}
