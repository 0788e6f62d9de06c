use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fleet_state::FleetManager;

#[derive(Parser, Debug)]
#[command(name = "muster-hub")]
#[command(about = "Muster fleet hub and store inspector")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the listen port from the environment
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a client's stored record, or one page of its data, as JSON
    Inspect {
        /// Client to look up
        #[arg(short, long)]
        client: String,

        /// Page to render (calls, sms, notifications, gps, info, ...)
        #[arg(short, long)]
        page: Option<String>,

        /// Page filter: a number suffix for calls/sms, an app name for
        /// notifications
        #[arg(short, long)]
        filter: Option<String>,
    },
}

pub async fn run_inspect(
    manager: Arc<FleetManager>,
    client: String,
    page: Option<String>,
    filter: Option<String>,
) -> Result<()> {
    match page {
        Some(page) => match manager.page(&client, &page, filter.as_deref()).await? {
            Some(view) => println!("{}", serde_json::to_string_pretty(&view)?),
            None => anyhow::bail!("unknown client {client:?} or page {page:?}"),
        },
        None => match manager.client(&client).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => anyhow::bail!("client {client:?} not found"),
        },
    }
    Ok(())
}
