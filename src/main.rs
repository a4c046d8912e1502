mod auth;
mod body;
mod config;
mod error;
mod export;
mod gmail;
mod logging;
mod message;
mod models;
mod output;

use crate::auth::Authenticator;
use crate::config::{Config, DEFAULT_CONFIG_PATH, TokenStore};
use crate::export::Exporter;
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Export Gmail messages and attachments to CSV.
#[derive(Debug, Parser)]
#[command(name = "gmail-export", version, about)]
struct Cli {
    /// Settings file; missing file means defaults
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// OAuth client secret downloaded from the Google Cloud console
    #[arg(long)]
    credentials: Option<PathBuf>,

    #[arg(long)]
    token: Option<PathBuf>,

    #[arg(long, value_enum)]
    token_store: Option<TokenStore>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(long)]
    attachments_dir: Option<PathBuf>,

    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Stop after this many messages (0 = all)
    #[arg(short = 'n', long)]
    max_messages: Option<usize>,

    #[arg(long)]
    page_size: Option<u32>,

    /// Gmail search query, e.g. "from:bob has:attachment"
    #[arg(short, long)]
    query: Option<String>,

    /// Only export messages carrying this label (repeatable)
    #[arg(long = "label")]
    labels: Vec<String>,

    #[arg(long)]
    include_spam_trash: bool,

    /// Skip downloading attachments
    #[arg(long)]
    no_attachments: bool,

    /// Debug-level logging
    #[arg(long)]
    debug: bool,

    /// Forget the stored OAuth token and exit
    #[arg(long)]
    reset_token: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(p) = &self.credentials {
            config.credentials_path = p.clone();
        }
        if let Some(p) = &self.token {
            config.token_path = p.clone();
        }
        if let Some(store) = self.token_store {
            config.token_store = store;
        }
        if let Some(p) = &self.data_dir {
            config.data_dir = p.clone();
        }
        if let Some(p) = &self.attachments_dir {
            config.attachments_dir = p.clone();
        }
        if let Some(p) = &self.log_file {
            config.log_file = p.clone();
        }
        if let Some(n) = self.max_messages {
            config.max_messages = n;
        }
        if let Some(n) = self.page_size {
            config.page_size = n;
        }
        if let Some(q) = &self.query {
            config.query = Some(q.clone());
        }
        if !self.labels.is_empty() {
            config.label_ids = self.labels.clone();
        }
        if self.include_spam_trash {
            config.include_spam_trash = true;
        }
        if self.no_attachments {
            config.download_attachments = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    cli.apply(&mut config);

    logging::init(&config.log_file, cli.debug).context("Failed to initialize logging")?;

    if cli.reset_token {
        Authenticator::reset_token(&config).context("Failed to clear token")?;
        println!("Token cleared. Run again without --reset-token to re-authenticate.");
        return Ok(());
    }

    let client = Authenticator::connect(&config)
        .await
        .context("Failed to initialize the Gmail service")?;

    let summary = Exporter::new(&client, &config).run().await?;
    info!(
        "Export finished: {} emails, {} attachments, {} failed",
        summary.emails, summary.attachments, summary.failed
    );

    Ok(())
}
