mod bot;
mod config;
mod conversation;
mod models;
mod site;
mod utils;

#[cfg(test)]
mod testing;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::bot::{inline_answers, Console};
use crate::config::{AppConfig, Credentials};
use crate::conversation::{Driver, Registry};
use crate::models::{UploadOutcome, UploadRequest};
use crate::site::{SearchClient, SiteUploader, Uploader};

#[derive(Parser)]
#[command(name = "myinstants-bot", about = "Search and upload myinstants.com sounds", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Search the catalog and print up to the inline-result limit
    Search {
        /// Search terms, joined with '+'
        #[arg(required = true)]
        terms: Vec<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Upload one audio file (logs in with MYINSTANTS_USERNAME / MYINSTANTS_PASSWORD)
    Upload {
        /// Display name of the new instant
        #[arg(short, long)]
        name: String,

        /// MP3 file to upload
        file: PathBuf,
    },

    /// Talk to the bot from the terminal: /upload, /audio <path>, /cancel, /search <q>
    Chat {
        /// User id the conversation runs under
        #[arg(short, long, default_value_t = 1)]
        user: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "myinstants_bot=info,warn",
        1 => "myinstants_bot=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Search { terms, json } => {
            let _t = utils::Timer::start("Search");
            let client = SearchClient::new(&config.site).context("Failed to build search client")?;
            let answers = inline_answers(&client, terms, config.bot.max_inline_results).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&answers)?);
            } else if answers.is_empty() {
                println!("No instants found.");
            } else {
                for a in &answers {
                    println!("{}\t{}", a.title, a.voice_url);
                }
            }
        }

        Command::Upload { name, file } => {
            let size = std::fs::metadata(&file)
                .with_context(|| format!("Cannot read {:?}", file))?
                .len();
            if size > config.upload.max_audio_bytes {
                bail!(
                    "{:?} is {}, the limit is {}",
                    file,
                    utils::fmt_kb(size),
                    utils::fmt_kb(config.upload.max_audio_bytes)
                );
            }

            let credentials = Credentials::from_env()?;
            let _t = utils::Timer::start(format!("Upload {:?}", name));
            let uploader = SiteUploader::new(&config.site, credentials);

            match uploader.upload(&UploadRequest::new(&name, &file)).await? {
                UploadOutcome::Confirmed(url) => println!("{}", url),
                UploadOutcome::Unconfirmed(url) => {
                    println!("Uploaded, but the new instant could not be confirmed: {}", url)
                }
            }
        }

        Command::Chat { user } => {
            let credentials =
                Credentials::from_env().context("Refusing to start without site credentials")?;
            let uploader: Arc<dyn Uploader> =
                Arc::new(SiteUploader::new(&config.site, credentials));
            let registry = Registry::new(Driver::new(uploader, &config.upload));
            let search = SearchClient::new(&config.site).context("Failed to build search client")?;

            info!("Chat session for user {} (Ctrl-D to quit)", user);
            let console = Console {
                registry: &registry,
                search: &search,
                user,
                max_inline_results: config.bot.max_inline_results,
            };
            console
                .run(tokio::io::BufReader::new(tokio::io::stdin()), tokio::io::stdout())
                .await?;
        }
    }

    Ok(())
}
