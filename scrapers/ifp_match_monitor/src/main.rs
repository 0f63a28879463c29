use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::{fs, path::PathBuf, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ifp_match_monitor::{
    config::MonitorConfig,
    monitor::{Monitor, MonitorServices, MonitorSettings},
    name_matcher::NameMatcher,
    page_parser,
    page_source::HttpPageSource,
    search_client::ComboSearchClient,
    sms::{LogSender, RateLimitedSender, SmsSender, TwilioSender},
    store::Store,
    web::{self, AppState},
};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the control surface and the match monitor
    Serve {
        /// Start polling right away instead of waiting for /start
        #[arg(long)]
        autostart: bool,
    },
    /// Resolve a player name against the tournament's user index
    Search {
        name: String,
    },
    /// Print the matches found in a saved match list page
    ParsePage {
        #[arg(short, long)]
        file: PathBuf,
    },
}

fn sms_sender(config: &MonitorConfig, client: reqwest::Client) -> Result<Arc<dyn SmsSender>> {
    let per_second = config.sms.per_second;
    if config.sms.disabled {
        warn!("SMS sending disabled, messages will only be logged");
        let sender = LogSender::new(config.sms.from_numbers.clone());
        return Ok(Arc::new(RateLimitedSender::new(sender, per_second)));
    }
    let sender = TwilioSender::new(client, &config.sms).context("configuring Twilio")?;
    Ok(Arc::new(RateLimitedSender::new(sender, per_second)))
}

async fn serve(config: MonitorConfig, autostart: bool) -> Result<()> {
    let client = config.http_client()?;
    let services = MonitorServices {
        pages: Arc::new(HttpPageSource::new(client.clone(), &config.upstream.base_url)),
        search: Arc::new(ComboSearchClient::new(client.clone(), &config.upstream.base_url)),
        sms: sms_sender(&config, client)?,
    };
    let settings = MonitorSettings {
        admin_number: config.admin_number.clone(),
        poll_interval: config.poll_interval(),
    };
    let store = Store::open(&config.data_dir)
        .with_context(|| format!("opening data directory {:?}", config.data_dir))?;
    let monitor = Arc::new(Monitor::new(services, store, settings)?);

    if autostart {
        monitor.start().await?;
    }

    web::serve(AppState { monitor }, config.port).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = MonitorConfig::from_env();

    match cli.command {
        Commands::Serve { autostart } => serve(config, autostart).await?,
        Commands::Search { name } => {
            let client = config.http_client()?;
            let search = ComboSearchClient::new(client, &config.upstream.base_url);
            let names = NameMatcher::new(Arc::new(search)).search(&name).await?;
            info!("{} result(s) for '{}'", names.len(), name);
            for name in names {
                println!("{}", name);
            }
        }
        Commands::ParsePage { file } => {
            let html = fs::read_to_string(&file)
                .with_context(|| format!("reading {:?}", file))?;
            for m in page_parser::parse_matches(&html) {
                println!("{}", serde_json::to_string(&m)?);
            }
        }
    }

    Ok(())
}
