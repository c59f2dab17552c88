use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use closet_crawler::browser::chrome::ChromeSession;
use closet_crawler::catalog::load_products;
use closet_crawler::ledger::FileLedger;
use closet_crawler::media::HttpFetcher;
use closet_crawler::{HarvestConfig, HarvestReport, HarvestRequest, Harvester};

#[derive(Parser)]
#[command(name = "closet-crawler", version, about = "Download listings and photos from a marketplace item or closet")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the result as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Output root folder
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Failed-download ledger file
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    #[arg(long, global = true)]
    max_rounds: Option<u32>,

    /// Stop after this many closet items
    #[arg(long, global = true)]
    max_items: Option<usize>,

    /// Concurrent image downloads per item
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    /// Skip the not-found check before harvesting
    #[arg(long, global = true)]
    no_preflight: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest a single item page
    Item { url: String },
    /// Harvest every item in a member's closet
    Profile { url: String },
    /// List harvested items found under a folder
    Catalog { dir: Option<PathBuf> },
}

impl Cli {
    fn apply(&self, mut config: HarvestConfig) -> HarvestConfig {
        if let Some(dir) = &self.output {
            config.output_dir = dir.clone();
        }
        if let Some(path) = &self.ledger {
            config.ledger_path = path.clone();
        }
        if let Some(rounds) = self.max_rounds {
            config.max_scroll_rounds = rounds;
        }
        if let Some(n) = self.max_items {
            config.max_items = Some(n);
        }
        if let Some(n) = self.concurrency {
            config.download_concurrency = n.max(1);
        }
        if self.headed {
            config.headless = false;
        }
        if self.no_preflight {
            config.preflight = false;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "closet_crawler=debug"
    } else {
        "closet_crawler=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = cli.apply(HarvestConfig::from_env());

    let request = match &cli.command {
        Command::Item { url } => HarvestRequest::Item(url.clone()),
        Command::Profile { url } => HarvestRequest::Profile(url.clone()),
        Command::Catalog { dir } => {
            let dir = dir.clone().unwrap_or_else(|| config.output_dir.clone());
            let products = load_products(&dir)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&products)?);
            } else {
                for p in &products {
                    println!("{}  {:.2}  {} images", p.id, p.price, p.images.len());
                }
                println!("{} products in {}", products.len(), dir.display());
            }
            return Ok(());
        }
    };

    info!("♻️ Loading all infos... 💤");
    let session = ChromeSession::launch(&config)?;
    let fetcher = HttpFetcher::new(&config.user_agent)?;
    let ledger = FileLedger::new(config.ledger_path.clone());

    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupted, stopping after the current item");
            on_signal.cancel();
        }
    });

    let report = Harvester::new(&session, &fetcher, &ledger, config)
        .with_cancellation(token)
        .run(request)
        .await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &HarvestReport) {
    if let Some(profile) = &report.profile {
        println!("👤 {} -> {}", profile.username, profile.folder.display());
    }
    for item in &report.items {
        println!(
            "👔 {}: {} images{}",
            item.display_name,
            item.images_saved,
            if item.already_harvested { " (already harvested)" } else { "" }
        );
    }
    match report.expected_count {
        Some(expected) => println!("✅ {} of {} items harvested", report.count, expected),
        None => println!("✅ {} items harvested", report.count),
    }
    if !report.item_failures.is_empty() {
        println!("❌ {} items failed", report.item_failures.len());
    }
    if !report.image_failures.is_empty() {
        println!("❌ {} images failed (see ledger)", report.image_failures.len());
    }
    if report.truncated {
        println!("⚠️ Stopped at the item cap");
    }
    if report.cancelled {
        println!("🛑 Cancelled before all items were processed");
    }
}
