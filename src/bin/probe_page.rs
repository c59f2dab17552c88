//! Opens one page in headless Chrome and reports which known selectors match.
//! Used to spot markup drift.

use anyhow::Result;
use clap::Parser;
use tokio::time::sleep;

use closet_crawler::browser::chrome::ChromeSession;
use closet_crawler::browser::BrowserSession;
use closet_crawler::classifier::classify;
use closet_crawler::selectors::SiteSelectors;
use closet_crawler::HarvestConfig;

#[derive(Parser)]
#[command(name = "probe_page", about = "Report which selectors match on a page")]
struct Args {
    url: String,

    #[arg(long)]
    headed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let target = classify(&args.url)?;
    println!("🕵️ {} page: {}", target.kind.as_str(), target.normalized);

    let mut config = HarvestConfig::from_env();
    if args.headed {
        config.headless = false;
    }

    let session = ChromeSession::launch(&config)?;
    session.navigate(&target.normalized)?;
    sleep(config.page_settle).await;

    let title = session
        .execute_script("document.title")?
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default();
    println!("Title: {}", title);
    println!("Final URL: {}", session.current_url()?);

    let selectors = SiteSelectors::default();
    for (name, selector) in selectors.named() {
        let found = session.find_all(selector)?;
        let marker = if found.is_empty() { "❌" } else { "✅" };
        let sample = found
            .first()
            .map(|el| el.text().trim().chars().take(40).collect::<String>())
            .unwrap_or_default();
        println!("{} {:<24} {:>4}  {}", marker, name, found.len(), sample);
    }

    session.close()?;
    Ok(())
}
