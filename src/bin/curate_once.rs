//! One-shot operator run: fetch all enabled sources, process a batch, print the stats.
//! Honors the same env as the server (`.env`, `CURATION_STORE_PATH`, `AUTO_APPROVE`, ...).

use anyhow::Context;
use regional_news_curator::{
    config::{CurationConfig, Settings},
    ingest::config::load_sources_default,
    Curator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let settings = Settings::from_env();
    let config = CurationConfig::load().context("loading curation config")?;
    let seeds = load_sources_default().context("loading seed sources")?;
    let curator = Curator::from_settings(&settings, &config, &seeds)?;

    let fetched = curator.run_fetch_cycle().await?;
    println!("fetch:   {}", serde_json::to_string(&fetched)?);

    let processed = curator.run_process_cycle().await?;
    println!("process: {}", serde_json::to_string(&processed)?);

    println!("stats:   {}", serde_json::to_string(&curator.stats()?)?);
    for status in curator.platform_status() {
        println!("{:<10} {:?}", status.platform.to_string(), status.state);
    }
    Ok(())
}
