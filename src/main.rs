//! Regional news curator — binary entrypoint.
//! Boots the curator, the periodic fetch/process triggers and the ops router.

use std::sync::Arc;

use anyhow::Context;
use regional_news_curator::{
    api::{self, AppState},
    config::{CurationConfig, Settings},
    ingest::config::load_sources_default,
    metrics::Metrics,
    scheduler::{spawn_periodic, SchedulerCfg},
    Curator,
};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("regional_news_curator=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    // try_init: the shuttle runtime may already have installed a subscriber.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::from_env();
    let config = CurationConfig::load().context("loading curation config")?;
    let seeds = load_sources_default().context("loading seed sources")?;

    let curator = Arc::new(
        Curator::from_settings(&settings, &config, &seeds).context("building curator")?,
    );
    let metrics = Metrics::init()?;

    for status in curator.platform_status() {
        tracing::info!(platform = %status.platform, state = ?status.state, "publisher");
    }

    spawn_periodic(curator.clone(), SchedulerCfg::from_settings(&settings));

    let router = api::create_router(AppState { curator }, Some(&metrics));
    Ok(router.into())
}
