// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::curator::Curator;
use crate::error::{CurationError, CycleKind};

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub fetch_interval: Duration,
    pub process_interval: Duration,
}

impl SchedulerCfg {
    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        Self {
            fetch_interval: settings.fetch_interval,
            process_interval: settings.process_interval,
        }
    }
}

/// Spawn one ticker per cycle kind. The first tick fires immediately.
pub fn spawn_periodic(curator: Arc<Curator>, cfg: SchedulerCfg) -> [JoinHandle<()>; 2] {
    let fetch = {
        let curator = curator.clone();
        spawn_ticker(cfg.fetch_interval, CycleKind::Fetch, move || {
            let curator = curator.clone();
            async move {
                curator.run_fetch_cycle().await.map(|stats| {
                    tracing::debug!(target: "ingest", new = stats.articles_new, "scheduled fetch done");
                })
            }
        })
    };
    let process = spawn_ticker(cfg.process_interval, CycleKind::Process, move || {
        let curator = curator.clone();
        async move {
            curator.run_process_cycle().await.map(|report| {
                tracing::debug!(
                    target: "enrich",
                    processed = report.stats.processed,
                    auto_approved = report.auto_approved.len(),
                    "scheduled process done"
                );
            })
        }
    });
    [fetch, process]
}

fn spawn_ticker<F, Fut>(every: Duration, kind: CycleKind, mut run: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<(), CurationError>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match run().await {
                Ok(()) => {}
                Err(CurationError::CycleBusy(_)) => {
                    counter!("curation_scheduler_busy_total", "cycle" => kind.to_string())
                        .increment(1);
                    tracing::info!(target: "scheduler", cycle = %kind, "previous cycle still running, tick skipped");
                }
                Err(e) => {
                    counter!("curation_scheduler_errors_total", "cycle" => kind.to_string())
                        .increment(1);
                    tracing::error!(target: "scheduler", cycle = %kind, error = %e, "cycle failed");
                }
            }
        }
    })
}
