pub mod extract;
pub mod pipeline;

pub use extract::{extract_html, ContentFetcher, Extracted, HttpContentExtractor};
pub use pipeline::{ProcessLimits, ProcessStats, ProcessingPipeline};

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("curation_process_cycles_total", "Completed processing cycles.");
        describe_counter!(
            "curation_process_articles_total",
            "Articles processed, labelled by outcome."
        );
        describe_histogram!(
            "curation_process_extract_ms",
            "Article fetch + extraction time in milliseconds."
        );
        describe_gauge!(
            "curation_process_last_run_ts",
            "Unix ts when the processing pipeline last ran."
        );
    });
}
