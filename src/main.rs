use std::sync::Arc;

use anyhow::Context;
use prometheus::Registry;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};

use caselaw_worker::{
    config::Config,
    observability::{Metrics, logging},
    pipeline::PipelineOrchestrator,
    source::{SourceFilter, StoreBackedSource},
    store::dao::{DocumentDao, PgDocumentDao},
    util::cancel,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(|s| s.as_str())
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                column = location.column(),
                message,
                "panic occurred"
            );
        } else {
            error!(
                thread = thread_name,
                message, "panic occurred without location information"
            );
        }
    }));

    logging::init();

    let config = Config::from_env().context("failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .min_connections(config.db_min_connections())
        .acquire_timeout(config.db_acquire_timeout())
        .connect(config.db_dsn())
        .await
        .context("failed to connect to the document store")?;

    let pg_dao = Arc::new(PgDocumentDao::new(pool));
    pg_dao
        .ensure_schema()
        .await
        .context("failed to ensure store schema")?;
    let dao: Arc<dyn DocumentDao> = pg_dao;

    let registry = Arc::new(Registry::new());
    let metrics = Arc::new(Metrics::new(&registry).context("failed to register metrics")?);

    let orchestrator = PipelineOrchestrator::builder(Arc::clone(&dao))
        .with_settings(config.pipeline_settings())
        .with_metrics(metrics)
        .build();

    let (cancel_handle, cancel_token) = cancel::cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling in-flight records");
            cancel_handle.cancel();
        }
    });

    let source = StoreBackedSource::new(dao);
    let filter = SourceFilter {
        max_records: config.batch_max_records(),
        ..SourceFilter::default()
    };

    let report = orchestrator
        .run(&source, &filter, &cancel_token)
        .await
        .context("enrichment run failed")?;

    info!(
        run_id = %report.run_id,
        attempted = report.records_attempted,
        new = report.new,
        updated = report.updated,
        unchanged = report.unchanged,
        errors = report.errors,
        cancelled = report.cancelled,
        unresolved_courts = report.unresolved_courts.len(),
        unmatched_judge_initials = report.unmatched_judge_initials.len(),
        "run report"
    );
    for entry in report.unresolved_courts.iter().take(10) {
        info!(signal = %entry.signal, count = entry.count, "unresolved court");
    }
    for entry in report.unmatched_judge_initials.iter().take(10) {
        info!(signal = %entry.signal, count = entry.count, "unmatched judge initials");
    }

    Ok(())
}
