// 🔄 Import Runner - one fetch → reconcile → upsert pass
//
// Order matters: the remote batch is fetched BEFORE anything touches the
// database, so a failing source leaves `stores` exactly as it was.

use crate::clock::{Clock, SystemClock};
use crate::db::{StoreRepository, SyncEvent};
use crate::error::ImportError;
use crate::reconciliation::{ReconcileStats, ReconciliationEngine, StoreFeed};
use crate::sources::BatchSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

pub const EVENT_STORES_IMPORTED: &str = "stores_imported";
pub const EVENT_ACTOR: &str = "store-sync";

/// Summary of one committed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub run_id: String,
    pub feed: StoreFeed,
    pub source: String,
    pub stats: ReconcileStats,
    /// Rows inserted or updated by the upsert.
    pub upserted: usize,
    pub active_keys: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ImportReport {
    pub fn summary(&self) -> String {
        format!(
            "{} from {}: {} received, {} upserted, {} invalid, {} duplicates, {} unresolved franchise",
            self.feed.as_str(),
            self.source,
            self.stats.received,
            self.upserted,
            self.stats.invalid,
            self.stats.duplicates,
            self.stats.unresolved_franchise
        )
    }
}

pub fn run_import<S, R>(source: &S, repository: &mut R, engine: &ReconciliationEngine) -> Result<ImportReport, ImportError>
where
    S: BatchSource + ?Sized,
    R: StoreRepository + ?Sized,
{
    run_import_with_clock(source, repository, engine, &SystemClock)
}

/// Same as [`run_import`], with report and audit timestamps read from `clock`.
pub fn run_import_with_clock<S, R>(
    source: &S,
    repository: &mut R,
    engine: &ReconciliationEngine,
    clock: &dyn Clock,
) -> Result<ImportReport, ImportError>
where
    S: BatchSource + ?Sized,
    R: StoreRepository + ?Sized,
{
    let run_id = uuid::Uuid::new_v4().to_string();
    let started_at = clock.now();

    if source.feed() != engine.feed() {
        warn!(
            source = source.name(),
            source_feed = source.feed().as_str(),
            engine_feed = engine.feed().as_str(),
            "source and engine feeds differ; normalizing with the engine's feed"
        );
    }

    let raw_batch = source.fetch_batch().map_err(|cause| ImportError::Fetch {
        source_name: source.name().to_string(),
        cause,
    })?;

    let franchises = repository.load_franchise_lookup().map_err(ImportError::Persistence)?;
    let outcome = engine.reconcile(&raw_batch, &franchises);

    let upserted = repository
        .persist_upsert_batch(&outcome.batch)
        .map_err(ImportError::Persistence)?;

    let report = ImportReport {
        run_id,
        feed: engine.feed(),
        source: source.name().to_string(),
        stats: outcome.stats,
        upserted,
        active_keys: outcome.active_keys,
        started_at,
        finished_at: clock.now(),
    };

    let event = SyncEvent::new(
        EVENT_STORES_IMPORTED,
        "store_feed",
        report.feed.as_str(),
        json!({
            "run_id": report.run_id,
            "source": report.source,
            "stats": report.stats,
            "upserted": report.upserted,
        }),
        EVENT_ACTOR,
    )
    .at(report.finished_at);

    if let Err(e) = repository.record_event(&event) {
        warn!(run_id = %report.run_id, error = %e, "import committed but audit event was not written");
    }

    info!(
        run_id = %report.run_id,
        feed = report.feed.as_str(),
        received = report.stats.received,
        upserted = report.upserted,
        invalid = report.stats.invalid,
        duplicates = report.stats.duplicates,
        "store import finished"
    );

    Ok(report)
}
