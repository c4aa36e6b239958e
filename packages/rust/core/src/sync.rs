//! Database sync driver: query every page, then synchronize them concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use notionsync_notion::{PageSource, query_all_pages};
use notionsync_shared::{Page, PageRecord, PropertyNames, Result, SyncConfig, SyncError};

use crate::assets::AssetFetcher;
use crate::diagnostics::{DiagnosticSink, JsonFileSink, NoopSink};
use crate::document::slugify;
use crate::page::{PageOutcome, PageSynchronizer};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// A page that could not be synchronized.
#[derive(Debug, Clone)]
pub struct PageFailure {
    pub page_id: String,
    /// Known when the title was readable.
    pub slug: Option<String>,
    pub error: String,
}

/// Per-page ledger of one sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Pages returned by the database query.
    pub total: usize,
    pub succeeded: Vec<PageOutcome>,
    pub failed: Vec<PageFailure>,
    pub elapsed: Duration,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting sync status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once the query has returned every page.
    fn pages_found(&self, total: usize);
    /// Called when a page finishes, successfully or not.
    fn page_finished(&self, label: &str, ok: bool, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &SyncReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn pages_found(&self, _total: usize) {}
    fn page_finished(&self, _label: &str, _ok: bool, _current: usize, _total: usize) {}
    fn done(&self, _report: &SyncReport) {}
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Pulls a whole database and fans page synchronization out over a bounded pool.
pub struct SyncDriver {
    source: Arc<dyn PageSource>,
    synchronizer: Arc<PageSynchronizer>,
    sink: Arc<dyn DiagnosticSink>,
    database_id: String,
    properties: PropertyNames,
    concurrency: usize,
}

impl SyncDriver {
    /// Build a driver from the runtime config.
    ///
    /// Query responses are dumped to `config.dump_path` when it is set.
    pub fn new(source: Arc<dyn PageSource>, config: &SyncConfig) -> Result<Self> {
        if config.database_id.trim().is_empty() {
            return Err(SyncError::config(
                "no database id configured (set notion.database_id or pass --database)",
            ));
        }

        let fetcher = AssetFetcher::new(config.request_timeout, config.retry.clone())?;
        let synchronizer = PageSynchronizer::new(
            Arc::clone(&source),
            fetcher,
            &config.content_root,
            &config.category,
        );
        let sink: Arc<dyn DiagnosticSink> = match &config.dump_path {
            Some(path) => Arc::new(JsonFileSink::new(path)),
            None => Arc::new(NoopSink),
        };

        Ok(Self {
            source,
            synchronizer: Arc::new(synchronizer),
            sink,
            database_id: config.database_id.clone(),
            properties: config.properties.clone(),
            concurrency: config.concurrency.max(1),
        })
    }

    /// Replace the diagnostic sink.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run one full sync.
    ///
    /// Only a failed database query aborts the run. Every page-level problem
    /// (unreadable properties, slug collisions, fetch or write errors, even a
    /// panicking task) lands in [`SyncReport::failed`].
    #[instrument(skip_all, fields(database_id = %self.database_id, concurrency = self.concurrency))]
    pub async fn run(&self, progress: &dyn ProgressReporter) -> Result<SyncReport> {
        let start = Instant::now();

        progress.phase("Querying database");
        let snapshot = query_all_pages(self.source.as_ref(), &self.database_id).await?;

        if let Err(e) = self.sink.record_query(&self.database_id, &snapshot.responses).await {
            warn!(error = %e, "failed to record query responses");
        }

        let mut report = SyncReport {
            total: snapshot.records.len(),
            ..SyncReport::default()
        };

        let pages = self.plan(&snapshot.records, &mut report.failed);
        progress.pages_found(report.total);
        progress.phase("Synchronizing pages");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(pages.len());

        for (page, slug) in pages {
            let sem = Arc::clone(&semaphore);
            let synchronizer = Arc::clone(&self.synchronizer);
            let page_id = page.id.clone();

            let handle = tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| SyncError::validation(format!("worker pool closed: {e}")))?;
                synchronizer.sync(&page).await
            });
            handles.push((page_id, slug, handle));
        }

        let mut finished = report.failed.len();
        for (page_id, slug, handle) in handles {
            let result = match handle.await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(format!("page task failed: {e}")),
            };
            finished += 1;

            match result {
                Ok(outcome) => {
                    progress.page_finished(&slug, true, finished, report.total);
                    report.succeeded.push(outcome);
                }
                Err(error) => {
                    warn!(%page_id, %slug, %error, "page sync failed");
                    progress.page_finished(&slug, false, finished, report.total);
                    report.failed.push(PageFailure {
                        page_id,
                        slug: Some(slug),
                        error,
                    });
                }
            }
        }

        report.elapsed = start.elapsed();
        info!(
            total = report.total,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "sync complete"
        );
        progress.done(&report);

        Ok(report)
    }

    /// Decode records and claim slugs in query order.
    ///
    /// Records that cannot be decoded, and later pages whose slug is already
    /// claimed, are recorded as failures and not synchronized.
    fn plan(&self, records: &[PageRecord], failed: &mut Vec<PageFailure>) -> Vec<(Page, String)> {
        let mut claimed: HashMap<String, String> = HashMap::new();
        let mut pages = Vec::with_capacity(records.len());

        for record in records {
            let page = match Page::from_record(record, &self.properties) {
                Ok(page) => page,
                Err(e) => {
                    warn!(page_id = %record.id, error = %e, "skipping unreadable page");
                    failed.push(PageFailure {
                        page_id: record.id.clone(),
                        slug: None,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let slug = match slugify(&page.title) {
                Ok(slug) => slug,
                Err(e) => {
                    failed.push(PageFailure {
                        page_id: page.id,
                        slug: None,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            if let Some(existing_id) = claimed.get(&slug) {
                let err = SyncError::SlugCollision {
                    slug: slug.clone(),
                    page_id: page.id.clone(),
                    existing_id: existing_id.clone(),
                };
                warn!(error = %err, "slug collision");
                failed.push(PageFailure {
                    page_id: page.id,
                    slug: Some(slug),
                    error: err.to_string(),
                });
                continue;
            }

            claimed.insert(slug.clone(), page.id.clone());
            pages.push((page, slug));
        }

        pages
    }
}
