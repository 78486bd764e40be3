use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use relay_types::models::Watermark;
use relay_types::store::CatalogSource;

use crate::cursor::CursorStore;
use crate::dispatcher::Dispatcher;
use crate::job::NotificationJob;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub tables: Vec<String>,
    pub interval: Duration,
    /// Most rows read from one table per tick.
    pub batch_size: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            tables: vec!["movies".into(), "movie_items".into()],
            interval: Duration::from_secs(60),
            batch_size: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A previous scan was still running; nothing was read.
    Skipped,
    Completed { jobs: usize },
}

/// Held for the duration of one scan.
struct ScanGuard<'a>(&'a AtomicBool);

impl<'a> ScanGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Detects catalog rows added since the last scan and dispatches them.
///
/// Each configured table carries its own watermark. The first successful
/// read of a table only records its newest row, so history is never
/// re-announced after a restart. Scans never overlap.
pub struct Poller {
    catalog: Arc<dyn CatalogSource>,
    dispatcher: Dispatcher,
    config: PollerConfig,
    cursors: Mutex<CursorStore>,
    scanning: AtomicBool,
}

impl Poller {
    pub fn new(catalog: Arc<dyn CatalogSource>, dispatcher: Dispatcher, config: PollerConfig) -> Self {
        Self {
            catalog,
            dispatcher,
            config,
            cursors: Mutex::new(CursorStore::new()),
            scanning: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// The table's watermark: `None` before bootstrap, `Some(None)` for a
    /// table that was empty at bootstrap.
    pub fn watermark(&self, table: &str) -> Option<Option<Watermark>> {
        self.cursors.lock().ok()?.get(table)
    }

    fn is_bootstrapped(&self, table: &str) -> bool {
        self.cursors
            .lock()
            .map(|c| c.is_bootstrapped(table))
            .unwrap_or(false)
    }

    /// Record the newest row of every table that has no watermark yet.
    /// Returns how many tables are bootstrapped afterwards.
    pub async fn bootstrap(&self) -> usize {
        let mut ready = 0;
        for table in &self.config.tables {
            if self.bootstrap_table(table).await {
                ready += 1;
            }
        }
        ready
    }

    async fn bootstrap_table(&self, table: &str) -> bool {
        if self.is_bootstrapped(table) {
            return true;
        }
        match self.catalog.latest_row(table).await {
            Ok(latest) => {
                match &latest {
                    Some(row) => info!("Watching {} from #{} ({})", table, row.id, row.created_at),
                    None => info!("Watching {} (empty)", table),
                }
                if let Ok(mut cursors) = self.cursors.lock() {
                    cursors.bootstrap(table, latest.as_ref());
                }
                true
            }
            Err(e) => {
                warn!("Cannot bootstrap {}: {:#}", table, e);
                false
            }
        }
    }

    /// One scan over every table. Returns immediately with
    /// [`TickOutcome::Skipped`] if another scan is in progress.
    pub async fn tick(&self) -> TickOutcome {
        let Some(_guard) = ScanGuard::acquire(&self.scanning) else {
            debug!("Previous scan still running, skipping tick");
            return TickOutcome::Skipped;
        };

        let mut jobs = 0;
        for table in &self.config.tables {
            if self.dispatcher.shutdown_token().is_cancelled() {
                break;
            }
            if !self.is_bootstrapped(table) {
                // A table that failed to bootstrap is never scanned from
                // scratch; retry the bootstrap instead.
                self.bootstrap_table(table).await;
                continue;
            }
            jobs += self.scan_table(table).await;
        }
        TickOutcome::Completed { jobs }
    }

    async fn scan_table(&self, table: &str) -> usize {
        let Some(after) = self.watermark(table) else {
            return 0;
        };

        let rows = match self.catalog.rows_after(table, after, self.config.batch_size).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Scan of {} failed: {:#}", table, e);
                return 0;
            }
        };
        if rows.is_empty() {
            return 0;
        }
        info!("{} new row(s) in {}", rows.len(), table);

        let mut jobs = 0;
        for row in rows {
            if self.dispatcher.shutdown_token().is_cancelled() {
                break;
            }
            match NotificationJob::new(table, row.clone()) {
                Some(job) => {
                    self.dispatcher.dispatch(&job).await;
                    jobs += 1;
                }
                None => debug!("{} #{} has no usable link, not announced", table, row.id),
            }
            // Advance whatever the delivery outcome.
            match self.cursors.lock() {
                Ok(mut cursors) => {
                    cursors.advance(table, &row);
                }
                Err(e) => error!("Cursor store poisoned: {}", e),
            }
        }
        jobs
    }

    /// Run [`Poller::tick`] every `interval` until the dispatcher's shutdown
    /// token is cancelled. The first scan happens one interval after start.
    pub fn start(self: Arc<Self>) -> PollerHandle {
        let shutdown = self.dispatcher.shutdown_token().clone();
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if let TickOutcome::Completed { jobs } = self.tick().await {
                            if jobs > 0 {
                                info!("Tick complete: {} notification(s)", jobs);
                            }
                        }
                    }
                }
            }
            info!("Poller stopped");
        });
        PollerHandle { shutdown, task }
    }
}

pub struct PollerHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Request shutdown and wait for the loop to exit. An in-flight dispatch
    /// finishes its current subscriber first.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!("Poller task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
