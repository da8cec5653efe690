//! Durable telemetry: a single-writer queue in front of an embedded
//! `redb` database, plus a synchronous time-ranged read path.
//!
//! [`TelemetryStore`] is a cheap, cloneable handle. Any number of
//! connection managers [`submit`](TelemetryStore::submit) samples; one
//! background thread commits them in submission order. Reads open their
//! own read transaction and never wait on the writer.
//!
//! If the database cannot be opened the store comes up *unavailable*:
//! submits are refused, queries return nothing, and the rest of the
//! system keeps running.

mod schema;
mod writer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableError};
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::model::history::timestamp_key;
use crate::model::{DeviceId, HistoryPoint, TelemetrySample};

use schema::{CURRENT_HISTORY, KEY_UPPER_BOUND};
use writer::WriterShared;

/// How long an abandoned writer gets to discard its backlog and release
/// the database after the join timeout.
const RELEASE_TIMEOUT: Duration = Duration::from_secs(1);

// ── ShutdownReport ───────────────────────────────────────────────────

/// Outcome of [`TelemetryStore::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// The writer drained its queue and exited within the join timeout.
    pub drained: bool,
    /// Samples still queued when the join timed out. They are lost.
    pub lost: usize,
}

// ── TelemetryStore ───────────────────────────────────────────────────

/// Handle to the telemetry database and its writer.
#[derive(Clone)]
pub struct TelemetryStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    config: StoreConfig,
    backend: Option<Backend>,
}

struct Backend {
    db: RwLock<Option<Arc<Database>>>,
    queue: Mutex<Option<mpsc::Sender<TelemetrySample>>>,
    shared: Arc<WriterShared>,
    done: Mutex<Option<mpsc::Receiver<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for TelemetryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryStore")
            .field("path", &self.inner.config.path)
            .field("available", &self.is_available())
            .finish()
    }
}

impl TelemetryStore {
    /// Open (or create) the database and start the writer thread.
    ///
    /// Never fails: an unopenable database yields an unavailable store
    /// and an error in the log.
    pub fn open(config: StoreConfig) -> Self {
        let backend = match Backend::start(&config) {
            Ok(backend) => {
                info!(path = %config.path.display(), "telemetry store opened");
                Some(backend)
            }
            Err(e) => {
                error!(
                    path = %config.path.display(),
                    error = %e,
                    "telemetry store unavailable, history disabled"
                );
                None
            }
        };
        Self {
            inner: Arc::new(StoreInner { config, backend }),
        }
    }

    /// A store that was never opened. Every operation is a no-op.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config: StoreConfig::new(""),
                backend: None,
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// `true` while the database is open and accepting samples.
    pub fn is_available(&self) -> bool {
        self.inner
            .backend
            .as_ref()
            .is_some_and(|b| !b.closed.load(Ordering::Acquire))
    }

    // ── Write path ───────────────────────────────────────────────────

    /// Queue a sample for the writer. Returns immediately.
    pub fn submit(&self, sample: TelemetrySample) -> Result<(), StoreError> {
        let backend = self.inner.backend.as_ref().ok_or(StoreError::Unavailable)?;
        let queue = backend.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = queue.as_ref().ok_or(StoreError::Closed)?;

        backend.shared.pending.fetch_add(1, Ordering::AcqRel);
        sender.send(sample).map_err(|_| {
            backend.shared.pending.fetch_sub(1, Ordering::AcqRel);
            StoreError::Closed
        })
    }

    // ── Read path ────────────────────────────────────────────────────

    /// Samples for `device_id` with `timestamp >= since`, ascending.
    pub fn query(
        &self,
        device_id: &DeviceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<HistoryPoint>, StoreError> {
        self.query_range(device_id, since, None)
    }

    /// Samples in `[since, until]`, ascending. `until = None` is open-ended.
    pub fn query_range(
        &self,
        device_id: &DeviceId,
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<HistoryPoint>, StoreError> {
        let Some(backend) = &self.inner.backend else {
            return Ok(Vec::new());
        };
        let db = backend
            .db
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StoreError::Closed)?;

        let txn = db.begin_read()?;
        let table = match txn.open_table(CURRENT_HISTORY) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let lower = timestamp_key(since);
        let upper = until.map_or_else(|| KEY_UPPER_BOUND.to_owned(), timestamp_key);
        let id = device_id.as_str();

        let mut points = Vec::new();
        for entry in table.range((id, lower.as_str())..=(id, upper.as_str()))? {
            let (key, value) = entry?;
            let (_, stamp) = key.value();
            let timestamp = DateTime::parse_from_rfc3339(stamp)
                .map_err(|e| StoreError::Timestamp(format!("{stamp}: {e}")))?
                .with_timezone(&Utc);
            points.push(HistoryPoint {
                timestamp,
                value: value.value(),
            });
        }

        debug!(device = %device_id, count = points.len(), "history query");
        Ok(points)
    }

    // ── Shutdown ─────────────────────────────────────────────────────

    /// Stop accepting samples, let the writer drain, and close the
    /// database.
    ///
    /// Blocks for at most the configured join timeout. Samples still
    /// queued when it elapses are discarded and counted in the report.
    /// The abandoned writer then gets a further short window to finish
    /// its current commit and close the file; if it overruns that too,
    /// the database file stays locked until the thread exits and `lost`
    /// is the queue depth at the time.
    ///
    /// Call from a blocking context (`spawn_blocking`) inside a runtime.
    pub fn shutdown(&self) -> ShutdownReport {
        let Some(backend) = &self.inner.backend else {
            return ShutdownReport {
                drained: true,
                lost: 0,
            };
        };

        // Dropping the only sender lets the writer see `Disconnected`
        // once the queue is empty.
        drop(
            backend
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        backend.shared.stop.store(true, Ordering::Release);

        let done = backend.done.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(done) = done else {
            debug!("telemetry store already shut down");
            return ShutdownReport {
                drained: true,
                lost: 0,
            };
        };

        let report = match done.recv_timeout(self.inner.config.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                backend.join_writer();
                info!("telemetry store drained and closed");
                ShutdownReport {
                    drained: true,
                    lost: 0,
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                backend.shared.abandon.store(true, Ordering::Release);
                let lost = match done.recv_timeout(RELEASE_TIMEOUT) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        backend.join_writer();
                        backend.shared.discarded.load(Ordering::Acquire)
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        warn!("telemetry writer still busy, database stays open until it exits");
                        backend.shared.pending.load(Ordering::Acquire)
                    }
                };
                error!(
                    lost,
                    timeout = ?self.inner.config.join_timeout,
                    "telemetry writer did not drain in time, queued samples lost"
                );
                ShutdownReport {
                    drained: false,
                    lost,
                }
            }
        };

        backend.closed.store(true, Ordering::Release);
        backend.db.write().unwrap_or_else(PoisonError::into_inner).take();
        report
    }
}

impl Backend {
    fn join_writer(&self) {
        let handle = self.writer.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("telemetry writer panicked");
            }
        }
    }

    fn start(config: &StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&config.path)?;
        let txn = db.begin_write()?;
        txn.open_table(CURRENT_HISTORY)?;
        txn.commit()?;
        let db = Arc::new(db);

        let (queue_tx, queue_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let shared = Arc::new(WriterShared::default());

        let writer = {
            let db = Arc::clone(&db);
            let shared = Arc::clone(&shared);
            let poll = config.poll_interval;
            std::thread::Builder::new()
                .name("telemetry-writer".into())
                .spawn(move || writer::run(db, queue_rx, shared, poll, done_tx))?
        };

        Ok(Self {
            db: RwLock::new(Some(db)),
            queue: Mutex::new(Some(queue_tx)),
            shared,
            done: Mutex::new(Some(done_rx)),
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
        })
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        let pending = self.shared.pending.load(Ordering::Acquire);
        if !self.closed.load(Ordering::Acquire) && pending > 0 {
            warn!(pending, "telemetry store dropped without shutdown");
        }
    }
}
