// ── Background writer ──
//
// The only code path that writes to the database. Runs on its own OS
// thread so commit latency never reaches the async connection managers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use redb::{Database, ReadableTable};
use tracing::{debug, error, info, trace, warn};

use super::schema::CURRENT_HISTORY;
use crate::error::StoreError;
use crate::model::TelemetrySample;

/// Counters and flags shared between the store handle and its writer.
#[derive(Debug, Default)]
pub(super) struct WriterShared {
    /// Samples submitted but not yet taken off the queue.
    pub pending: AtomicUsize,
    /// Set at shutdown. An idle writer exits on its next poll.
    pub stop: AtomicBool,
    /// Set when the join timed out: remaining samples are discarded.
    pub abandon: AtomicBool,
    /// Samples dropped unwritten because of `abandon`.
    pub discarded: AtomicUsize,
    pub written: AtomicU64,
    pub rejected: AtomicU64,
    pub failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Commit {
    Inserted,
    Duplicate,
}

pub(super) fn run(
    db: Arc<Database>,
    queue: Receiver<TelemetrySample>,
    shared: Arc<WriterShared>,
    poll_interval: Duration,
    done: Sender<()>,
) {
    debug!("telemetry writer started");

    loop {
        match queue.recv_timeout(poll_interval) {
            Ok(sample) => {
                shared.pending.fetch_sub(1, Ordering::AcqRel);
                if shared.abandon.load(Ordering::Acquire) {
                    shared.discarded.fetch_add(1, Ordering::AcqRel);
                    continue;
                }
                match commit(&db, &sample) {
                    Ok(Commit::Inserted) => {
                        shared.written.fetch_add(1, Ordering::Relaxed);
                        trace!(device = %sample.device_id, value = sample.value, "sample written");
                    }
                    Ok(Commit::Duplicate) => {
                        shared.rejected.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            device = %sample.device_id,
                            timestamp = %sample.timestamp_key(),
                            "duplicate sample timestamp, keeping the first"
                        );
                    }
                    Err(e) => {
                        shared.failed.fetch_add(1, Ordering::Relaxed);
                        error!(device = %sample.device_id, error = %e, "failed to persist sample, dropped");
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if shared.stop.load(Ordering::Acquire) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let discarded = shared.discarded.load(Ordering::Acquire);
    if discarded > 0 {
        warn!(discarded, "telemetry writer discarded queued samples after shutdown timeout");
    }
    info!(
        written = shared.written.load(Ordering::Relaxed),
        rejected = shared.rejected.load(Ordering::Relaxed),
        failed = shared.failed.load(Ordering::Relaxed),
        "telemetry writer stopped"
    );
    let _ = done.send(());
}

/// One write transaction per sample. A colliding key is left untouched.
fn commit(db: &Database, sample: &TelemetrySample) -> Result<Commit, StoreError> {
    if !sample.value.is_finite() {
        return Err(StoreError::NonFinite(sample.value));
    }

    let key = sample.timestamp_key();
    let txn = db.begin_write()?;
    let outcome = {
        let mut table = txn.open_table(CURRENT_HISTORY)?;
        let exists = table.get((sample.device_id.as_str(), key.as_str()))?.is_some();
        if exists {
            Commit::Duplicate
        } else {
            table.insert((sample.device_id.as_str(), key.as_str()), sample.value)?;
            Commit::Inserted
        }
    };

    match outcome {
        Commit::Inserted => txn.commit()?,
        Commit::Duplicate => txn.abort()?,
    }
    Ok(outcome)
}
