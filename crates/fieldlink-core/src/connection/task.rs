// ── Connection task ──
//
// The single execution context that owns a device's session, state and
// link bookkeeping. Everything that mutates them happens here.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fieldlink_api::{Connector, DeviceCommand, Session};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::translate::translate_transport_error;
use super::{Desired, ManagerInner, Request};
use crate::decode;
use crate::error::CoreError;
use crate::model::{ConnectionState, LinkStatus, Notice, NoticeKind};

/// Upper bound on a polite close before the socket is simply dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

const RESTORED_TEXT: &str = "Connection restored.";

// ── Episode bookkeeping ──────────────────────────────────────────────

/// One stretch of unreachability, from the first failure to the next
/// successful connection.
#[derive(Debug, Default)]
struct Episode {
    first_failure: Option<Instant>,
    notified: bool,
}

impl Episode {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

enum Attempt {
    /// Open failed or the session was lost; wait and retry.
    Failed,
    /// The operator asked for a disconnect.
    DesiredOff,
    Cancelled,
}

enum SessionEnd {
    Lost(fieldlink_api::Error),
    DesiredOff,
    Cancelled,
}

// ── Supervisor loop ──────────────────────────────────────────────────

pub(super) async fn run<C: Connector>(
    inner: Arc<ManagerInner>,
    connector: Arc<C>,
    mut requests: mpsc::Receiver<Request>,
) {
    let mut desired = inner.desired.subscribe();
    let mut episode = Episode::default();
    let cancel = inner.cancel.clone();

    if inner.endpoint.device_type().records_history() {
        inner.hydrate_history().await;
    }

    'supervise: loop {
        if *desired.borrow_and_update() == Desired::Disconnected {
            settle_disconnected(&inner, &mut episode);
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                changed = desired.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(request) = requests.recv() => handle_offline(&inner, request).await,
            }
            continue;
        }

        match attempt(&inner, &*connector, &mut episode, &mut requests, &mut desired).await {
            Attempt::Cancelled => break,
            Attempt::DesiredOff => continue,
            Attempt::Failed => {}
        }

        // Fixed delay before the next attempt. A disconnect request cuts
        // it short; commands arriving meanwhile are refused.
        let delay = tokio::time::sleep(inner.config.reconnect_delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break 'supervise,
                () = &mut delay => break,
                changed = desired.changed() => {
                    if changed.is_err() {
                        break 'supervise;
                    }
                    if *desired.borrow() == Desired::Disconnected {
                        break;
                    }
                }
                Some(request) = requests.recv() => handle_offline(&inner, request).await,
            }
        }
    }

    settle_disconnected(&inner, &mut episode);
    debug!(device = %inner.endpoint.id(), "connection task stopped");
}

/// One connection attempt, and the session it opens if it succeeds.
async fn attempt<C: Connector>(
    inner: &ManagerInner,
    connector: &C,
    episode: &mut Episode,
    requests: &mut mpsc::Receiver<Request>,
    desired: &mut watch::Receiver<Desired>,
) -> Attempt {
    let id = inner.endpoint.id();
    inner.set_connection_state(ConnectionState::Connecting);
    inner.emit(LinkStatus::Connecting, None);
    debug!(device = %id, url = %inner.endpoint.url(), "connecting");

    let opened = tokio::select! {
        biased;
        () = inner.cancel.cancelled() => return Attempt::Cancelled,
        opened = connector.open(inner.endpoint.url()) => opened,
    };
    let mut session = match opened {
        Ok(session) => session,
        Err(e) => {
            record_failure(inner, episode, &e);
            return Attempt::Failed;
        }
    };

    if *desired.borrow() == Desired::Disconnected {
        close(&mut session).await;
        return Attempt::DesiredOff;
    }

    let restored = episode.notified;
    episode.reset();
    inner.set_connection_state(ConnectionState::Connected);
    if restored {
        info!(device = %id, "connection restored");
        inner.emit(
            LinkStatus::Reconnected,
            Some(Notice::new(NoticeKind::LinkRestored, RESTORED_TEXT)),
        );
    } else {
        info!(device = %id, "connected");
        inner.emit(LinkStatus::Connected, None);
    }

    let end = listen(inner, &mut session, requests, desired).await;
    close(&mut session).await;

    match end {
        SessionEnd::Cancelled => Attempt::Cancelled,
        SessionEnd::DesiredOff => Attempt::DesiredOff,
        SessionEnd::Lost(e) => {
            record_failure(inner, episode, &e);
            Attempt::Failed
        }
    }
}

/// Read frames and serve requests until the session ends.
async fn listen<S: Session>(
    inner: &ManagerInner,
    session: &mut S,
    requests: &mut mpsc::Receiver<Request>,
    desired: &mut watch::Receiver<Desired>,
) -> SessionEnd {
    loop {
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => return SessionEnd::Cancelled,
            changed = desired.changed() => {
                if changed.is_err() || *desired.borrow() == Desired::Disconnected {
                    return SessionEnd::DesiredOff;
                }
            }
            Some(request) = requests.recv() => handle_online(inner, session, request).await,
            frame = session.next_frame() => match frame {
                Ok(text) => apply_frame(inner, &text),
                Err(e) if !e.is_transport() => report_protocol_error(inner, &e),
                Err(e) => return SessionEnd::Lost(e),
            },
        }
    }
}

async fn close<S: Session>(session: &mut S) {
    if tokio::time::timeout(CLOSE_TIMEOUT, session.close()).await.is_err() {
        trace!("session close timed out");
    }
}

// ── Link bookkeeping ─────────────────────────────────────────────────

/// Count a failed open or a lost session against the current episode.
///
/// The first failure starts the grace timer. The first failure that
/// lands once the grace period has elapsed notifies the operator, with
/// that failure's cause; later ones stay quiet until a reconnect.
fn record_failure(inner: &ManagerInner, episode: &mut Episode, err: &fieldlink_api::Error) {
    let id = inner.endpoint.id();
    let raw = err.to_string();
    let now = Instant::now();

    let started = match episode.first_failure {
        Some(started) => {
            debug!(device = %id, error = %raw, "reconnect attempt failed");
            started
        }
        None => {
            warn!(device = %id, error = %raw, "device link lost");
            *episode.first_failure.insert(now)
        }
    };

    if !episode.notified && now.duration_since(started) >= inner.config.grace_period {
        episode.notified = true;
        let text = translate_transport_error(&raw);
        error!(
            device = %id,
            error = %raw,
            grace = ?inner.config.grace_period,
            "device unreachable beyond grace period"
        );
        inner.set_connection_state(ConnectionState::Failed);
        inner.emit(LinkStatus::Error, Some(Notice::new(NoticeKind::LinkLost, text)));
        return;
    }

    inner.set_connection_state(if episode.notified {
        ConnectionState::Failed
    } else {
        ConnectionState::GracePeriod
    });
    inner.emit(LinkStatus::Error, None);
}

/// Enter `Disconnected` (once) and forget the current episode.
fn settle_disconnected(inner: &ManagerInner, episode: &mut Episode) {
    episode.reset();
    if inner.connection_state() != ConnectionState::Disconnected {
        inner.set_connection_state(ConnectionState::Disconnected);
        info!(device = %inner.endpoint.id(), "disconnected");
        inner.emit(LinkStatus::Disconnected, None);
    }
}

// ── Frames ───────────────────────────────────────────────────────────

fn apply_frame(inner: &ManagerInner, frame: &str) {
    let id = inner.endpoint.id();
    trace!(device = %id, frame, "frame received");

    let previous = inner.state.load_full();
    let decoded = match decode::decode(inner.endpoint.device_type(), id, &previous, frame, Utc::now()) {
        Ok(decoded) => decoded,
        Err(e) => {
            report_protocol_error(inner, &e);
            return;
        }
    };

    if let Some(sample) = decoded.sample {
        if let Err(e) = inner.store.submit(sample) {
            trace!(device = %id, error = %e, "sample not persisted");
        }
    }

    inner.state.store(Arc::new(decoded.state));
    inner.emit(LinkStatus::Connected, None);

    for fault in decoded.faults {
        warn!(device = %id, fault = %fault, "equipment fault");
        inner.emit(LinkStatus::Connected, Some(Notice::new(NoticeKind::Fault, fault)));
    }
}

fn report_protocol_error(inner: &ManagerInner, err: &dyn std::fmt::Display) {
    let text = err.to_string();
    warn!(device = %inner.endpoint.id(), error = %text, "undecodable frame, state kept");
    inner.emit(LinkStatus::Connected, Some(Notice::new(NoticeKind::Protocol, text)));
}

// ── Requests ─────────────────────────────────────────────────────────

async fn handle_online<S: Session>(inner: &ManagerInner, session: &mut S, request: Request) {
    match request {
        Request::Send { command, reply } => {
            let result = write_command(inner, session, &command).await;
            let _ = reply.send(result);
        }
        Request::SetHistoryPeriod { hours, reply } => {
            let _ = reply.send(inner.reload_history(hours).await);
        }
    }
}

async fn handle_offline(inner: &ManagerInner, request: Request) {
    match request {
        Request::Send { reply, .. } => {
            let _ = reply.send(Err(inner.reject_command()));
        }
        Request::SetHistoryPeriod { hours, reply } => {
            let _ = reply.send(inner.reload_history(hours).await);
        }
    }
}

async fn write_command<S: Session>(
    inner: &ManagerInner,
    session: &mut S,
    command: &DeviceCommand,
) -> Result<(), CoreError> {
    let id = inner.endpoint.id();
    let text = command.to_wire()?;

    match session.send_text(text).await {
        Ok(()) => {
            debug!(device = %id, command = ?command, "command sent");
            Ok(())
        }
        Err(e) => {
            warn!(device = %id, error = %e, "command write failed");
            inner.emit(
                LinkStatus::Error,
                Some(Notice::new(
                    NoticeKind::CommandFailed,
                    format!("failed to send command: {e}"),
                )),
            );
            Err(CoreError::CommandFailed {
                device: id.to_string(),
                reason: e.to_string(),
            })
        }
    }
}
