#![allow(dead_code, clippy::unwrap_used)]
// Scripted transport for driving ConnectionManager without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fieldlink_api::{Connector, Error, Session};
use fieldlink_core::{DeviceEvent, Notice, NoticeKind};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use url::Url;

// ── Connector ───────────────────────────────────────────────────────

pub enum Step {
    Refuse,
    Accept(MockSession),
}

/// Plays back a list of open outcomes, then refuses forever.
pub struct ScriptedConnector {
    steps: Mutex<VecDeque<Step>>,
    attempts: Mutex<Vec<Instant>>,
}

impl ScriptedConnector {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn refusing() -> Self {
        Self::new([])
    }

    pub fn accepting(session: MockSession) -> Self {
        Self::new([Step::Accept(session)])
    }

    /// When each open was attempted.
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Connector for ScriptedConnector {
    type Session = MockSession;

    async fn open(&self, _url: &Url) -> Result<MockSession, Error> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(Instant::now());
            attempts.len()
        };
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Accept(session)) => Ok(session),
            Some(Step::Refuse) | None => Err(Error::Connect(format!("refused on attempt {attempt}"))),
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────

pub struct MockSession {
    frames: mpsc::UnboundedReceiver<Result<String, Error>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    fail_sends: bool,
}

/// Test-side controls for one [`MockSession`].
pub struct SessionHandle {
    frames: mpsc::UnboundedSender<Result<String, Error>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn push(&self, frame: &str) {
        self.frames.send(Ok(frame.to_owned())).unwrap();
    }

    pub fn fail(&self, error: Error) {
        self.frames.send(Err(error)).unwrap();
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub fn session() -> (MockSession, SessionHandle) {
    build_session(false)
}

/// A session whose writes always fail.
pub fn broken_session() -> (MockSession, SessionHandle) {
    build_session(true)
}

fn build_session(fail_sends: bool) -> (MockSession, SessionHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    (
        MockSession {
            frames: rx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
            fail_sends,
        },
        SessionHandle {
            frames: tx,
            sent,
            closed,
        },
    )
}

impl Session for MockSession {
    async fn next_frame(&mut self) -> Result<String, Error> {
        match self.frames.recv().await {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), Error> {
        if self.fail_sends {
            return Err(Error::Send("broken pipe".into()));
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ── Event helpers ───────────────────────────────────────────────────

/// Everything currently buffered on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<DeviceEvent>) -> Vec<DeviceEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn notices(events: &[DeviceEvent], kind: NoticeKind) -> Vec<Notice> {
    events
        .iter()
        .filter_map(|e| e.notice.clone())
        .filter(|n| n.kind == kind)
        .collect()
}

/// Wait (bounded) for the next event matching `pred`.
pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<DeviceEvent>,
    pred: impl Fn(&DeviceEvent) -> bool,
) -> DeviceEvent {
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let event = rx.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap()
}
