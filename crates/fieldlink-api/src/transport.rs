//! Device sessions over WebSocket.
//!
//! [`Connector`] opens a [`Session`] to one device URL. The production
//! implementation is [`WsConnector`], which wraps `tokio-tungstenite` with
//! an open timeout and a client-side keepalive. Connection managers in
//! `fieldlink-core` are generic over the connector so tests can script
//! failures and frames without a network.
//!
//! Sessions never reconnect by themselves; reconnect policy belongs to the
//! caller.

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;

// ── Seams ────────────────────────────────────────────────────────────

/// Opens sessions to devices.
pub trait Connector: Send + Sync + 'static {
    type Session: Session;

    /// Open one session. Must resolve within a bounded time.
    fn open(&self, url: &Url) -> impl Future<Output = Result<Self::Session, Error>> + Send;
}

/// One established, bidirectional device session.
pub trait Session: Send + 'static {
    /// Wait for the next inbound text frame.
    ///
    /// Must be cancel-safe: the caller polls it inside `select!` next to
    /// its command queue and drops the future when another branch wins.
    /// A clean close is reported as [`Error::Closed`].
    fn next_frame(&mut self) -> impl Future<Output = Result<String, Error>> + Send;

    /// Write one text frame.
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), Error>> + Send;

    /// Close the session, ignoring errors.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

// ── KeepaliveConfig ──────────────────────────────────────────────────

/// Open timeout and keepalive tuning for [`WsConnector`].
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// Upper bound on TCP connect + HTTP upgrade. Default: 5s.
    pub open_timeout: Duration,

    /// Idle time before a ping is sent. Default: 20s.
    pub ping_interval: Duration,

    /// How long to wait for any traffic after a ping. Default: 20s.
    pub ping_timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(20),
        }
    }
}

// ── WsConnector ──────────────────────────────────────────────────────

/// Plain `ws://` connector used against real devices.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    keepalive: KeepaliveConfig,
}

impl WsConnector {
    pub fn new(keepalive: KeepaliveConfig) -> Self {
        Self { keepalive }
    }
}

impl Connector for WsConnector {
    type Session = WsSession;

    async fn open(&self, url: &Url) -> Result<WsSession, Error> {
        tracing::debug!(url = %url, "opening device session");

        let uri: tungstenite::http::Uri = url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::InvalidUrl(e.to_string()))?;

        let (stream, _response) =
            tokio::time::timeout(self.keepalive.open_timeout, tokio_tungstenite::connect_async(uri))
                .await
                .map_err(|_| Error::OpenTimeout)?
                .map_err(|e| Error::Connect(e.to_string()))?;

        Ok(WsSession {
            stream,
            keepalive: Keepalive::new(self.keepalive.ping_interval, self.keepalive.ping_timeout),
        })
    }
}

// ── WsSession ────────────────────────────────────────────────────────

/// A live WebSocket session with client-side keepalive.
pub struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    keepalive: Keepalive,
}

impl Session for WsSession {
    async fn next_frame(&mut self) -> Result<String, Error> {
        loop {
            let deadline = self.keepalive.deadline();

            tokio::select! {
                biased;
                frame = self.stream.next() => {
                    self.keepalive.saw_traffic();
                    match frame {
                        Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => return Ok(text),
                            Err(_) => tracing::debug!(len = bytes.len(), "ignoring non-UTF-8 binary frame"),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|cf| (u16::from(cf.code), cf.reason.to_string()))
                                .unwrap_or((1005, String::new()));
                            return Err(Error::Closed { code, reason });
                        }
                        Some(Ok(_)) => {
                            // Ping / Pong / raw frames. tungstenite answers pings itself.
                            tracing::trace!("control frame");
                        }
                        Some(Err(e)) => return Err(Error::Dropped(e.to_string())),
                        None => return Err(Error::Dropped("stream ended".into())),
                    }
                }
                () = tokio::time::sleep_until(deadline) => {
                    if self.keepalive.awaiting_pong() {
                        return Err(Error::PingTimeout);
                    }
                    self.stream
                        .send(Message::Ping(Vec::<u8>::new().into()))
                        .await
                        .map_err(|e| Error::Dropped(e.to_string()))?;
                    self.keepalive.pinged();
                    tracing::trace!("keepalive ping sent");
                }
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), Error> {
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| Error::Send(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::trace!(error = %e, "close handshake failed");
        }
    }
}

// ── Keepalive bookkeeping ────────────────────────────────────────────

/// Tracks when the next ping is due and whether one is outstanding.
///
/// Any inbound frame counts as proof of life, not only pongs.
#[derive(Debug)]
struct Keepalive {
    interval: Duration,
    timeout: Duration,
    next_ping: Instant,
    ping_sent_at: Option<Instant>,
}

impl Keepalive {
    fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            next_ping: Instant::now() + interval,
            ping_sent_at: None,
        }
    }

    fn deadline(&self) -> Instant {
        match self.ping_sent_at {
            Some(sent) => sent + self.timeout,
            None => self.next_ping,
        }
    }

    fn awaiting_pong(&self) -> bool {
        self.ping_sent_at.is_some()
    }

    fn pinged(&mut self) {
        self.ping_sent_at = Some(Instant::now());
    }

    fn saw_traffic(&mut self) {
        self.ping_sent_at = None;
        self.next_ping = Instant::now() + self.interval;
    }
}

// ── Tests ────────────────────────────────────────────────────────────
