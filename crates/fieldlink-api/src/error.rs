use thiserror::Error;

/// Top-level error type for the `fieldlink-api` crate.
///
/// Covers every failure mode of a device session: opening, keepalive,
/// unexpected drops, outbound writes, and wire-format problems.
/// `fieldlink-core` maps these into domain errors and operator notices.
///
/// The `Display` strings are matched by the operator-facing translation
/// table in `fieldlink-core`, so keep their wording stable.
#[derive(Debug, Error)]
pub enum Error {
    // ── Opening ─────────────────────────────────────────────────────
    /// The device URL could not be used for a WebSocket upgrade.
    #[error("invalid device URL: {0}")]
    InvalidUrl(String),

    /// TCP connect or HTTP upgrade did not finish within the open timeout.
    #[error("timed out during opening handshake")]
    OpenTimeout,

    /// TCP connect or HTTP upgrade failed (refused, DNS, bad status, ...).
    #[error("connection failed: {0}")]
    Connect(String),

    // ── Established session ─────────────────────────────────────────
    /// No traffic arrived within the ping timeout after a keepalive ping.
    #[error("keepalive ping timeout")]
    PingTimeout,

    /// The stream ended or errored without a close handshake.
    #[error("no close frame received or sent: {0}")]
    Dropped(String),

    /// The device closed the session with a close frame.
    #[error("connection closed by device (code {code}): {reason}")]
    Closed { code: u16, reason: String },

    /// Writing an outbound frame failed.
    #[error("send failed: {0}")]
    Send(String),

    // ── Wire format ─────────────────────────────────────────────────
    /// An inbound frame was not valid JSON or not the expected shape.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// An outbound payload could not be serialized.
    #[error("could not encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if the error ends the current session.
    ///
    /// Wire-format errors leave the session open.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::MalformedFrame(_) | Self::Encode(_))
    }
}
