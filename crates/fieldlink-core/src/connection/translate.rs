//! Operator-facing wording for transport failures.
//!
//! The table is ordered; the first case-insensitive substring match
//! wins. Anything unmatched is reported verbatim behind a generic
//! prefix.

const DROPPED: &str =
    "The connection dropped unexpectedly. The device may have rebooted or lost power.";
const UNRESPONSIVE: &str = "The device is not answering keepalive pings. It may have hung, \
                            or the network is degraded.";
const UNREACHABLE: &str = "Could not connect to the device. Check its IP address and that it \
                           is powered and on the network.";
const UNRESOLVED: &str =
    "Could not resolve the device address. Check the address in the configuration.";

pub const TRANSPORT_ERROR_TABLE: &[(&str, &str)] = &[
    ("no close frame", DROPPED),
    ("without closing handshake", DROPPED),
    ("keepalive ping timeout", UNRESPONSIVE),
    ("timed out during opening handshake", UNREACHABLE),
    ("getaddrinfo failed", UNRESOLVED),
    ("failed to lookup address", UNRESOLVED),
];

/// Translate a raw transport error message for the operator.
pub fn translate_transport_error(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    TRANSPORT_ERROR_TABLE
        .iter()
        .find(|(pattern, _)| lowered.contains(pattern))
        .map_or_else(
            || format!("Unknown network error: {raw}"),
            |(_, message)| (*message).to_owned(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_failures_are_translated() {
        assert_eq!(
            translate_transport_error("timed out during opening handshake"),
            UNREACHABLE
        );
        assert_eq!(translate_transport_error("keepalive ping timeout"), UNRESPONSIVE);
        assert_eq!(
            translate_transport_error("no close frame received or sent: reset"),
            DROPPED
        );
        assert_eq!(
            translate_transport_error(
                "connection failed: IO error: failed to lookup address information"
            ),
            UNRESOLVED
        );
    }

    #[test]
    fn matching_ignores_case() {
        assert_eq!(
            translate_transport_error("Connection reset WITHOUT CLOSING HANDSHAKE"),
            DROPPED
        );
    }

    #[test]
    fn first_match_wins() {
        // Both "no close frame" and "keepalive ping timeout" appear.
        assert_eq!(
            translate_transport_error("no close frame after keepalive ping timeout"),
            DROPPED
        );
    }

    #[test]
    fn unknown_failures_keep_raw_text() {
        assert_eq!(
            translate_transport_error("connection failed: refused"),
            "Unknown network error: connection failed: refused"
        );
    }
}
