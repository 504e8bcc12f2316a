use serde::Serialize;

/// Payload the status page sends on every heartbeat tick.
pub const HEARTBEAT_PAYLOAD: &str = "heartbeat";
/// Payload the status page sends when the user navigates away.
pub const CLOSE_PAYLOAD: &str = "close";

/// The two messages a viewer channel understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerSignal {
    Heartbeat,
    Close,
}

impl ViewerSignal {
    /// Classifies a text frame by exact match. Anything else yields `None`.
    pub fn parse(payload: &str) -> Option<Self> {
        match payload {
            HEARTBEAT_PAYLOAD => Some(ViewerSignal::Heartbeat),
            CLOSE_PAYLOAD => Some(ViewerSignal::Close),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewerSignal::Heartbeat => HEARTBEAT_PAYLOAD,
            ViewerSignal::Close => CLOSE_PAYLOAD,
        }
    }
}

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    /// A viewer announced it was leaving.
    ExplicitClose,
    /// The last viewer's connection dropped.
    LastViewerDisconnected,
    /// The last viewer stopped sending heartbeats and was evicted.
    LastViewerTimedOut,
    /// Stopped from outside, e.g. Ctrl-C.
    Interrupted,
}

impl ShutdownReason {
    pub fn metric_label(&self) -> &'static str {
        match self {
            ShutdownReason::ExplicitClose => "explicit_close",
            ShutdownReason::LastViewerDisconnected => "last_viewer_disconnected",
            ShutdownReason::LastViewerTimedOut => "last_viewer_timed_out",
            ShutdownReason::Interrupted => "interrupted",
        }
    }
}

/// Observable phase of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "reason", rename_all = "snake_case")]
pub enum SessionPhase {
    /// Nobody has connected yet.
    Idle,
    /// At least one viewer is registered.
    Active,
    /// Shutdown was triggered; absorbing.
    Terminal(ShutdownReason),
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Terminal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn parses_the_two_known_payloads() {
        assert_eq!(ViewerSignal::parse("heartbeat"), Some(ViewerSignal::Heartbeat));
        assert_eq!(ViewerSignal::parse("close"), Some(ViewerSignal::Close));
    }

    #[test_timeout::timeout]
    fn padded_payloads_are_not_signals() {
        for payload in [" close\n", "close ", "\theartbeat", "heartbeat\r\n"] {
            assert_eq!(ViewerSignal::parse(payload), None, "payload {payload:?}");
        }
    }

    #[test_timeout::timeout]
    fn ignores_everything_else() {
        for payload in ["", "HEARTBEAT", "ping", "{\"type\":\"close\"}", "closed"] {
            assert_eq!(ViewerSignal::parse(payload), None, "payload {payload:?}");
        }
    }

    #[test_timeout::timeout]
    fn as_str_matches_wire_payload() {
        for signal in [ViewerSignal::Heartbeat, ViewerSignal::Close] {
            assert_eq!(ViewerSignal::parse(signal.as_str()), Some(signal));
        }
    }
}
