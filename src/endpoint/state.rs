//! Endpoint lifecycle states.

/// Connection state of an endpoint.
///
/// ```text
/// Connecting ──accept──▶ Connected ◀──traffic── Lost
///      │                     └──silence──▶ Lost │
///      └──timeout──▶ Disconnected ◀──too long───┘
/// ```
///
/// Explicit disconnect reaches `Disconnected` from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointState {
    /// Handshake sent, waiting for the peer's accept.
    Connecting,
    /// Handshake complete and the peer is responsive.
    Connected,
    /// The peer went silent for longer than the liveness window.
    Lost,
    /// Terminal state.
    Disconnected,
}

impl EndpointState {
    /// Whether the connection is currently usable for both message kinds.
    pub fn is_connected(self) -> bool {
        self == EndpointState::Connected
    }

    /// Whether reliable traffic and liveness probes run in this state.
    pub fn is_established(self) -> bool {
        matches!(self, EndpointState::Connected | EndpointState::Lost)
    }

    /// Whether the endpoint has reached its terminal state.
    pub fn is_terminal(self) -> bool {
        self == EndpointState::Disconnected
    }
}

impl std::fmt::Display for EndpointState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EndpointState::Connecting => "connecting",
            EndpointState::Connected => "connected",
            EndpointState::Lost => "lost",
            EndpointState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}
