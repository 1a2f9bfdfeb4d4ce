//! Error taxonomy shared by the core components.
//!
//! None of these cross the boundary into the UI layer as errors. The session
//! converts them into system transcript entries or terminal phase changes.

/// Failures reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// A send was attempted without an open, handshake-complete socket.
    #[error("no open connection")]
    NotConnected,
    /// The socket could not be created at all.
    #[error("could not create connection: {0}")]
    Construction(String),
}

/// Reasons an inbound frame never reaches the state machine.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("frame has no `type` discriminator")]
    MissingType,
    #[error("unrecognized frame type `{0}`")]
    UnknownType(String),
    #[error("invalid `{kind}` frame: {source}")]
    InvalidFrame {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures deriving the websocket endpoint before any connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("no session identifier found in the page address")]
    MissingSessionIdentifier,
    #[error("invalid page address: {0}")]
    InvalidPageUrl(String),
    #[error("invalid session identifier `{0}`")]
    InvalidSessionIdentifier(String),
    #[error("endpoint template has no {{session_id}} placeholder")]
    TemplateMissingSessionId,
}

/// Connection failures surfaced to the user as system transcript entries.
///
/// The `Display` text is exactly what the transcript shows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionFailure {
    #[error("The server rejected the connection (code {0}). The conversation cannot continue.")]
    PermanentClosure(u16),
    #[error("Could not restore the connection after {0} attempts.")]
    ReconnectExhausted(u32),
    #[error("Could not open a connection: {0}")]
    TransportConstruction(String),
    #[error("No connection. Your answer could not be delivered.")]
    NotConnected,
}
