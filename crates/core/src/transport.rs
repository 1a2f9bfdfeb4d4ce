//! The contract between the session and the socket that carries it.

use crate::error::TransportError;

/// Owns at most one live socket at a time.
///
/// `open` must close any previous socket before creating the new one, and
/// events from a socket that is no longer current must never be delivered to
/// the session. `close` is idempotent.
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Starts connecting to `endpoint`. Completion is reported as [`TransportEvent::Opened`].
    fn open(&mut self, endpoint: &str) -> Result<(), TransportError>;
    /// Queues one text frame; fails unless the current socket is open.
    fn send(&mut self, frame: &str) -> Result<(), TransportError>;
    fn close(&mut self);
}

/// Lifecycle events a transport reports for its current socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    MessageReceived(String),
    Closed { code: u16, was_clean: bool },
    Errored(String),
}

/// Close code reported when a connection drops without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported when a close frame carries no status.
pub const NO_STATUS_RECEIVED: u16 = 1005;
