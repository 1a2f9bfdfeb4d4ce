//! Questionnaire Chat Client Library Crate
//!
//! This library hosts a conversation session from `questionnaire-core` on a
//! tokio runtime: the websocket transport, the reconnect timer, the driver
//! task that multiplexes socket, timer, UI and document inputs, and the
//! environment configuration. The `chat` binary is a thin terminal front end
//! around it.

pub mod config;
pub mod driver;
pub mod timer;
pub mod transport;

pub use driver::{DocumentListener, DocumentSignal, SessionHandle, UiCommand, spawn_session};
