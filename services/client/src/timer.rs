//! Tokio implementation of the reconnect timer.

use questionnaire_core::ReconnectTimer;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Posts a token on `due` when the scheduled delay elapses.
///
/// Only the token of the most recent `schedule` call is current; a token that
/// was already in flight when the timer was cancelled or rescheduled is stale.
pub struct TokioReconnectTimer {
    due: mpsc::UnboundedSender<u64>,
    token: u64,
    pending: Option<JoinHandle<()>>,
}

impl TokioReconnectTimer {
    pub fn new(due: mpsc::UnboundedSender<u64>) -> Self {
        Self {
            due,
            token: 0,
            pending: None,
        }
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.pending.is_some() && token == self.token
    }
}

impl ReconnectTimer for TokioReconnectTimer {
    fn schedule(&mut self, delay: Duration) {
        self.cancel();
        self.token += 1;
        let token = self.token;
        let due = self.due.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = due.send(token);
        }));
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for TokioReconnectTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
