//! The conversation session state machine.
//!
//! A [`Session`] owns one transport, one reconnect timer and the aggregate
//! conversation state. Every input (socket lifecycle event, timer callback,
//! user action) is a short synchronous method call; effects visible to the
//! UI are queued as [`SessionEvent`]s and drained by whoever hosts the
//! session. No method returns an error to the UI: failures become system
//! transcript entries or phase changes.

use crate::answer::AnswerMode;
use crate::config::SessionConfig;
use crate::error::{ConnectionFailure, TransportError};
use crate::protocol::{self, AgentResponse, InboundMessage, OutboundMessage, UiConfig};
use crate::reconnect::{ReconnectDecision, ReconnectPolicy, ReconnectTimer};
use crate::telemetry::{Bounds, EngagementTracker};
use crate::transcript::{Role, Transcript, TranscriptEntry};
use crate::transport::{Transport, TransportEvent};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Shown when the user tries to answer after the questionnaire finished.
pub const CONVERSATION_ENDED: &str = "The conversation has ended. No further answers can be sent.";

/// Shown when the server expires the session but sends no text of its own.
pub const SESSION_EXPIRED: &str = "The session expired due to inactivity.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ConnectionPhaseChanged(ConnectionPhase),
    TranscriptAppended(TranscriptEntry),
    AnswerModeChanged(AnswerMode),
    ConversationCompleted(Option<Value>),
    UiConfigReceived(UiConfig),
    AgentTyping(bool),
}

pub struct Session<T, R> {
    endpoint: String,
    policy: ReconnectPolicy,
    choices_enabled: bool,
    phase: ConnectionPhase,
    transcript: Transcript,
    answer_mode: AnswerMode,
    reconnect_attempts: u32,
    completed: bool,
    /// Set once the server refused the session with a permanent close code or
    /// expired it. No reconnect is attempted afterwards.
    halted: bool,
    summary: Option<Value>,
    input: String,
    engagement: EngagementTracker,
    mounted: bool,
    transport: T,
    timer: R,
    events: Vec<SessionEvent>,
}

impl<T: Transport, R: ReconnectTimer> Session<T, R> {
    /// Creates a session for `endpoint`. Nothing is opened until [`Session::mount`].
    pub fn new(config: &SessionConfig, endpoint: impl Into<String>, transport: T, timer: R) -> Self {
        Self {
            endpoint: endpoint.into(),
            policy: ReconnectPolicy::new(config),
            choices_enabled: config.supports_choice_answers,
            phase: ConnectionPhase::Disconnected,
            transcript: Transcript::new(),
            answer_mode: AnswerMode::FreeText,
            reconnect_attempts: 0,
            completed: false,
            halted: false,
            summary: None,
            input: String::new(),
            engagement: EngagementTracker::default(),
            mounted: false,
            transport,
            timer,
            events: Vec::new(),
        }
    }

    // --- Accessors ---

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn answer_mode(&self) -> &AnswerMode {
        &self.answer_mode
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn summary(&self) -> Option<&Value> {
        self.summary.as_ref()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn timer(&self) -> &R {
        &self.timer
    }

    /// Takes the events queued since the last call, in the order they happened.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // --- Lifecycle ---

    pub fn mount(&mut self) {
        if self.mounted {
            return;
        }
        self.mounted = true;
        info!(endpoint = %self.endpoint, "Session mounted");
        self.open_socket();
    }

    /// Tears the session down: cancels the pending reconnect and closes the socket.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        self.timer.cancel();
        self.transport.close();
        self.set_phase(ConnectionPhase::Disconnected);
        info!(endpoint = %self.endpoint, "Session unmounted");
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        if !self.mounted {
            debug!(?event, "Ignoring transport event for unmounted session");
            return;
        }
        match event {
            TransportEvent::Opened => self.on_opened(),
            TransportEvent::MessageReceived(raw) => self.on_frame(&raw),
            TransportEvent::Closed { code, was_clean } => self.on_closed(code, was_clean),
            TransportEvent::Errored(reason) => {
                warn!(%reason, phase = ?self.phase, "Transport reported an error");
            }
        }
    }

    /// Called when the delay scheduled through the reconnect timer elapses.
    pub fn reconnect_due(&mut self) {
        if !self.mounted || self.phase != ConnectionPhase::Reconnecting {
            debug!(phase = ?self.phase, "Ignoring stale reconnect callback");
            return;
        }
        info!(attempt = self.reconnect_attempts, "Reconnecting");
        self.open_socket();
    }

    fn open_socket(&mut self) {
        self.set_phase(ConnectionPhase::Connecting);
        self.transport.close();
        if let Err(e) = self.transport.open(&self.endpoint) {
            warn!(error = %e, endpoint = %self.endpoint, "Could not create connection");
            let reason = match e {
                TransportError::Construction(reason) => reason,
                other => other.to_string(),
            };
            self.push_system(ConnectionFailure::TransportConstruction(reason).to_string());
            if self.reconnect_attempts == 0 {
                self.set_phase(ConnectionPhase::Disconnected);
            } else {
                let decision = self.policy.decide(None, self.completed, self.reconnect_attempts);
                self.apply_decision(decision);
            }
        }
    }

    fn on_opened(&mut self) {
        if self.phase != ConnectionPhase::Connecting {
            debug!(phase = ?self.phase, "Ignoring open outside of connecting phase");
            return;
        }
        self.reconnect_attempts = 0;
        self.set_phase(ConnectionPhase::Connected);
    }

    fn on_closed(&mut self, code: u16, was_clean: bool) {
        if matches!(
            self.phase,
            ConnectionPhase::Disconnected | ConnectionPhase::Failed
        ) {
            debug!(code, "Ignoring close after the session already stopped");
            return;
        }
        info!(code, was_clean, attempts = self.reconnect_attempts, "Connection closed");
        self.transport.close();
        if self.halted {
            self.timer.cancel();
            self.set_phase(ConnectionPhase::Disconnected);
            return;
        }
        let decision = self
            .policy
            .decide(Some(code), self.completed, self.reconnect_attempts);
        self.apply_decision(decision);
    }

    fn apply_decision(&mut self, decision: ReconnectDecision) {
        match decision {
            ReconnectDecision::Retry { delay, attempt } => {
                self.reconnect_attempts = attempt;
                self.set_phase(ConnectionPhase::Reconnecting);
                info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
                self.timer.schedule(delay);
            }
            ReconnectDecision::GiveUp(failure) => {
                self.timer.cancel();
                let phase = match failure {
                    ConnectionFailure::PermanentClosure(_) => {
                        self.halted = true;
                        ConnectionPhase::Disconnected
                    }
                    _ => ConnectionPhase::Failed,
                };
                warn!(%failure, "Giving up on the connection");
                self.set_phase(phase);
                self.push_system(failure.to_string());
            }
            ReconnectDecision::NoAction => {
                self.set_phase(ConnectionPhase::Disconnected);
            }
        }
    }

    // --- Inbound messages ---

    fn on_frame(&mut self, raw: &str) {
        match protocol::decode(raw) {
            Ok(message) => self.apply_message(message),
            Err(e) => warn!(error = %e, "Dropping inbound frame"),
        }
    }

    fn apply_message(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::AgentResponse(response) => self.apply_agent_response(response),
            InboundMessage::UserEcho { text, timestamp } => {
                self.push_entry(TranscriptEntry::new(Role::User, text).with_timestamp(timestamp));
            }
            InboundMessage::UiConfig(config) => {
                debug!(payload = %config.payload, "Forwarding UI configuration");
                self.events.push(SessionEvent::UiConfigReceived(config));
            }
            InboundMessage::ServerError { text, timestamp } => {
                warn!(%text, "Server reported an error");
                self.push_entry(TranscriptEntry::new(Role::System, text).with_timestamp(timestamp));
            }
            InboundMessage::SessionExpired { text, timestamp } => {
                info!("Server expired the session");
                self.halted = true;
                self.timer.cancel();
                let text = if text.trim().is_empty() {
                    SESSION_EXPIRED.to_string()
                } else {
                    text
                };
                self.push_entry(TranscriptEntry::new(Role::System, text).with_timestamp(timestamp));
            }
            InboundMessage::AgentTyping(is_typing) => {
                self.events.push(SessionEvent::AgentTyping(is_typing));
            }
        }
    }

    fn apply_agent_response(&mut self, response: AgentResponse) {
        if response.is_current_state_replay {
            debug!("Current-state replay, transcript unchanged");
        } else {
            self.push_entry(
                TranscriptEntry::new(Role::Agent, response.text)
                    .with_timestamp(response.timestamp)
                    .welcome(response.is_welcome),
            );
        }

        self.answer_mode =
            AnswerMode::from_agent(response.answer_type, &response.options, self.choices_enabled);
        self.events
            .push(SessionEvent::AnswerModeChanged(self.answer_mode.clone()));

        if response.is_complete && !self.completed {
            info!("Conversation completed");
            self.completed = true;
            self.summary = response.summary;
            self.events
                .push(SessionEvent::ConversationCompleted(self.summary.clone()));
        }
    }

    // --- User input ---

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Picks a single-choice option. Returns false if the option is not offered.
    pub fn select_option(&mut self, option: &str) -> bool {
        let changed = self.answer_mode.select(option);
        if changed {
            self.events
                .push(SessionEvent::AnswerModeChanged(self.answer_mode.clone()));
        }
        changed
    }

    /// Toggles a multiple-choice option, including the comment sentinel.
    pub fn toggle_choice(&mut self, option: &str) -> bool {
        let changed = self.answer_mode.toggle(option);
        if changed {
            self.events
                .push(SessionEvent::AnswerModeChanged(self.answer_mode.clone()));
        }
        changed
    }

    pub fn set_comment(&mut self, text: &str) -> bool {
        self.answer_mode.set_comment(text)
    }

    pub fn set_widget_bounds(&mut self, bounds: Bounds) {
        self.engagement.set_bounds(bounds);
    }

    pub fn pointer_moved(&mut self, x: f64, y: f64) {
        self.engagement.pointer_moved(x, y);
    }

    pub fn visibility_changed(&mut self, visible: bool) {
        self.engagement.visibility_changed(visible);
    }

    /// Submits the answer for the active mode.
    ///
    /// The input buffer is cleared on every call, including rejected ones.
    pub fn submit_answer(&mut self) {
        if self.completed {
            self.push_system(CONVERSATION_ENDED.to_string());
            self.input.clear();
            return;
        }

        let Some(content) = self.answer_mode.compose(&self.input) else {
            debug!(mode = ?self.answer_mode, "Nothing to submit");
            self.input.clear();
            return;
        };

        self.push_entry(TranscriptEntry::new(Role::User, content.clone()));
        self.deliver(content);

        if self.answer_mode.is_choice() {
            self.answer_mode = AnswerMode::FreeText;
            self.events
                .push(SessionEvent::AnswerModeChanged(AnswerMode::FreeText));
        }
        self.input.clear();
    }

    fn deliver(&mut self, content: String) {
        match self.phase {
            ConnectionPhase::Connected => {
                let message = OutboundMessage {
                    content,
                    metrics: self.engagement.snapshot(),
                };
                let payload = match protocol::encode(&message) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "Could not encode answer");
                        return;
                    }
                };
                match self.transport.send(&payload) {
                    Ok(()) => debug!(bytes = payload.len(), "Answer sent"),
                    Err(e) => {
                        warn!(error = %e, "Send failed, entering reconnect path");
                        self.push_system(ConnectionFailure::NotConnected.to_string());
                        self.transport.close();
                        self.retry_without_close_event();
                    }
                }
            }
            ConnectionPhase::Disconnected if self.mounted && !self.halted => {
                self.push_system(ConnectionFailure::NotConnected.to_string());
                self.retry_without_close_event();
            }
            phase => {
                debug!(?phase, "Answer not sent, no open connection");
                self.push_system(ConnectionFailure::NotConnected.to_string());
            }
        }
    }

    fn retry_without_close_event(&mut self) {
        let decision = self
            .policy
            .decide(None, self.completed, self.reconnect_attempts);
        self.apply_decision(decision);
    }

    // --- Helpers ---

    fn set_phase(&mut self, phase: ConnectionPhase) {
        if self.phase == phase {
            return;
        }
        debug!(from = ?self.phase, to = ?phase, "Phase transition");
        self.phase = phase;
        self.events.push(SessionEvent::ConnectionPhaseChanged(phase));
    }

    fn push_system(&mut self, text: String) {
        self.push_entry(TranscriptEntry::new(Role::System, text));
    }

    fn push_entry(&mut self, entry: TranscriptEntry) {
        let entry = self.transcript.push(entry).clone();
        self.events.push(SessionEvent::TranscriptAppended(entry));
    }
}
