//! Hosts one conversation session on a single tokio task.
//!
//! The driver owns the [`Session`] and multiplexes its four input sources:
//! socket events, reconnect timer callbacks, UI commands and document-level
//! engagement signals. All of them are applied one at a time, in arrival
//! order, and the session's UI events are forwarded after each step.

use crate::timer::TokioReconnectTimer;
use crate::transport::{TaggedEvent, WsTransport};
use questionnaire_core::{Bounds, Session, SessionConfig, SessionEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info};

type DrivenSession = Session<WsTransport, TokioReconnectTimer>;

/// Actions the presentation layer can request.
#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    SetInput(String),
    SelectOption(String),
    ToggleChoice(String),
    SetComment(String),
    SetWidgetBounds(Bounds),
    Submit,
    Unmount,
}

/// Document-wide signals sampled for engagement metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DocumentSignal {
    PointerMoved { x: f64, y: f64 },
    VisibilityChanged { visible: bool },
}

/// Cloneable handle the UI uses to drive a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<UiCommand>,
    document: mpsc::UnboundedSender<DocumentSignal>,
}

impl SessionHandle {
    /// Queues a command. Returns false once the session has shut down.
    pub fn send(&self, command: UiCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn set_input(&self, text: impl Into<String>) -> bool {
        self.send(UiCommand::SetInput(text.into()))
    }

    pub fn select_option(&self, option: impl Into<String>) -> bool {
        self.send(UiCommand::SelectOption(option.into()))
    }

    pub fn toggle_choice(&self, option: impl Into<String>) -> bool {
        self.send(UiCommand::ToggleChoice(option.into()))
    }

    pub fn set_comment(&self, text: impl Into<String>) -> bool {
        self.send(UiCommand::SetComment(text.into()))
    }

    pub fn submit(&self) -> bool {
        self.send(UiCommand::Submit)
    }

    pub fn unmount(&self) -> bool {
        self.send(UiCommand::Unmount)
    }

    /// Attaches a document listener whose lifetime ends with the session.
    pub fn listen_document(&self) -> DocumentListener {
        DocumentListener {
            signals: self.document.clone(),
        }
    }
}

/// Forwards document-wide pointer and visibility signals to the session.
///
/// Signals stop being accepted when the session is torn down.
pub struct DocumentListener {
    signals: mpsc::UnboundedSender<DocumentSignal>,
}

impl DocumentListener {
    pub fn pointer_moved(&self, x: f64, y: f64) -> bool {
        self.signals
            .send(DocumentSignal::PointerMoved { x, y })
            .is_ok()
    }

    pub fn visibility_changed(&self, visible: bool) -> bool {
        self.signals
            .send(DocumentSignal::VisibilityChanged { visible })
            .is_ok()
    }

    pub fn is_attached(&self) -> bool {
        !self.signals.is_closed()
    }
}

struct Inputs {
    transport: mpsc::UnboundedReceiver<TaggedEvent>,
    reconnect_due: mpsc::UnboundedReceiver<u64>,
    commands: mpsc::UnboundedReceiver<UiCommand>,
    document: mpsc::UnboundedReceiver<DocumentSignal>,
}

/// Starts a session for `endpoint` on a new task and mounts it.
///
/// # Returns
/// A tuple containing:
/// 1. A [`SessionHandle`] for UI commands.
/// 2. The receiver of [`SessionEvent`]s for rendering.
/// 3. The `JoinHandle` of the driver task, which ends after unmount.
pub fn spawn_session(
    config: &SessionConfig,
    endpoint: String,
) -> (
    SessionHandle,
    mpsc::UnboundedReceiver<SessionEvent>,
    JoinHandle<()>,
) {
    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    let (due_tx, due_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (document_tx, document_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let span = tracing::info_span!("chat_session", endpoint = %endpoint);
    let session = Session::new(
        config,
        endpoint,
        WsTransport::new(transport_tx),
        TokioReconnectTimer::new(due_tx),
    );
    let inputs = Inputs {
        transport: transport_rx,
        reconnect_due: due_rx,
        commands: command_rx,
        document: document_rx,
    };
    let task = tokio::spawn(run(session, inputs, events_tx).instrument(span));

    let handle = SessionHandle {
        commands: command_tx,
        document: document_tx,
    };
    (handle, events_rx, task)
}

async fn run(
    mut session: DrivenSession,
    mut inputs: Inputs,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    session.mount();
    forward_events(&mut session, &events);

    loop {
        tokio::select! {
            Some(tagged) = inputs.transport.recv() => {
                if let Some(event) = session.transport().accept(tagged) {
                    session.handle_transport_event(event);
                }
            }
            Some(token) = inputs.reconnect_due.recv() => {
                if session.timer().is_current(token) {
                    session.reconnect_due();
                } else {
                    debug!(token, "Ignoring stale reconnect token");
                }
            }
            command = inputs.commands.recv() => match command {
                Some(command) => apply_command(&mut session, command),
                None => break,
            },
            Some(signal) = inputs.document.recv() => match signal {
                DocumentSignal::PointerMoved { x, y } => session.pointer_moved(x, y),
                DocumentSignal::VisibilityChanged { visible } => session.visibility_changed(visible),
            },
        }
        forward_events(&mut session, &events);
        if !session.is_mounted() {
            break;
        }
    }

    session.unmount();
    inputs.document.close();
    forward_events(&mut session, &events);
    info!(
        transcript_len = session.transcript().len(),
        completed = session.is_completed(),
        "Session driver stopped"
    );
}

fn apply_command(session: &mut DrivenSession, command: UiCommand) {
    match command {
        UiCommand::SetInput(text) => session.set_input(text),
        UiCommand::SelectOption(option) => {
            if !session.select_option(&option) {
                debug!(%option, "Option not offered in the current answer mode");
            }
        }
        UiCommand::ToggleChoice(option) => {
            if !session.toggle_choice(&option) {
                debug!(%option, "Choice not offered in the current answer mode");
            }
        }
        UiCommand::SetComment(text) => {
            session.set_comment(&text);
        }
        UiCommand::SetWidgetBounds(bounds) => session.set_widget_bounds(bounds),
        UiCommand::Submit => session.submit_answer(),
        UiCommand::Unmount => session.unmount(),
    }
}

fn forward_events(session: &mut DrivenSession, events: &mpsc::UnboundedSender<SessionEvent>) {
    for event in session.drain_events() {
        if events.send(event).is_err() {
            debug!("UI event receiver dropped");
        }
    }
}
