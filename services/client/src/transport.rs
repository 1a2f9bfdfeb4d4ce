//! WebSocket transport built on `tokio-tungstenite`.
//!
//! Each `open` starts a new connection generation backed by one spawned
//! task. The task reports lifecycle events tagged with its generation, and
//! [`WsTransport::accept`] discards anything that does not belong to the
//! current connection, so a slow-closing socket can never leak a late frame
//! into a newer conversation.

use futures_util::{SinkExt, StreamExt};
use questionnaire_core::transport::{ABNORMAL_CLOSURE, NO_STATUS_RECEIVED};
use questionnaire_core::{Transport, TransportError, TransportEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, client::IntoClientRequest, handshake::client::Request, protocol::Message},
};
use tracing::{Instrument, debug, info, warn};

/// A transport event stamped with the connection generation that produced it.
#[derive(Debug)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

struct Connection {
    generation: u64,
    outgoing: mpsc::UnboundedSender<Message>,
    ready: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

pub struct WsTransport {
    events: mpsc::UnboundedSender<TaggedEvent>,
    generation: u64,
    current: Option<Connection>,
}

impl WsTransport {
    pub fn new(events: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self {
            events,
            generation: 0,
            current: None,
        }
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current
            .as_ref()
            .is_some_and(|c| c.generation == generation)
    }

    /// Unwraps an event if it belongs to the current connection.
    pub fn accept(&self, tagged: TaggedEvent) -> Option<TransportEvent> {
        if self.is_current(tagged.generation) {
            Some(tagged.event)
        } else {
            debug!(
                generation = tagged.generation,
                current = self.generation,
                event = ?tagged.event,
                "Discarding event from a superseded connection"
            );
            None
        }
    }
}

impl Transport for WsTransport {
    fn open(&mut self, endpoint: &str) -> Result<(), TransportError> {
        self.close();

        let request = endpoint
            .into_client_request()
            .map_err(|e| TransportError::Construction(e.to_string()))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Construction(e.to_string()))?;

        self.generation += 1;
        let generation = self.generation;
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let ready = Arc::new(AtomicBool::new(false));
        let span = tracing::info_span!("ws_connection", generation);
        let task = runtime.spawn(
            run_connection(
                request,
                generation,
                self.events.clone(),
                outgoing_rx,
                ready.clone(),
            )
            .instrument(span),
        );

        self.current = Some(Connection {
            generation,
            outgoing,
            ready,
            task,
        });
        Ok(())
    }

    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let connection = self
            .current
            .as_ref()
            .filter(|c| c.ready.load(Ordering::Acquire))
            .ok_or(TransportError::NotConnected)?;
        connection
            .outgoing
            .send(Message::Text(frame.to_string().into()))
            .map_err(|_| TransportError::NotConnected)
    }

    fn close(&mut self) {
        if let Some(connection) = self.current.take() {
            connection.ready.store(false, Ordering::Release);
            // The task sends the close frame and exits; if it is already gone there is nothing to close.
            if connection.outgoing.send(Message::Close(None)).is_err() {
                connection.task.abort();
            }
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(connection) = self.current.take() {
            connection.task.abort();
        }
    }
}

/// Drives one socket from handshake to close.
async fn run_connection(
    request: Request,
    generation: u64,
    events: mpsc::UnboundedSender<TaggedEvent>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    ready: Arc<AtomicBool>,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send(TaggedEvent { generation, event });
    };

    let ws_stream = tokio::select! {
        result = connect_async(request) => match result {
            Ok((ws_stream, _)) => ws_stream,
            Err(tungstenite::Error::Http(response)) => {
                let status = response.status().as_u16();
                warn!(status, "Server rejected the websocket handshake");
                emit(TransportEvent::Closed { code: status, was_clean: false });
                return;
            }
            Err(e) => {
                warn!(error = %e, "Websocket connection failed");
                emit(TransportEvent::Errored(e.to_string()));
                emit(TransportEvent::Closed { code: ABNORMAL_CLOSURE, was_clean: false });
                return;
            }
        },
        // Only a close request can arrive before the handshake completes.
        _ = outgoing.recv() => {
            debug!("Connection superseded during handshake");
            return;
        }
    };

    info!("Websocket connected");
    ready.store(true, Ordering::Release);
    emit(TransportEvent::Opened);
    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            message = outgoing.recv() => match message {
                Some(Message::Close(frame)) => {
                    let _ = sink.send(Message::Close(frame)).await;
                    debug!("Closed by client");
                    break;
                }
                Some(message) => {
                    if let Err(e) = sink.send(message).await {
                        ready.store(false, Ordering::Release);
                        warn!(error = %e, "Failed to write to websocket");
                        emit(TransportEvent::Errored(e.to_string()));
                        emit(TransportEvent::Closed { code: ABNORMAL_CLOSURE, was_clean: false });
                        break;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    emit(TransportEvent::MessageReceived(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    ready.store(false, Ordering::Release);
                    let code = frame
                        .map(|f| u16::from(f.code))
                        .unwrap_or(NO_STATUS_RECEIVED);
                    info!(code, "Server closed the websocket");
                    emit(TransportEvent::Closed { code, was_clean: true });
                    break;
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(bytes = data.len(), "Ignoring binary frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    ready.store(false, Ordering::Release);
                    warn!(error = %e, "Error reading from websocket");
                    emit(TransportEvent::Errored(e.to_string()));
                    emit(TransportEvent::Closed { code: ABNORMAL_CLOSURE, was_clean: false });
                    break;
                }
                None => {
                    ready.store(false, Ordering::Release);
                    emit(TransportEvent::Closed { code: ABNORMAL_CLOSURE, was_clean: false });
                    break;
                }
            },
        }
    }
}
