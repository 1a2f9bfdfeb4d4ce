use futures_util::{SinkExt, StreamExt};
use questionnaire_client::spawn_session;
use questionnaire_core::{AnswerMode, ConnectionPhase, Role, SessionConfig, SessionEvent};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message, frame::coding::CloseCode};

const WAIT: Duration = Duration::from_secs(5);

fn fast_config() -> SessionConfig {
    SessionConfig::default().with_backoff(Duration::from_millis(50), Duration::from_millis(100))
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!(
        "ws://{}/api/chat/questionnaire/start/abc123",
        listener.local_addr().unwrap()
    );
    (listener, endpoint)
}

/// Collects events until one matches `predicate`, returning everything seen.
async fn wait_for(
    events: &mut UnboundedReceiver<SessionEvent>,
    predicate: impl Fn(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("session event channel closed");
        let done = predicate(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

#[tokio::test]
async fn test_choice_answer_reaches_server() {
    let (listener, endpoint) = bind().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Text(
            json!({"type": "agent_response", "content": "Continue?",
                   "data": {"answerType": "single_choice", "options": ["Yes", "No"]}})
            .to_string()
            .into(),
        ))
        .await
        .unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                return serde_json::from_str::<Value>(text.as_str()).unwrap();
            }
        }
        panic!("client never answered");
    });

    let (handle, mut events, task) = spawn_session(&SessionConfig::default(), endpoint);
    let seen = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::AnswerModeChanged(AnswerMode::SingleChoice { .. }))
    })
    .await;
    assert!(seen.contains(&SessionEvent::ConnectionPhaseChanged(ConnectionPhase::Connected)));

    assert!(handle.select_option("No"));
    assert!(handle.submit());

    let answer = timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(answer["content"], "No");
    assert!(answer["metrics"]["sessionDurationSeconds"].is_u64());

    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::AnswerModeChanged(AnswerMode::FreeText))
    })
    .await;

    handle.unmount();
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_permanent_close_is_not_retried() {
    let (listener, endpoint) = bind().await;
    let (handle, mut events, task) = spawn_session(&fast_config(), endpoint);

    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut ws = accept_async(stream).await.unwrap();
    ws.close(Some(CloseFrame {
        code: CloseCode::from(4004),
        reason: "Session not found".into(),
    }))
    .await
    .unwrap();

    let seen = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::TranscriptAppended(entry) if entry.role == Role::System)
    })
    .await;
    assert!(seen.contains(&SessionEvent::ConnectionPhaseChanged(ConnectionPhase::Disconnected)));
    assert!(!seen.contains(&SessionEvent::ConnectionPhaseChanged(ConnectionPhase::Reconnecting)));

    assert!(
        timeout(Duration::from_millis(500), listener.accept())
            .await
            .is_err(),
        "client reconnected after a permanent close"
    );

    handle.unmount();
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_refused_handshake_is_not_retried() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (listener, endpoint) = bind().await;
    let (handle, mut events, task) = spawn_session(&fast_config(), endpoint);

    let (mut stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0);
        request.extend_from_slice(&buf[..n]);
    }
    stream
        .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let seen = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::TranscriptAppended(entry) if entry.role == Role::System)
    })
    .await;
    assert!(seen.contains(&SessionEvent::ConnectionPhaseChanged(ConnectionPhase::Disconnected)));
    assert!(!seen.contains(&SessionEvent::ConnectionPhaseChanged(ConnectionPhase::Reconnecting)));
    assert!(
        timeout(Duration::from_millis(500), listener.accept())
            .await
            .is_err(),
        "client retried a refused handshake"
    );

    handle.unmount();
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_inactivity_timeout_is_not_retried() {
    let (listener, endpoint) = bind().await;
    let (handle, mut events, task) = spawn_session(&fast_config(), endpoint);

    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut ws = accept_async(stream).await.unwrap();
    ws.send(Message::Text(
        json!({"type": "timeout", "content": "La sesión ha expirado por inactividad",
               "session_id": "abc123"})
        .to_string()
        .into(),
    ))
    .await
    .unwrap();
    ws.close(None).await.unwrap();

    let seen = wait_for(&mut events, |e| {
        *e == SessionEvent::ConnectionPhaseChanged(ConnectionPhase::Disconnected)
    })
    .await;
    assert!(seen.iter().any(|e| matches!(
        e,
        SessionEvent::TranscriptAppended(entry) if entry.role == Role::System
    )));
    assert!(
        timeout(Duration::from_millis(500), listener.accept())
            .await
            .is_err(),
        "client reconnected to an expired session"
    );

    handle.unmount();
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reconnects_after_abnormal_drop() {
    let (listener, endpoint) = bind().await;
    let (handle, mut events, task) = spawn_session(&fast_config(), endpoint);

    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let first = accept_async(stream).await.unwrap();
    wait_for(&mut events, |e| {
        *e == SessionEvent::ConnectionPhaseChanged(ConnectionPhase::Connected)
    })
    .await;
    drop(first);

    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut second = accept_async(stream).await.unwrap();
    second
        .send(Message::Text(
            json!({"type": "agent_response", "content": "Continue?",
                   "data": {"is_current_state": true, "answerType": "single_choice", "options": ["Yes", "No"]}})
            .to_string()
            .into(),
        ))
        .await
        .unwrap();

    let seen = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::AnswerModeChanged(AnswerMode::SingleChoice { .. }))
    })
    .await;
    assert!(seen.contains(&SessionEvent::ConnectionPhaseChanged(ConnectionPhase::Reconnecting)));
    assert!(seen.contains(&SessionEvent::ConnectionPhaseChanged(ConnectionPhase::Connected)));
    assert!(
        !seen
            .iter()
            .any(|e| matches!(e, SessionEvent::TranscriptAppended(entry) if entry.role == Role::Agent)),
        "a current-state replay must not add to the transcript"
    );

    handle.unmount();
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unmount_closes_socket_and_detaches_listeners() {
    let (listener, endpoint) = bind().await;
    let (handle, mut events, task) = spawn_session(&SessionConfig::default(), endpoint);
    let listener_handle = handle.listen_document();

    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut ws = accept_async(stream).await.unwrap();
    wait_for(&mut events, |e| {
        *e == SessionEvent::ConnectionPhaseChanged(ConnectionPhase::Connected)
    })
    .await;

    assert!(listener_handle.pointer_moved(1.0, 1.0));
    assert!(listener_handle.visibility_changed(false));

    handle.unmount();
    timeout(WAIT, task).await.unwrap().unwrap();

    let closed = timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return true,
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .unwrap();
    assert!(closed);
    assert!(!listener_handle.is_attached());
    assert!(!listener_handle.pointer_moved(2.0, 2.0));
    assert!(!handle.submit());
}
