//! Terminal front end for questionnaire conversations.
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Deriving the websocket endpoint from a session id or a page address.
//! 3. Running the session driver and rendering its events on stdout.
//! 4. Turning lines typed on stdin into answers for the active answer mode.

use anyhow::Context;
use clap::Parser;
use questionnaire_client::{SessionHandle, config::Config, spawn_session};
use questionnaire_core::{
    AnswerMode, COMMENT_OPTION, ConnectionPhase, EndpointError, Role, SessionEvent,
    session_id_from_page,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Answer a questionnaire conversation from the terminal")]
struct Args {
    /// Session identifier issued when the questionnaire was started.
    #[arg(long, conflicts_with = "page_url")]
    session_id: Option<String>,
    /// Questionnaire page address carrying the session identifier.
    #[arg(long)]
    page_url: Option<String>,
}

fn render(event: &SessionEvent) {
    match event {
        SessionEvent::ConnectionPhaseChanged(phase) => match phase {
            ConnectionPhase::Connecting => println!("... connecting"),
            ConnectionPhase::Connected => println!("... connected"),
            ConnectionPhase::Reconnecting => println!("... connection lost, reconnecting"),
            ConnectionPhase::Disconnected => println!("... disconnected"),
            ConnectionPhase::Failed => println!("... connection failed"),
        },
        SessionEvent::TranscriptAppended(entry) => {
            let label = match entry.role {
                Role::Agent => "agent",
                Role::User => "you",
                Role::System => "system",
            };
            if entry.is_welcome {
                println!("==============================");
            }
            println!("[{}] {}", label, entry.content);
        }
        SessionEvent::AnswerModeChanged(mode) => {
            let hint = match mode {
                AnswerMode::SingleChoice { selected: None, .. } => {
                    "(answer with a number or the option text)"
                }
                AnswerMode::MultipleChoice { selected, .. } if selected.is_empty() => {
                    "(comma separated numbers; any other text is sent as a comment)"
                }
                _ => return,
            };
            for (i, option) in mode.options().iter().enumerate() {
                println!("  {}) {}", i + 1, option);
            }
            println!("  {}", hint);
        }
        SessionEvent::AgentTyping(true) => println!("... agent is typing"),
        SessionEvent::AgentTyping(false) => {}
        SessionEvent::ConversationCompleted(summary) => {
            println!("Conversation complete.");
            if let Some(summary) = summary {
                if let Ok(pretty) = serde_json::to_string_pretty(summary) {
                    println!("{}", pretty);
                }
            }
            println!("(press Ctrl+D to exit)");
        }
        SessionEvent::UiConfigReceived(config) => {
            if let Some(avatar) = config.avatar().filter(|a| a.show) {
                if let Some(name) = avatar.name {
                    println!("You are talking with {}.", name);
                }
            }
        }
    }
}

/// Maps one typed line onto the commands for the active answer mode.
fn answer(handle: &SessionHandle, mode: &AnswerMode, line: &str) {
    let options = mode.options();
    let pick = |token: &str| -> Option<String> {
        token
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| options.get(i).cloned())
            .or_else(|| options.iter().find(|o| o.as_str() == token).cloned())
    };

    match mode {
        AnswerMode::FreeText => {
            handle.set_input(line);
        }
        AnswerMode::SingleChoice { .. } => {
            if let Some(option) = pick(line) {
                handle.select_option(option);
            }
        }
        AnswerMode::MultipleChoice { selected, .. } => {
            let mut comment = Vec::new();
            for token in line.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                match pick(token) {
                    Some(option) if !selected.contains(&option) => {
                        handle.toggle_choice(option);
                    }
                    Some(_) => {}
                    None => comment.push(token),
                }
            }
            if !comment.is_empty() {
                if !selected.iter().any(|s| s == COMMENT_OPTION) {
                    handle.toggle_choice(COMMENT_OPTION);
                }
                handle.set_comment(comment.join(", "));
            }
        }
    }
    handle.submit();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    // --- 3. Derive Endpoint ---
    let session_id = match (args.session_id, args.page_url) {
        (Some(id), _) => id,
        (None, Some(page_url)) => session_id_from_page(&page_url)?,
        (None, None) => return Err(EndpointError::MissingSessionIdentifier.into()),
    };
    let endpoint = config
        .endpoint_for(&session_id)
        .context("Failed to build the websocket endpoint")?;
    info!(%endpoint, "Starting questionnaire session");

    // --- 4. Run Session ---
    let (handle, mut events, task) = spawn_session(&config.session_config(), endpoint);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut mode = AnswerMode::FreeText;
    let mut stdin_open = true;
    let mut stopping = false;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if let SessionEvent::AnswerModeChanged(new_mode) = &event {
                        mode = new_mode.clone();
                    }
                    render(&event);
                }
                None => break,
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => answer(&handle, &mode, line.trim()),
                None => {
                    stdin_open = false;
                    handle.unmount();
                }
            },
            _ = &mut shutdown, if !stopping => {
                info!("Received Ctrl+C, leaving the conversation");
                stopping = true;
                handle.unmount();
            }
        }
    }

    task.await.context("Session driver panicked")?;
    Ok(())
}
