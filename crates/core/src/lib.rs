pub mod answer;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod reconnect;
pub mod session;
pub mod telemetry;
pub mod transcript;
pub mod transport;

pub use answer::{AnswerMode, COMMENT_OPTION};
pub use config::SessionConfig;
pub use endpoint::{EndpointTemplate, session_id_from_page};
pub use error::{ConnectionFailure, DecodeError, EndpointError, TransportError};
pub use protocol::{AnswerType, InboundMessage, OutboundMessage, UiConfig};
pub use reconnect::{ReconnectDecision, ReconnectPolicy, ReconnectTimer};
pub use session::{CONVERSATION_ENDED, ConnectionPhase, SESSION_EXPIRED, Session, SessionEvent};
pub use telemetry::{Bounds, EngagementMetrics, EngagementTracker};
pub use transcript::{Role, Transcript, TranscriptEntry};
pub use transport::{Transport, TransportEvent};
