//! HaleAI chat session client: conversation store, request metrics, health
//! monitoring and the session controller tying them together.
//! Used by the `hale-chat` terminal front-end.

pub mod client;
pub mod config;
pub mod conversation;
pub mod health;
pub mod messages;
pub mod metrics;
pub mod session;

pub use client::{Client, ClientError};
pub use config::{default_config_path, Config, ConfigError, ServerSection};
pub use conversation::{Conversation, InvariantError, Message, MessageStatus, Role};
pub use health::{ConnectionState, HealthMonitor};
pub use messages::{Answer, HistoryTurn, Reference, ServerMetrics};
pub use metrics::{Metrics, MetricsAggregator};
pub use session::{Outcome, Session, SessionError, SessionSnapshot, Submission, FAILURE_EXPLANATION};
