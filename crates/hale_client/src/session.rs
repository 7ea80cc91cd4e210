//! Session controller: owns the conversation and metrics, issues one query at
//! a time, and supervises connectivity through a [`HealthMonitor`].
//!
//! Observers read [`SessionSnapshot`]s, either on demand or through the
//! `watch` channel returned by [`Session::subscribe`]. Intents come in through
//! [`Session::submit_question`], [`Session::toggle_view`] and
//! [`Session::dismiss_notice`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{Client, ClientError};
use crate::config::Config;
use crate::conversation::{Conversation, InvariantError, Message, MessageStatus};
use crate::health::{ConnectionState, HealthMonitor};
use crate::messages::{Answer, HistoryTurn, ServerMetrics};
use crate::metrics::{Metrics, MetricsAggregator};

/// Text of the assistant entry written when a query fails.
pub const FAILURE_EXPLANATION: &str =
    "Sorry, I encountered an error connecting to the server. Please ensure the backend is running.";

/// Rejected intent or failed session setup.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("question cannot be empty")]
    EmptyQuestion,
    #[error("an answer is still pending")]
    RequestPending,
    #[error("answer service is offline")]
    Offline,
    #[error("session is closed")]
    Closed,
    #[error("no tokio runtime available")]
    NoRuntime,
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    #[error("client setup failed: {0}")]
    Client(#[from] ClientError),
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub metrics: Metrics,
    pub show_metrics: bool,
    pub show_notice: bool,
    pub pending: bool,
}

/// Result of one completed request.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub message: Message,
    pub latency: Duration,
    /// Underlying failure, for logs and diagnostics only.
    pub error: Option<String>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.message.status == MessageStatus::Resolved
    }
}

/// Handle to an in-flight question.
#[derive(Debug)]
pub struct Submission {
    task: JoinHandle<Option<Outcome>>,
}

impl Submission {
    /// Wait for the request to complete. `None` when the session was closed
    /// first and the result was discarded.
    pub async fn outcome(self) -> Option<Outcome> {
        self.task.await.ok().flatten()
    }
}

struct SessionState {
    conversation: Conversation,
    metrics: MetricsAggregator,
    show_metrics: bool,
    show_notice: bool,
    closed: bool,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            messages: self.conversation.entries().to_vec(),
            metrics: self.metrics.snapshot(),
            show_metrics: self.show_metrics,
            show_notice: self.show_notice,
            pending: self.conversation.has_pending(),
        }
    }
}

struct Shared {
    state: Mutex<SessionState>,
    updates: watch::Sender<SessionSnapshot>,
    cancel: CancellationToken,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SessionState) {
        self.updates.send_replace(state.snapshot());
    }

    fn complete(
        &self,
        result: Result<Answer, ClientError>,
        latency: Duration,
    ) -> Option<Outcome> {
        let mut state = self.lock();
        if state.closed {
            debug!("discarding result for closed session");
            return None;
        }
        let (message, err) = match result {
            Ok(answer) => (
                Message::resolved(answer.answer, answer.sources, answer.metadata),
                None,
            ),
            Err(err) => {
                warn!(error = %err, timeout = err.is_timeout(), "query failed");
                (Message::failed(FAILURE_EXPLANATION), Some(err.to_string()))
            }
        };
        if let Err(err) = state.conversation.replace_last(message.clone()) {
            error!(error = %err, "completed request has no pending entry");
            return None;
        }
        let success = err.is_none();
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        let metrics = state.metrics.record(success, latency_ms);
        info!(
            success,
            latency_ms,
            total_requests = metrics.total_requests,
            "request completed"
        );
        self.publish(&state);
        Some(Outcome {
            message,
            latency,
            error: err,
        })
    }
}

async fn run_query(
    shared: Arc<Shared>,
    client: Client,
    question: String,
    history: Vec<HistoryTurn>,
    started: Instant,
) -> Option<Outcome> {
    let result = tokio::select! {
        _ = shared.cancel.cancelled() => None,
        result = client.query(&question, &history) => Some(result),
    };
    match result {
        Some(result) => shared.complete(result, started.elapsed()),
        None => {
            debug!("request abandoned at teardown");
            None
        }
    }
}

/// One user's conversation with the answer service.
pub struct Session {
    client: Client,
    shared: Arc<Shared>,
    monitor: HealthMonitor,
    runtime: Handle,
    started: Instant,
}

impl Session {
    /// Build a session from config and start health polling.
    /// Must be called from within a tokio runtime.
    pub fn start(config: &Config) -> Result<Self, SessionError> {
        let client = Client::from_config(&config.server)?;
        Self::new(client, config.server.health_interval())
    }

    /// Build a session around an existing client and start health polling.
    pub fn new(client: Client, health_interval: Duration) -> Result<Self, SessionError> {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let monitor = HealthMonitor::spawn(client.clone(), health_interval);
        let state = SessionState {
            conversation: Conversation::new(),
            metrics: MetricsAggregator::new(),
            show_metrics: false,
            show_notice: true,
            closed: false,
        };
        let (updates, _) = watch::channel(state.snapshot());
        Ok(Session {
            client,
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                updates,
                cancel: CancellationToken::new(),
            }),
            monitor,
            runtime,
            started: Instant::now(),
        })
    }

    /// Ask a question. The user entry and a pending placeholder are appended
    /// before this returns; the answer arrives through the returned
    /// [`Submission`] and the snapshot channel.
    pub fn submit_question(&self, text: &str) -> Result<Submission, SessionError> {
        let question = text.trim();
        if question.is_empty() {
            return Err(SessionError::EmptyQuestion);
        }
        let mut state = self.shared.lock();
        if state.closed {
            return Err(SessionError::Closed);
        }
        if state.conversation.has_pending() {
            return Err(SessionError::RequestPending);
        }
        if !self.monitor.is_online() {
            return Err(SessionError::Offline);
        }

        let history = state.conversation.history();
        state.conversation.append(Message::user(question))?;
        state.conversation.append(Message::pending())?;
        let started = Instant::now();
        self.shared.publish(&state);
        drop(state);

        info!(
            chars = question.chars().count(),
            turns = history.len(),
            "question submitted"
        );
        let task = self.runtime.spawn(run_query(
            Arc::clone(&self.shared),
            self.client.clone(),
            question.to_string(),
            history,
            started,
        ));
        Ok(Submission { task })
    }

    /// Flip the metrics panel. Returns the new visibility.
    pub fn toggle_view(&self) -> bool {
        let mut state = self.shared.lock();
        state.show_metrics = !state.show_metrics;
        self.shared.publish(&state);
        state.show_metrics
    }

    pub fn dismiss_notice(&self) {
        let mut state = self.shared.lock();
        if state.show_notice {
            state.show_notice = false;
            self.shared.publish(&state);
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().snapshot()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.shared.lock().conversation.entries().to_vec()
    }

    pub fn metrics(&self) -> Metrics {
        self.shared.lock().metrics.snapshot()
    }

    pub fn is_pending(&self) -> bool {
        self.shared.lock().conversation.has_pending()
    }

    /// Snapshot updates, published after every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.updates.subscribe()
    }

    pub fn connection(&self) -> ConnectionState {
        self.monitor.state()
    }

    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.monitor.subscribe()
    }

    /// Probe now instead of waiting for the next tick.
    pub async fn probe(&self) -> bool {
        self.monitor.probe().await
    }

    /// Resource usage reported by the answer service. Does not affect
    /// connectivity or request metrics.
    pub async fn server_resources(&self) -> Result<ServerMetrics, ClientError> {
        self.client.server_metrics().await
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Tear down: stop health polling and discard any in-flight result.
    /// Idempotent.
    pub fn close(&mut self) {
        {
            let mut state = self.shared.lock();
            if !state.closed {
                debug!("closing session");
            }
            state.closed = true;
        }
        self.shared.cancel.cancel();
        self.monitor.stop();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
