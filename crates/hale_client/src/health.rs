//! Health monitor: periodic `/health` probes behind a `watch` channel.
//!
//! The monitor is the only writer of [`ConnectionState`]. It starts offline
//! and only a completed probe moves it; query outcomes never do.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Client;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub online: bool,
    /// Completion time of the most recent probe.
    pub last_probe: Option<DateTime<Utc>>,
}

struct Prober {
    client: Client,
    state: watch::Sender<ConnectionState>,
    // Held for the whole probe so probes never overlap.
    gate: Mutex<()>,
    cancel: CancellationToken,
}

impl Prober {
    async fn probe(&self) -> bool {
        let _gate = self.gate.lock().await;
        let result = tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = self.client.health() => Some(result),
        };
        let online = match result {
            None => {
                debug!("probe discarded after monitor stop");
                let current = self.state.borrow().online;
                return current;
            }
            Some(Ok(())) => true,
            Some(Err(err)) => {
                debug!(error = %err, url = %self.client.base_url(), "health probe failed");
                false
            }
        };
        let cancel = &self.cancel;
        self.state.send_if_modified(|state| {
            if cancel.is_cancelled() {
                return false;
            }
            let changed = state.online != online;
            *state = ConnectionState {
                online,
                last_probe: Some(Utc::now()),
            };
            if changed {
                if online {
                    info!(url = %self.client.base_url(), "answer service is reachable");
                } else {
                    warn!(url = %self.client.base_url(), "answer service is unreachable");
                }
            }
            true
        });
        online
    }
}

/// Owns the connectivity flag and the periodic probe task.
pub struct HealthMonitor {
    prober: Arc<Prober>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// A stopped monitor in the offline state. Call [`start`](Self::start) to poll.
    pub fn new(client: Client) -> Self {
        let cancel = CancellationToken::new();
        let (state, _) = watch::channel(ConnectionState::default());
        HealthMonitor {
            prober: Arc::new(Prober {
                client,
                state,
                gate: Mutex::new(()),
                cancel: cancel.clone(),
            }),
            cancel,
            task: None,
        }
    }

    /// Build and start polling every `interval`. Must run inside a tokio runtime.
    pub fn spawn(client: Client, interval: Duration) -> Self {
        let mut monitor = Self::new(client);
        monitor.start(interval);
        monitor
    }

    /// Start the polling task. The first probe fires immediately. No-op when
    /// already running or stopped.
    pub fn start(&mut self, interval: Duration) {
        if self.task.is_some() || self.cancel.is_cancelled() {
            return;
        }
        let prober = Arc::clone(&self.prober);
        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("health loop cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        prober.probe().await;
                    }
                }
            }
        }));
    }

    /// Run one probe now and return the resulting connectivity. Waits for a
    /// probe already in progress instead of overlapping it.
    pub async fn probe(&self) -> bool {
        self.prober.probe().await
    }

    pub fn state(&self) -> ConnectionState {
        *self.prober.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.prober.state.borrow().online
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.prober.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel polling and any probe in flight. Idempotent.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
