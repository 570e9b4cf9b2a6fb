//! Connection lifecycle, health polling and the retry boundary

use crate::search::backend::{ClusterHealth, ClusterStatus, SearchBackend};
use crate::search::context::RequestContext;
use crate::search::error::{SearchError, SearchResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use strum_macros::{AsRefStr, Display};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capped exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0 = the wait after the first failure)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.min(32) as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    pub fn validate(&self) -> SearchResult<()> {
        if self.max_attempts == 0 {
            return Err(SearchError::InvalidConfiguration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(SearchError::InvalidConfiguration(
                "retry.multiplier must be >= 1".to_string(),
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(SearchError::InvalidConfiguration(
                "retry.max_delay must not be below retry.initial_delay".to_string(),
            ));
        }
        Ok(())
    }
}

/// Link state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Degraded,
}

impl ConnectionState {
    /// Numeric value for the state gauge
    pub fn as_gauge(&self) -> i64 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Degraded => 3,
        }
    }
}

/// Serving health derived from the cluster status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl From<ClusterStatus> for HealthStatus {
    fn from(status: ClusterStatus) -> Self {
        match status {
            ClusterStatus::Green => HealthStatus::Healthy,
            ClusterStatus::Yellow => HealthStatus::Degraded,
            ClusterStatus::Red => HealthStatus::Unhealthy,
        }
    }
}

/// Point-in-time view of the connection, replaced wholesale on every update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub cluster_status: Option<ClusterStatus>,
    pub health: HealthStatus,
    pub last_health_check: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Health polls failed in a row since the last good one
    #[serde(default)]
    pub consecutive_failures: u32,
}

impl Default for ConnectionSnapshot {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            cluster_status: None,
            health: HealthStatus::Unhealthy,
            last_health_check: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }
}

impl ConnectionSnapshot {
    /// Degraded clusters still serve; disconnected or red ones fail fast
    pub fn is_serving(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Degraded
        ) && self.health != HealthStatus::Unhealthy
    }
}

/// Backend operation routed through [`ConnectionManager::execute`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    Search,
    Count,
}

/// One backend call
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub operation: Operation,
    pub index: String,
    pub body: Value,
}

impl BackendRequest {
    pub fn search(index: impl Into<String>, body: Value) -> Self {
        Self {
            operation: Operation::Search,
            index: index.into(),
            body,
        }
    }

    pub fn count(index: impl Into<String>, body: Value) -> Self {
        Self {
            operation: Operation::Count,
            index: index.into(),
            body,
        }
    }
}

/// Owns the backend link. The snapshot is only written here and handed out
/// as a copy.
pub struct ConnectionManager {
    backend: Arc<dyn SearchBackend>,
    policy: RetryPolicy,
    health_interval: Duration,
    snapshot: RwLock<ConnectionSnapshot>,
}

impl ConnectionManager {
    pub fn new(backend: Arc<dyn SearchBackend>, policy: RetryPolicy, health_interval: Duration) -> Self {
        Self {
            backend,
            policy,
            health_interval,
            snapshot: RwLock::new(ConnectionSnapshot::default()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.snapshot.read().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot.read().state
    }

    fn update(&self, f: impl FnOnce(&mut ConnectionSnapshot)) {
        let mut next = self.snapshot.read().clone();
        let previous = next.state;
        f(&mut next);

        if previous != next.state {
            info!(from = %previous, to = %next.state, "Connection state changed");
        }
        crate::metrics::CONNECTION_STATE.set(next.state.as_gauge());
        *self.snapshot.write() = next;
    }

    /// Establish the connection: ping with backoff until it answers or the
    /// attempt budget is spent. Exhaustion is fatal for startup.
    pub async fn connect(&self) -> SearchResult<ConnectionSnapshot> {
        self.update(|s| s.state = ConnectionState::Connecting);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.backend.ping().await {
                Ok(()) => {
                    info!(attempt, "Search backend reachable");
                    break;
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Backend ping failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(attempt, error = %e, "Unable to reach search backend");
                    let message = e.to_string();
                    self.update(|s| {
                        s.state = ConnectionState::Disconnected;
                        s.health = HealthStatus::Unhealthy;
                        s.last_error = Some(message.clone());
                    });
                    return Err(SearchError::Connection(format!(
                        "backend unreachable after {} attempt(s): {}",
                        attempt, message
                    )));
                }
            }
        }

        // Health is refined by the first poll; a reachable node is assumed green
        // until then.
        self.update(|s| {
            s.state = ConnectionState::Connected;
            s.health = HealthStatus::Healthy;
            s.last_error = None;
        });
        Ok(self.check_health().await)
    }

    /// Poll cluster health once and apply it to the snapshot
    pub async fn check_health(&self) -> ConnectionSnapshot {
        let result = self.backend.cluster_health().await;
        self.apply_health(result);
        self.snapshot()
    }

    fn apply_health(&self, result: SearchResult<ClusterHealth>) {
        let now = Utc::now();
        match result {
            Ok(health) => {
                debug!(status = %health.status, nodes = health.number_of_nodes, "Cluster health");
                self.update(|s| {
                    s.cluster_status = Some(health.status);
                    s.health = health.status.into();
                    s.state = match health.status {
                        ClusterStatus::Green => ConnectionState::Connected,
                        ClusterStatus::Yellow | ClusterStatus::Red => ConnectionState::Degraded,
                    };
                    s.last_health_check = Some(now);
                    s.last_error = None;
                    s.consecutive_failures = 0;
                });
            }
            Err(e) => {
                let message = e.to_string();
                let retryable = e.is_retryable();
                let max_failures = self.policy.max_attempts;
                self.update(|s| {
                    s.consecutive_failures += 1;
                    s.last_health_check = Some(now);
                    s.last_error = Some(message);

                    // A transient blip keeps the last known state until the
                    // failure budget is spent
                    if retryable && s.consecutive_failures < max_failures {
                        warn!(
                            error = ?s.last_error,
                            failures = s.consecutive_failures,
                            max_failures,
                            "Cluster health check failed, keeping last known state"
                        );
                        return;
                    }

                    error!(
                        error = ?s.last_error,
                        failures = s.consecutive_failures,
                        "Cluster health unrecoverable, marking disconnected"
                    );
                    s.state = ConnectionState::Disconnected;
                    s.health = HealthStatus::Unhealthy;
                    s.cluster_status = None;
                });
            }
        }
    }

    /// Spawn the recurring health poll; it stops when `shutdown` fires
    pub fn spawn_health_monitor(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.health_interval);
            // The first tick fires immediately; connect() already polled.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Health monitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        manager.check_health().await;
                    }
                }
            }
        })
    }

    /// Execute a backend call under `ctx`.
    ///
    /// Fails fast when the link is not serving. Only retryable errors are
    /// retried, with the connect backoff, and never past the deadline.
    pub async fn execute(&self, request: &BackendRequest, ctx: &RequestContext) -> SearchResult<Value> {
        let snapshot = self.snapshot();
        if !snapshot.is_serving() {
            crate::metrics::BACKEND_REQUESTS
                .with_label_values(&[request.operation.as_ref(), "unavailable"])
                .inc();
            return Err(SearchError::Unavailable(format!(
                "connection is {} (health {})",
                snapshot.state, snapshot.health
            )));
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            ctx.check()?;

            let result = ctx.run(self.dispatch(request)).await;
            match result {
                Ok(value) => {
                    crate::metrics::BACKEND_REQUESTS
                        .with_label_values(&[request.operation.as_ref(), "ok"])
                        .inc();
                    return Ok(value);
                }
                Err(e) => {
                    let deadline_hit = matches!(e, SearchError::Timeout(_)) && ctx.remaining().is_zero();
                    let retryable = e.is_retryable()
                        && !deadline_hit
                        && attempt < self.policy.max_attempts;

                    if !retryable {
                        crate::metrics::BACKEND_REQUESTS
                            .with_label_values(&[request.operation.as_ref(), e.kind()])
                            .inc();
                        if attempt > 1 && e.is_retryable() {
                            warn!(
                                operation = %request.operation,
                                index = %request.index,
                                attempts = attempt,
                                error = %e,
                                "Backend call failed after retries"
                            );
                        }
                        return Err(e);
                    }

                    let delay = self.policy.delay_for(attempt - 1);
                    if delay >= ctx.remaining() {
                        warn!(
                            operation = %request.operation,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Retry would exceed request deadline"
                        );
                        return Err(ctx.timeout_error());
                    }

                    crate::metrics::BACKEND_RETRIES
                        .with_label_values(&[request.operation.as_ref()])
                        .inc();
                    warn!(
                        operation = %request.operation,
                        index = %request.index,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retryable backend error"
                    );
                    ctx.sleep(delay).await?;
                }
            }
        }
    }

    async fn dispatch(&self, request: &BackendRequest) -> SearchResult<Value> {
        match request.operation {
            Operation::Search => self.backend.search(&request.index, &request.body).await,
            Operation::Count => {
                let count = self.backend.count(&request.index, &request.body).await?;
                Ok(json!({ "count": count }))
            }
        }
    }
}
