//! Fire-and-forget search analytics

use crate::search::error::SearchResult;
use crate::search::request::{QueryStrategy, SearchMode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One completed search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEvent {
    pub id: Uuid,
    pub query: Option<String>,
    pub strategy: QueryStrategy,
    pub mode: SearchMode,
    pub result_count: u64,
    pub latency_ms: u64,
    pub filters_used: Vec<String>,
    pub cache_hit: bool,
    pub timestamp: DateTime<Utc>,
}

/// Destination for analytics events
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, event: SearchEvent) -> SearchResult<()>;
}

/// Writes events as structured log records
#[derive(Debug, Default, Clone)]
pub struct TracingAnalyticsSink;

#[async_trait]
impl AnalyticsSink for TracingAnalyticsSink {
    async fn record(&self, event: SearchEvent) -> SearchResult<()> {
        info!(
            target: "catalog_search::analytics",
            event_id = %event.id,
            query = event.query.as_deref().unwrap_or(""),
            strategy = %event.strategy,
            mode = %event.mode,
            result_count = event.result_count,
            latency_ms = event.latency_ms,
            filters = ?event.filters_used,
            cache_hit = event.cache_hit,
            "search"
        );
        Ok(())
    }
}

/// Hands events to a background consumer. `emit` never waits: a full or
/// closed queue drops the event with a warning.
#[derive(Clone)]
pub struct AnalyticsEmitter {
    tx: Option<mpsc::Sender<SearchEvent>>,
}

impl AnalyticsEmitter {
    /// Spawn the consumer task. It exits once every emitter clone is dropped.
    pub fn spawn(sink: Arc<dyn AnalyticsSink>, queue_size: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<SearchEvent>(queue_size.max(1));

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let id = event.id;
                if let Err(e) = sink.record(event).await {
                    warn!(event_id = %id, error = %e, "Analytics sink rejected event");
                }
            }
            debug!("Analytics consumer stopped");
        });

        (Self { tx: Some(tx) }, handle)
    }

    /// Emitter that discards everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: SearchEvent) {
        let Some(tx) = &self.tx else {
            return;
        };

        if let Err(e) = tx.try_send(event) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "consumer stopped",
            };
            warn!(reason, "Dropping analytics event");
            crate::metrics::ANALYTICS_DROPPED.inc();
        }
    }
}
