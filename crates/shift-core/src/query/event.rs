use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

use super::SqlArg;
use crate::error::ShiftError;

/// One executed query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryEvent {
    /// Query text as passed by the caller.
    pub query: String,
    /// Positional parameters as passed by the caller.
    pub args: Vec<SqlArg>,
    /// Time from call start until the outcome was returned.
    #[serde(with = "duration_micros")]
    pub duration: Duration,
    /// The error returned to the caller, if any.
    pub error: Option<String>,
}

impl QueryEvent {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Append-only trace of the queries issued under one call scope.
///
/// Shared between concurrent callers through an `Arc`; every append takes
/// the lock, so events stay in the order the calls returned.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<QueryEvent>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event for a call that started at `started`.
    pub async fn record(
        &self,
        query: &str,
        args: &[SqlArg],
        started: Instant,
        error: Option<&ShiftError>,
    ) {
        let event = QueryEvent {
            query: query.to_string(),
            args: args.to_vec(),
            duration: started.elapsed(),
            error: error.map(|e| e.to_string()),
        };

        self.events.lock().await.push(event);
    }

    /// Snapshot of all events in call order.
    pub async fn events(&self) -> Vec<QueryEvent> {
        self.events.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }

    /// Drop all recorded events.
    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

mod duration_micros {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_micros() as u64)
    }
}
