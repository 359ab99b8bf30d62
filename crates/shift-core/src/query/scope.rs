use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::{EventRecorder, SqlArg};
use crate::error::{Result, ShiftError};

/// Cancellation, deadline and optional query trace for one logical call.
///
/// Scopes are cheap to clone and are passed by reference down the call
/// chain. A scope with no recorder simply does not trace.
#[derive(Debug, Clone, Default)]
pub struct CallScope {
    token: CancellationToken,
    deadline: Option<tokio::time::Instant>,
    recorder: Option<Arc<EventRecorder>>,
}

impl CallScope {
    /// A scope that never cancels and records nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire `timeout` from now, keeping an earlier deadline if one is set.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(tokio::time::Instant::now() + timeout)
    }

    /// Expire at `deadline`, keeping an earlier deadline if one is set.
    pub fn with_deadline(mut self, deadline: tokio::time::Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Record every query issued under this scope.
    pub fn with_recorder(mut self, recorder: Arc<EventRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// A scope cancelled together with this one, but cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            recorder: self.recorder.clone(),
        }
    }

    /// Cancel every call racing on this scope. Repeated calls are no-ops.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<tokio::time::Instant> {
        self.deadline
    }

    pub fn recorder(&self) -> Option<&Arc<EventRecorder>> {
        self.recorder.as_ref()
    }

    /// Fail fast when the scope is already cancelled or expired.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(ShiftError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= tokio::time::Instant::now() => {
                Err(ShiftError::DeadlineExceeded)
            }
            _ => Ok(()),
        }
    }

    /// Resolves once the scope is cancelled or its deadline passes.
    ///
    /// Never resolves for a scope with neither.
    pub async fn done(&self) -> ShiftError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => ShiftError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ShiftError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ShiftError::Cancelled
            }
        }
    }

    /// Append a trace event if a recorder is attached.
    pub async fn record(
        &self,
        query: &str,
        args: &[SqlArg],
        started: Instant,
        error: Option<&ShiftError>,
    ) {
        if let Some(recorder) = &self.recorder {
            recorder.record(query, args, started, error).await;
        }
    }
}
