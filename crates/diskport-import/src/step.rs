//! Guarded step execution
//!
//! Every pipeline stage runs as a [`Step`]: work spawned on its own task, raced
//! against the import's [`RunContext`]. When the context finishes first the step is
//! asked to cancel; only a step that confirms the interruption turns into a timeout
//! or cancellation error. Trace logs are read once the task has terminated.

use crate::processor::ProcessorKind;
use async_trait::async_trait;
use diskport_import_types::{
    ImportError, ImportResult, Inflation, InflationFailure, LoggableBuilder, PersistentDisk,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cancellation and trace-log contract shared by every stage
#[async_trait]
pub trait Step: Send + Sync {
    /// Ask the in-flight work to stop.
    ///
    /// Returns `true` only when the work was actually interrupted. A step that has
    /// already finished, or cannot be interrupted, returns `false` and its own
    /// outcome stands.
    async fn cancel(&self, reason: &str) -> bool;

    /// Diagnostic lines collected while the step ran
    fn trace_logs(&self) -> Vec<String>;
}

/// Converts a source into a persistent disk
#[async_trait]
pub trait Inflater: Step {
    async fn inflate(&self) -> Result<Inflation, InflationFailure>;
}

/// Pipeline stage producing the next disk state
#[async_trait]
pub trait Processor: Step {
    async fn process(
        &self,
        disk: PersistentDisk,
        loggable: &LoggableBuilder,
    ) -> ImportResult<PersistentDisk>;

    fn kind(&self) -> ProcessorKind;
}

/// Deadline and caller cancellation shared by every step of one import
#[derive(Debug, Clone)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl RunContext {
    /// Context bound to `token` and, when given, a deadline `timeout` from now
    pub fn new(token: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            token,
            deadline: timeout.map(|t| Instant::now() + t),
            timeout,
        }
    }

    fn timeout_error(&self) -> ImportError {
        ImportError::Timeout {
            timeout: self.timeout.unwrap_or_default(),
        }
    }

    fn cancelled_error(&self) -> ImportError {
        ImportError::Cancelled("the import was cancelled by the caller".to_string())
    }

    /// Error describing why the context is done, or `None` while it is live
    pub fn err(&self) -> Option<ImportError> {
        if self.token.is_cancelled() {
            return Some(self.cancelled_error());
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(self.timeout_error()),
            _ => None,
        }
    }

    /// Resolves once the context is done
    pub async fn done(&self) -> ImportError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => self.cancelled_error(),
                _ = tokio::time::sleep_until(deadline) => self.timeout_error(),
            },
            None => {
                self.token.cancelled().await;
                self.cancelled_error()
            }
        }
    }
}

/// Run `work` for `step` as a guarded step under `ctx`.
///
/// Returns the step outcome together with the step's trace logs, read after the
/// spawned task has terminated.
pub async fn run_step<S, T, E, F, Fut>(
    ctx: &RunContext,
    step: Arc<S>,
    work: F,
) -> (Result<T, E>, Vec<String>)
where
    S: Step + ?Sized + 'static,
    F: FnOnce(Arc<S>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<ImportError> + Send + 'static,
{
    let worker_ctx = ctx.clone();
    let worker_step = Arc::clone(&step);
    let mut handle = tokio::spawn(async move {
        if let Some(err) = worker_ctx.err() {
            return Err(E::from(err));
        }
        work(worker_step).await
    });

    let joined = tokio::select! {
        biased;
        joined = &mut handle => joined,
        err = ctx.done() => {
            let reason = match err {
                ImportError::Timeout { .. } => "timed-out",
                _ => "cancelled",
            };
            debug!("Context done while step in flight, cancelling: {}", reason);
            if step.cancel(reason).await {
                // Interrupted; the outcome is the context error
                if let Err(join_err) = handle.await {
                    warn!("⚠️ Interrupted step task did not exit cleanly: {}", join_err);
                }
                Ok(Err(E::from(err)))
            } else {
                warn!("⚠️ Step could not be interrupted, waiting for it to finish");
                handle.await
            }
        }
    };

    let outcome = match joined {
        Ok(outcome) => outcome,
        Err(join_err) => Err(E::from(ImportError::Internal(format!(
            "step task failed: {}",
            join_err
        )))),
    };

    (outcome, step.trace_logs())
}
