//! Timeout and cancellation for collaborator calls.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use super::report::{Stage, StageFailure};
use crate::error::CollaboratorError;

/// Caller-supplied bounds for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunContext {
    stage_timeout: Duration,
    cancel: Option<watch::Receiver<bool>>,
}

/// Cancels every run sharing its [`RunContext`].
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl RunContext {
    /// Context bounded only by `stage_timeout`.
    pub fn new(stage_timeout: Duration) -> Self {
        Self {
            stage_timeout,
            cancel: None,
        }
    }

    /// Context that can also be cancelled through the returned handle.
    pub fn cancellable(stage_timeout: Duration) -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        (
            Self {
                stage_timeout,
                cancel: Some(receiver),
            },
            CancelHandle { sender },
        )
    }

    pub fn stage_timeout(&self) -> Duration {
        self.stage_timeout
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|receiver| *receiver.borrow())
            .unwrap_or(false)
    }

    /// Fails with `Cancelled` if the run has been cancelled.
    pub fn check(&self, stage: Stage) -> Result<(), StageFailure> {
        if self.is_cancelled() {
            Err(StageFailure::cancelled(stage))
        } else {
            Ok(())
        }
    }

    /// Runs one collaborator call under the stage timeout and cancellation.
    pub async fn guard<T, F>(&self, stage: Stage, call: F) -> Result<T, StageFailure>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        self.check(stage)?;

        let cancelled = wait_cancelled(self.cancel.clone());

        tokio::select! {
            biased;
            _ = cancelled => Err(StageFailure::cancelled(stage)),
            result = tokio::time::timeout(self.stage_timeout, call) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(StageFailure::execution(stage, error)),
                Err(_) => Err(StageFailure::timed_out(stage, self.stage_timeout)),
            },
        }
    }
}

/// Resolves once the run is cancelled; never resolves otherwise.
async fn wait_cancelled(receiver: Option<watch::Receiver<bool>>) {
    match receiver {
        Some(mut receiver) => {
            if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}
