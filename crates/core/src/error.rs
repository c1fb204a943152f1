// SPDX-License-Identifier: MIT

//! Shared error taxonomy (spec §7).
//!
//! Every fallible core operation returns `Result<T, DynamoError>`. Variants
//! map 1:1 onto the error kinds in the specification so that callers can
//! match on them to decide whether to recover locally (transition an action
//! to `failed`/`killed` and keep polling) or let the error propagate and
//! trigger a shutdown.

use thiserror::Error;

/// The unified error type for the scheduler/inventory core.
#[derive(Debug, Error)]
pub enum DynamoError {
    /// Invalid or unreachable object reference (e.g. an unknown dataset name
    /// when embedding a block).
    #[error("object error: {0}")]
    Object(String),

    /// A block's cached `num_files`/`size` disagree with its loaded files.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// An attribute extractor received an object of the wrong polymorphic
    /// variant. Indicates a programming error, not bad input.
    #[error("operational error: {0}")]
    Operational(String),

    /// A write-requesting action had no matching authorization row.
    #[error("action {action_id} is not authorized to write")]
    AuthorizationFailure { action_id: i64 },

    /// A worker process exited with a nonzero status.
    #[error("worker for action {action_id} exited with status {exit_code:?}")]
    WorkerCrash {
        action_id: i64,
        exit_code: Option<i32>,
    },

    /// Draining the mutation channel exceeded the per-message timeout.
    #[error("channel drain for action {action_id} timed out waiting for EOM")]
    ChannelTimeout { action_id: i64 },

    /// An operator flipped an action's status away from `run` while its
    /// worker was still live.
    #[error("action {action_id} was externally aborted")]
    ExternalAbort { action_id: i64 },

    /// An unhandled error occurred in the scheduler's main loop; the daemon
    /// must shut down cleanly and propagate this.
    #[error("fatal scheduler loop error: {0}")]
    FatalLoop(String),

    /// A boundary adapter (registry backend, inventory store, process spawn)
    /// failed; `context` names the operation that was attempted.
    #[error("{context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl DynamoError {
    /// Wrap an arbitrary backend error with context describing the failed
    /// operation, for errors that cross an adapter boundary (§4.10).
    pub fn backend(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DynamoError::Backend {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// True for errors that the scheduler recovers from by failing the
    /// current action and continuing to poll, rather than shutting down.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DynamoError::AuthorizationFailure { .. }
                | DynamoError::WorkerCrash { .. }
                | DynamoError::ChannelTimeout { .. }
                | DynamoError::ExternalAbort { .. }
                | DynamoError::Object(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DynamoError>;
