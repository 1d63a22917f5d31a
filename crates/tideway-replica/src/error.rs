//! Error types for the replication engine.
//!
//! Steady-state protocol events that look like failures (inadmissible
//! intervals, unreachable notify targets, lost peers) are deliberately
//! not errors: anti-entropy is self-healing and those paths drop
//! silently. Only startup misconfiguration and dead-replica interactions
//! surface to callers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplicaError {
    /// A required configuration entry was not supplied at start.
    #[error("missing required configuration: {0}")]
    ConfigMissing(&'static str),

    /// The client-supplied read timeout elapsed.
    #[error("read timed out")]
    ReadTimeout,

    /// The replica task is no longer running.
    #[error("replica stopped")]
    Stopped,
}
