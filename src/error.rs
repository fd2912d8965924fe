//! Normalized error types for the shard routing pipeline.
//!
//! Every sqlx/io error surfaced by the crate is mapped onto these variants so
//! callers get a consistent taxonomy: routing-database failures abort a
//! statement, pool exhaustion is retryable, and extraction/merge anomalies
//! never show up here at all (they degrade the condition set locally).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for routing, pooling and shard execution.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum RouteError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Routing database error: {message}")]
    RoutingConnection { message: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("No free connection slot for {host}:{port}")]
    PoolExhausted { host: String, port: u16 },

    #[error("Shard {host}:{port} execution failed: {message}")]
    ShardExecution {
        host: String,
        port: u16,
        message: String,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RouteError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config { message: msg.into() }
    }

    pub fn routing(msg: impl Into<String>) -> Self {
        Self::RoutingConnection { message: msg.into() }
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn pool_exhausted(host: impl Into<String>, port: u16) -> Self {
        Self::PoolExhausted { host: host.into(), port }
    }

    pub fn shard_execution(host: impl Into<String>, port: u16, msg: impl Into<String>) -> Self {
        Self::ShardExecution {
            host: host.into(),
            port,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    /// Whether the caller may retry the statement as-is (after backoff or a
    /// pool healing pass) without changing anything else.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }
}

/// Result type alias for routing operations.
pub type RouteResult<T> = Result<T, RouteError>;
