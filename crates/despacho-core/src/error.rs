// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the despacho dispatcher.

use thiserror::Error;

/// The primary error type used across all despacho adapter traits and core operations.
///
/// Recoverable dispatch outcomes (a raced claim, an unknown driver id, a sync
/// already in progress) are ordinary return values, not errors; this enum is
/// for failures of the surrounding machinery.
#[derive(Debug, Error)]
pub enum DespachoError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// KV store errors (connection, command failure, serialization of stored records).
    #[error("kv error: {message}")]
    Kv {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Relational store errors (driver/route repository queries).
    #[error("database error: {source}")]
    Database {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Chat transport errors (webhook decode, outbound delivery).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Assignment export writeback failed (best-effort path).
    #[error("export error: {0}")]
    Export(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DespachoError {
    /// Shorthand for a KV error wrapping an underlying driver error.
    pub fn kv(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Kv {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Shorthand for a KV error with no underlying source (bad stored data).
    pub fn kv_msg(message: impl Into<String>) -> Self {
        Self::Kv {
            message: message.into(),
            source: None,
        }
    }

    /// Whether a retry at a higher level is worthwhile.
    ///
    /// KV, channel, and export failures are transient: the sweeper and the
    /// store's TTLs reconverge state, and the driver can resend. Config and
    /// internal errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Kv { .. } | Self::Channel { .. } | Self::Export(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(DespachoError::kv_msg("timeout").is_transient());
        assert!(
            DespachoError::Channel {
                message: "send failed".into(),
                source: None,
            }
            .is_transient()
        );
        assert!(DespachoError::Export("writeback failed".into()).is_transient());
        assert!(!DespachoError::Config("missing token".into()).is_transient());
        assert!(!DespachoError::Internal("bug".into()).is_transient());
    }

    #[test]
    fn kv_helper_carries_source() {
        let err = DespachoError::kv("GET failed", std::io::Error::other("boom"));
        match err {
            DespachoError::Kv { message, source } => {
                assert_eq!(message, "GET failed");
                assert!(source.is_some());
            }
            other => panic!("expected Kv, got {other:?}"),
        }
    }
}
