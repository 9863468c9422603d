//! Error types for the coalescing evaluator
//!
//! Everything here is a caller or bookkeeping error. Evaluation outcomes are
//! reported separately as [`crate::EvaluationFailure`].

use frag_cache::CacheConfigError;
use frag_canon::CanonError;
use frag_ir::{Fingerprint, IrError};
use std::path::PathBuf;

/// Errors raised by [`crate::Coalescer`]
#[derive(Debug, thiserror::Error)]
pub enum CoalesceError {
    /// The submitted test violates the operation model
    #[error("invalid test: {0}")]
    Ir(#[from] IrError),

    /// A canonicalization invariant failed
    #[error("canonicalization failed: {0}")]
    Canon(#[from] CanonError),

    /// A fragment was registered in flight twice
    #[error("fragment {0} registered in flight twice")]
    DoubleRegistration(Fingerprint),

    /// A completed fragment had no in-flight entry
    #[error("fragment {0} completed without an in-flight entry")]
    MissingInFlight(Fingerprint),

    /// Rejected configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CoalesceError {
    /// Internal bookkeeping violation (as opposed to bad input)
    #[inline]
    #[must_use]
    pub fn is_bookkeeping(&self) -> bool {
        matches!(
            self,
            Self::DoubleRegistration(_) | Self::MissingInFlight(_) | Self::Canon(_)
        )
    }
}

/// Errors loading or validating a [`crate::CoalescerConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Cache parameters are unusable
    #[error(transparent)]
    Cache(#[from] CacheConfigError),

    /// The pipeline must run at least one round
    #[error("max_pipeline_rounds must be at least 1")]
    ZeroRounds,

    /// Malformed TOML
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Create I/O error
    #[inline]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
