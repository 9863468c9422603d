//! Coalescer configuration
//!
//! Loaded from TOML or built with `with_*` methods. Every field has a
//! default, so a partial file is fine:
//!
//! ```toml
//! enabled = true
//! observer_merging = true
//!
//! [cache]
//! capacity = 4096
//! initial_score = 8
//! ```

use crate::error::ConfigError;
use frag_cache::CacheConfig;
use frag_canon::DEFAULT_MAX_ROUNDS;
use frag_split::SplitOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration of a [`crate::Coalescer`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoalescerConfig {
    /// Split, canonicalize and deduplicate; when off every test is submitted verbatim
    pub enabled: bool,
    /// Merge repeated read-only calls while splitting
    pub observer_merging: bool,
    /// Fragment cache sizing
    pub cache: CacheConfig,
    /// Bound on canonicalization rounds
    pub max_pipeline_rounds: usize,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            observer_merging: false,
            cache: CacheConfig::default(),
            max_pipeline_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl CoalescerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With coalescing on or off
    #[inline]
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// With observer merging
    #[inline]
    #[must_use]
    pub fn with_observer_merging(mut self, enabled: bool) -> Self {
        self.observer_merging = enabled;
        self
    }

    /// With cache configuration
    #[inline]
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// With pipeline round bound
    #[inline]
    #[must_use]
    pub fn with_max_pipeline_rounds(mut self, rounds: usize) -> Self {
        self.max_pipeline_rounds = rounds;
        self
    }

    /// Splitter options implied by this configuration
    #[inline]
    #[must_use]
    pub fn split_options(&self) -> SplitOptions {
        SplitOptions::new().with_observer_merging(self.observer_merging)
    }

    /// Check the configuration
    ///
    /// # Errors
    /// [`ConfigError`] for a zero round bound or an unusable cache
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pipeline_rounds == 0 {
            return Err(ConfigError::ZeroRounds);
        }
        self.cache.validate()?;
        Ok(())
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// [`ConfigError::Parse`] or any validation error
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`CoalescerConfig::from_toml_str`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::from_toml_str(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        CoalescerConfig::new().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = CoalescerConfig::from_toml_str(
            r#"
            observer_merging = true

            [cache]
            capacity = 32
            "#,
        )
        .unwrap();
        assert!(config.enabled);
        assert!(config.observer_merging);
        assert_eq!(config.cache.capacity, 32);
        assert_eq!(config.cache.initial_score, CacheConfig::default().initial_score);
        assert_eq!(config.max_pipeline_rounds, DEFAULT_MAX_ROUNDS);
    }

    #[test]
    fn zero_capacity_rejected() {
        let err = CoalescerConfig::from_toml_str("[cache]\ncapacity = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Cache(_)));
    }

    #[test]
    fn zero_rounds_rejected() {
        let err = CoalescerConfig::new()
            .with_max_pipeline_rounds(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroRounds));
    }

    #[test]
    fn malformed_toml_rejected() {
        let err = CoalescerConfig::from_toml_str("enabled = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "enabled = false\nmax_pipeline_rounds = 3").unwrap();
        let config = CoalescerConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config,
            CoalescerConfig::new()
                .with_enabled(false)
                .with_max_pipeline_rounds(3)
        );
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = CoalescerConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = CoalescerConfig::new()
            .with_observer_merging(true)
            .with_cache(CacheConfig::new().with_capacity(7));
        let text = toml::to_string(&config).unwrap();
        assert_eq!(CoalescerConfig::from_toml_str(&text).unwrap(), config);
    }
}
