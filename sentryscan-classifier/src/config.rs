//! `ClassifierConfig`: resolves a model cache directory and revision
//! strictly from environment, validated eagerly, never touched again once
//! constructed.

use crate::errors::{ClassifierError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// The single environment variable the driver consults for a local model
/// cache; when unset, the driver downloads a version-pinned model
/// revision.
pub const MODEL_CACHE_ENV: &str = "SENTRYSCAN_MODEL_CACHE";

/// Short revision hash folded into `Report.version` as
/// `<software-version>+<model-revision-short-hash>`. This crate ships a
/// deterministic offline reference oracle rather than downloading a real
/// model artifact, so the revision names that oracle, not a download.
pub const DEFAULT_MODEL_REVISION: &str = "offline-ref-a1b2c3d";

/// Requests are serialized through a gate no busier than once per this
/// interval.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub model_cache_dir: PathBuf,
    pub model_revision: String,
    pub batch_window: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_cache_dir: resolve_model_cache_dir(),
            model_revision: DEFAULT_MODEL_REVISION.to_string(),
            batch_window: DEFAULT_BATCH_WINDOW,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model_revision.trim().is_empty() {
            return Err(ClassifierError::InvalidConfig("model_revision must not be empty".to_string()));
        }
        if self.batch_window.is_zero() {
            return Err(ClassifierError::InvalidConfig("batch_window must be nonzero".to_string()));
        }
        Ok(())
    }
}

fn resolve_model_cache_dir() -> PathBuf {
    std::env::var(MODEL_CACHE_ENV).map(PathBuf::from).unwrap_or_else(|_| default_cache_dir())
}

fn default_cache_dir() -> PathBuf {
    let base = std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".cache")))
        .unwrap_or_else(|_| PathBuf::from(".cache"));
    base.join("sentryscan").join(DEFAULT_MODEL_REVISION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        ClassifierConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_revision_is_rejected() {
        let cfg = ClassifierConfig { model_revision: String::new(), ..ClassifierConfig::default() };
        assert!(cfg.validate().is_err());
    }
}
