//! Scan-wide configuration: a plain value type passed into [`crate::scan`],
//! never global state. Defaults are resolved at construction time and
//! validated eagerly rather than failing lazily mid-scan.

use crate::compile::DEFAULT_RECURSION_LIMIT;
use crate::errors::{Error, Result};
use crate::report::DEFAULT_MALICIOUS_THRESHOLD;
use crate::value::DEFAULT_SHORT_LITERAL_THRESHOLD;
use std::time::Duration;

/// Per-file and scan-wide limits.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Malicious/benign decision boundary.
    pub threshold: f64,
    /// File extensions to accept; `None` accepts every extension the
    /// compiler supports.
    pub extensions: Option<Vec<String>>,
    /// Strings shorter than this many characters are emitted verbatim
    /// rather than size-bucketed.
    pub short_literal_threshold: usize,
    /// Bound on recursive descent into one file's AST.
    pub recursion_limit: usize,
    /// Wall-clock budget for a single file's compile+score pipeline before
    /// it is abandoned and recorded as skipped.
    pub per_file_timeout: Duration,
    /// Optional wall-clock budget for the whole scan; once exceeded, no
    /// further files are scheduled and everything still queued is recorded
    /// as skipped.
    pub deadline: Option<Duration>,
    /// Upper bound on concurrently in-flight files.
    pub max_concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MALICIOUS_THRESHOLD,
            extensions: None,
            short_literal_threshold: DEFAULT_SHORT_LITERAL_THRESHOLD,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            per_file_timeout: Duration::from_secs(10),
            deadline: None,
            max_concurrency: 8,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::ConfigInvalid(format!(
                "threshold must be within [0,1], got {}",
                self.threshold
            )));
        }
        if self.recursion_limit == 0 {
            return Err(Error::ConfigInvalid("recursion_limit must be nonzero".to_string()));
        }
        if self.short_literal_threshold == 0 {
            return Err(Error::ConfigInvalid("short_literal_threshold must be nonzero".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(Error::ConfigInvalid("max_concurrency must be nonzero".to_string()));
        }
        if self.per_file_timeout.is_zero() {
            return Err(Error::ConfigInvalid("per_file_timeout must be nonzero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        ScanConfig::default().validate().unwrap();
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let cfg = ScanConfig { threshold: 1.5, ..ScanConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_recursion_limit_is_rejected() {
        let cfg = ScanConfig { recursion_limit: 0, ..ScanConfig::default() };
        assert!(cfg.validate().is_err());
    }
}
