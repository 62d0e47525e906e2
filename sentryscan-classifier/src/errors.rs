//! Closed error taxonomy for classifier configuration, with a
//! per-crate-prefixed message on every variant.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClassifierError>;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("[sentryscan-classifier] invalid config: {0}")]
    InvalidConfig(String),

    #[error("[sentryscan-classifier] model cache directory unavailable: {0}")]
    CacheUnavailable(String),
}

impl From<ClassifierError> for sentryscan_core::errors::Error {
    /// A classifier configuration or cache failure is fatal to a scan;
    /// this is the only seam where this crate's errors cross into
    /// `sentryscan-core`'s taxonomy.
    fn from(err: ClassifierError) -> Self {
        sentryscan_core::errors::Error::ClassifierUnavailable(err.to_string())
    }
}
