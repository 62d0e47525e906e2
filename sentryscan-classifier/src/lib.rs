//! sentryscan-classifier: the Classifier Driver external interface — a
//! deterministic offline reference oracle implementing
//! `sentryscan_core::classifier::ClassifierDriver`, plus the
//! model-revision/config plumbing and rate-limited batching gate the
//! trait's contract requires but doesn't dictate an implementation for.

pub mod config;
pub mod errors;
pub mod gate;
pub mod oracle;
pub mod telemetry;

pub use config::ClassifierConfig;
pub use oracle::ReferenceOracle;
