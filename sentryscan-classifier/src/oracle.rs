//! A deterministic offline reference oracle implementing
//! `sentryscan_core::classifier::ClassifierDriver`. Downloading and
//! running a real pre-trained model is out of scope here; this stands in
//! for it so the rest of the pipeline has something to score against
//! offline. It never touches the network or the model cache directory;
//! `ClassifierConfig::model_cache_dir` is kept only so a future real
//! driver can slot in without changing this trait.

use crate::config::ClassifierConfig;
use crate::gate::RateLimitedGate;
use sentryscan_core::classifier::ClassifierDriver;
use sentryscan_core::errors::Result;
use sentryscan_core::object::ScanObject;
use sentryscan_core::types::Category;
use std::collections::HashSet;
use tracing::debug;

/// Per-category weight added to a Scan Object's score when that category
/// appears anywhere in its instruction stream. Weights are deliberately
/// skewed toward the categories most reliably associated with
/// high-signal behavior: process management and dynamic code execution.
const ACTIVITY_WEIGHTS: &[(Category, f64)] = &[
    (Category::DynamicCodeExecution, 0.60),
    (Category::ProcessManagement, 0.55),
    (Category::PackageInstallationExecution, 0.50),
    (Category::Deserialization, 0.45),
    (Category::FsLinking, 0.30),
    (Category::ArchiveCompression, 0.25),
    (Category::NetworkHttpRequest, 0.25),
    (Category::FilesystemAccess, 0.20),
    (Category::SystemInteraction, 0.15),
];

/// Structure-category weights: obfuscation/transport signals that raise
/// suspicion independent of which function they're passed to.
const SIGNAL_WEIGHTS: &[(Category, f64)] = &[
    (Category::StringBash, 0.20),
    (Category::StringBase64, 0.10),
    (Category::StringUrlInsecure, 0.10),
    (Category::StringHex, 0.05),
    (Category::StringSql, 0.10),
];

/// Bare keyword/identifier tokens that, taken together with an activity
/// category, are classic danger combinations this oracle can still see
/// even though boolean literals themselves project to a `boolean` token
/// regardless of value (e.g. `subprocess.run(..., shell=True)`).
const SUSPICIOUS_KEYWORDS: &[&str] = &["shell", "eval", "exec"];

const BASE_SCORE: f64 = 0.02;

pub struct ReferenceOracle {
    model_revision: String,
    gate: RateLimitedGate,
}

impl ReferenceOracle {
    pub fn new(config: &ClassifierConfig) -> sentryscan_core::errors::Result<Self> {
        config.validate().map_err(Into::into)?;
        Ok(Self {
            model_revision: config.model_revision.clone(),
            gate: RateLimitedGate::new(config.batch_window),
        })
    }
}

impl ClassifierDriver for ReferenceOracle {
    fn score(&self, objects: &mut [ScanObject]) -> Result<()> {
        self.gate.acquire();
        for object in objects.iter_mut() {
            let score = score_object(object);
            let subwords = subword_token_count(object);
            debug!(name = %object.name, score, subwords, "scored object");
            object.set_score(score);
            object.set_subword_token_count(subwords);
        }
        Ok(())
    }

    fn model_revision(&self) -> &str {
        &self.model_revision
    }
}

fn score_object(object: &ScanObject) -> f64 {
    let categories: HashSet<Category> = object.categories().collect();
    let mut score = BASE_SCORE;
    for (category, weight) in ACTIVITY_WEIGHTS {
        if categories.contains(category) {
            score += weight;
        }
    }
    for (category, weight) in SIGNAL_WEIGHTS {
        if categories.contains(category) {
            score += weight;
        }
    }
    if object.tokens().iter().any(|t| SUSPICIOUS_KEYWORDS.contains(&t.as_str())) {
        score += 0.15;
    }
    score.min(1.0)
}

/// Approximates subword tokenization by splitting each projected token
/// into ~4-character chunks, the rough granularity a BPE-style tokenizer
/// produces for identifier-like text.
fn subword_token_count(object: &ScanObject) -> usize {
    object.tokens().iter().map(|t| t.chars().count().max(1).div_ceil(4)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentryscan_core::compile;
    use sentryscan_core::object;
    use sentryscan_core::types::Arena;

    fn score_source(code: &str) -> Vec<f64> {
        let mut arena = Arena::new();
        compile::python::compile_module(&mut arena, "t.py", code, 15, 256).unwrap();
        let mut objects = object::assemble(arena.into_vec(), 15, code);
        let oracle = ReferenceOracle::new(&ClassifierConfig::default()).unwrap();
        oracle.score(&mut objects).unwrap();
        objects.iter().map(|o| o.score().unwrap()).collect()
    }

    #[test]
    fn plain_assignment_scores_low() {
        let scores = score_source("x = 5\n");
        assert!(scores.iter().all(|s| *s < 0.3));
    }

    #[test]
    fn shell_true_subprocess_call_crosses_default_threshold() {
        let scores = score_source("def f():\n    subprocess.run(\"ls\", shell=True)\n");
        assert!(scores.iter().any(|s| *s >= 0.7), "scores: {scores:?}");
    }

    #[test]
    fn os_system_with_destructive_command_crosses_default_threshold() {
        let scores = score_source("import os\nos.system('rm -rf /')\n");
        assert!(scores.iter().any(|s| *s >= 0.7), "scores: {scores:?}");
    }

    #[test]
    fn model_revision_is_exposed() {
        let oracle = ReferenceOracle::new(&ClassifierConfig::default()).unwrap();
        assert_eq!(oracle.model_revision(), crate::config::DEFAULT_MODEL_REVISION);
    }
}
