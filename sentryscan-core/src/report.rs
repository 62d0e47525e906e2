//! Report Aggregator: folds per-object classifier scores into one
//! scan-level verdict.

use crate::category::CATEGORY_TABLE_VERSION;
use crate::errors::Warning;
use crate::object::ScanObject;
use crate::types::Category;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Default malicious/benign decision boundary.
pub const DEFAULT_MALICIOUS_THRESHOLD: f64 = 0.7;

/// The verdict field is one of `malicious`, `clean`, `inconclusive`.
/// `Inconclusive` is reserved for a classifier that could not be reached
/// at all; `aggregate` itself never produces it, since a fatal classifier
/// error aborts the scan before aggregation runs (see `scan::scan_path`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Clean,
    Malicious,
    Inconclusive,
}

/// One object that crossed the malicious threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub file: String,
    pub name: String,
    pub hash: String,
    pub location: Option<(u32, u32)>,
    pub score: f64,
}

/// A scored Scan Object, trimmed to the fields a report can serialize.
/// The full report carries every Scan Object, not just findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub file: String,
    pub name: String,
    pub hash: String,
    pub depth: u32,
    pub location: Option<(u32, u32)>,
    pub score: Option<f64>,
    pub subword_token_count: Option<usize>,
    pub excerpt: Option<String>,
}

impl From<&ScanObject> for ObjectSummary {
    fn from(o: &ScanObject) -> Self {
        ObjectSummary {
            file: o.file.clone(),
            name: o.name.clone(),
            hash: o.hash.clone(),
            depth: o.depth,
            location: o.location,
            score: o.score(),
            subword_token_count: o.subword_token_count(),
            excerpt: o.excerpt.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Category-table version plus classifier model revision, so a report
    /// is always interpretable against the exact mapping that produced it.
    pub version: String,
    /// The path originally passed to the scan entry point.
    pub input_path: String,
    /// RFC3339 timestamp the scan started at.
    pub start_time: String,
    pub elapsed_seconds: f64,
    /// Every file discovered under `input_path`, processed or not.
    pub files: Vec<String>,
    /// Files discovered but not processed (unsupported extension, read
    /// failure, or per-file timeout).
    pub skipped_files: Vec<String>,
    pub processed_file_count: usize,
    pub file_count: usize,
    pub object_count: usize,
    pub threshold: f64,
    pub verdict: Verdict,
    pub confidence: f64,
    pub activities: Vec<Category>,
    pub findings: Vec<Finding>,
    pub objects: Vec<ObjectSummary>,
    pub warnings: Vec<Warning>,
}

/// One scored object plus the categories appearing anywhere in its
/// instruction stream, as handed from the scan pipeline to the aggregator.
pub struct ScoredObject<'a> {
    pub object: &'a ScanObject,
    pub categories: Vec<Category>,
    pub score: f64,
}

/// Scan-level metadata the aggregator stamps onto the report but never
/// computes itself; owned by the scan orchestration entry point.
pub struct ScanMeta {
    pub input_path: String,
    pub start_time: String,
    pub elapsed_seconds: f64,
    pub files: Vec<String>,
    pub skipped_files: Vec<String>,
    pub processed_file_count: usize,
}

/// Sort key for "(file path, start line)" stable ordering: a missing
/// location sorts after any known start line within the same file.
fn location_sort_key(file: &str, location: Option<(u32, u32)>) -> (&str, u32) {
    (file, location.map_or(u32::MAX, |(start, _)| start))
}

/// Aggregates every scored object from a scan into one [`Report`].
/// Deduplicates by instruction hash, keeping the highest score seen for
/// that hash: identical code compiled from different files should not
/// inflate the verdict by recounting the same object.
pub fn aggregate(
    scored: &[ScoredObject],
    threshold: f64,
    model_revision: &str,
    meta: ScanMeta,
    warnings: Vec<Warning>,
) -> Report {
    let mut best: HashMap<&str, (&ScoredObject, f64)> = HashMap::new();
    for s in scored {
        best.entry(s.object.hash.as_str())
            .and_modify(|existing| {
                if s.score > existing.1 {
                    *existing = (s, s.score);
                }
            })
            .or_insert((s, s.score));
    }

    let mut activities: BTreeSet<Category> = BTreeSet::new();
    let mut findings = Vec::new();
    let mut max_malicious: f64 = f64::MIN;
    let mut min_benign: Option<f64> = None;
    for (s, score) in best.values() {
        if *score >= threshold {
            max_malicious = max_malicious.max(*score);
            for cat in &s.categories {
                if cat.is_activity() {
                    activities.insert(*cat);
                }
            }
            findings.push(Finding {
                file: s.object.file.clone(),
                name: s.object.name.clone(),
                hash: s.object.hash.clone(),
                location: s.object.location,
                score: *score,
            });
        } else {
            min_benign = Some(min_benign.map_or(*score, |m: f64| m.min(*score)));
        }
    }
    // Spec §5: "the Aggregator sorts final outputs by (file path, start
    // line) for stable reports" — `best`'s iteration order is a `HashMap`'s
    // and therefore unstable run-to-run, so this is the only place that
    // order is fixed. Findings missing a location sort after ones with a
    // known start line, within the same file; ties break by score
    // descending so the most severe finding at a given spot leads.
    findings.sort_by(|a, b| {
        location_sort_key(&a.file, a.location)
            .cmp(&location_sort_key(&b.file, b.location))
            .then(b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
    });

    // Verdict is monotonic in the findings set: any single crossing is
    // enough, order of aggregation never un-flags a scan.
    let verdict = if findings.is_empty() { Verdict::Clean } else { Verdict::Malicious };

    // Confidence is the maximum malicious score when any object crossed
    // the threshold, otherwise one minus the lowest benign score: a scan
    // of entirely clean code is confidently clean only when its
    // least-suspicious object is itself unremarkable.
    let confidence = match verdict {
        Verdict::Malicious => max_malicious,
        _ => match min_benign {
            Some(min_benign) => 1.0 - min_benign,
            None => 1.0,
        },
    };

    let mut objects: Vec<ObjectSummary> = best.values().map(|(s, _)| ObjectSummary::from(s.object)).collect();
    objects.sort_by(|a, b| location_sort_key(&a.file, a.location).cmp(&location_sort_key(&b.file, b.location)));

    Report {
        version: format!("{CATEGORY_TABLE_VERSION}+{model_revision}"),
        input_path: meta.input_path,
        start_time: meta.start_time,
        elapsed_seconds: meta.elapsed_seconds,
        files: meta.files,
        skipped_files: meta.skipped_files,
        processed_file_count: meta.processed_file_count,
        file_count: meta.processed_file_count,
        object_count: best.len(),
        threshold,
        verdict,
        confidence,
        activities: activities.into_iter().collect(),
        findings,
        objects,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;
    use crate::object;
    use crate::types::{Arena, Category};

    fn make_objects(code: &str) -> Vec<ScanObject> {
        let mut arena = Arena::new();
        compile::python::compile_module(&mut arena, "t.py", code, 15, 256).unwrap();
        object::assemble(arena.into_vec(), 15, code)
    }

    fn meta(processed: usize) -> ScanMeta {
        ScanMeta {
            input_path: "t.py".to_string(),
            start_time: "2026-01-01T00:00:00Z".to_string(),
            elapsed_seconds: 0.01,
            files: vec!["t.py".to_string()],
            skipped_files: vec![],
            processed_file_count: processed,
        }
    }

    #[test]
    fn empty_findings_yields_benign_verdict() {
        let objects = make_objects("x = 1\n");
        let scored: Vec<ScoredObject> = objects
            .iter()
            .map(|o| ScoredObject { object: o, categories: vec![], score: 0.1 })
            .collect();
        let report = aggregate(&scored, DEFAULT_MALICIOUS_THRESHOLD, "local-v0", meta(1), vec![]);
        assert_eq!(report.verdict, Verdict::Clean);
        assert!(report.findings.is_empty());
        assert_eq!(report.confidence, 0.9);
    }

    #[test]
    fn crossing_threshold_yields_malicious_verdict_with_finding() {
        let objects = make_objects("import os\nos.system('ls')\n");
        let scored: Vec<ScoredObject> = objects
            .iter()
            .map(|o| ScoredObject {
                object: o,
                categories: vec![Category::ProcessManagement],
                score: 0.95,
            })
            .collect();
        let report = aggregate(&scored, DEFAULT_MALICIOUS_THRESHOLD, "local-v0", meta(1), vec![]);
        assert_eq!(report.verdict, Verdict::Malicious);
        assert_eq!(report.findings.len(), scored.len());
        assert!(report.activities.contains(&Category::ProcessManagement));
        assert_eq!(report.confidence, 0.95);
    }

    #[test]
    fn benign_object_categories_are_excluded_from_activities() {
        let objects = make_objects("import os\nos.system('ls')\n");
        let scored: Vec<ScoredObject> = objects
            .iter()
            .map(|o| ScoredObject {
                object: o,
                categories: vec![Category::ProcessManagement],
                score: 0.1,
            })
            .collect();
        let report = aggregate(&scored, DEFAULT_MALICIOUS_THRESHOLD, "local-v0", meta(1), vec![]);
        assert_eq!(report.verdict, Verdict::Clean);
        assert!(report.activities.is_empty());
    }

    #[test]
    fn duplicate_hash_keeps_highest_score_only() {
        let objects = make_objects("x = 1\n");
        let dup = objects[0].clone();
        let scored = vec![
            ScoredObject { object: &objects[0], categories: vec![], score: 0.2 },
            ScoredObject { object: &dup, categories: vec![], score: 0.9 },
        ];
        let report = aggregate(&scored, DEFAULT_MALICIOUS_THRESHOLD, "local-v0", meta(1), vec![]);
        assert_eq!(report.object_count, 1);
        assert_eq!(report.confidence, 0.9);
    }
}
