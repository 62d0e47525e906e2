//! Scan orchestration: walks an input path, compiles and scores every file
//! through a bounded worker pool, and assembles the final [`Report`].
//! Concurrency uses a `tokio::sync::Semaphore` bounding in-flight files,
//! each file's work running inside `spawn_blocking` with its permit
//! released before the join handle is awaited, so a slot frees as soon as
//! the blocking work finishes.

use crate::classifier::ClassifierDriver;
use crate::compile;
use crate::config::ScanConfig;
use crate::errors::{Error, Result, Warning};
use crate::object::{self, ScanObject};
use crate::report::{self, Report, ScanMeta, ScoredObject};
use crate::types::Language;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

/// Vendored dependency and virtualenv directories, never worth walking into.
const DIR_EXCLUDES: &[&str] = &["/.git/", "/node_modules/", "/.venv/", "/venv/", "/__pycache__/"];

struct CompiledFile {
    objects: Vec<ScanObject>,
    warnings: Vec<Warning>,
}

enum TaskOutcome {
    Ok,
    Warning(Warning),
    Fatal(Error),
}

/// Scans one file or directory tree and returns the aggregated [`Report`].
#[instrument(skip(config, classifier), fields(path = %root.display()))]
pub async fn scan_path(
    root: &Path,
    config: &ScanConfig,
    classifier: Arc<dyn ClassifierDriver>,
) -> Result<Report> {
    config.validate()?;
    let started = Instant::now();
    let start_time = chrono::Utc::now().to_rfc3339();

    let (candidates, mut skipped) = discover(root, config);
    let candidate_paths: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();

    let sem = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let collector: Arc<Mutex<Vec<CompiledFile>>> = Arc::new(Mutex::new(Vec::new()));
    let mut warnings: Vec<Warning> = Vec::new();
    let mut tasks = Vec::with_capacity(candidates.len());

    for path in candidates {
        if let Some(deadline) = config.deadline {
            if started.elapsed() >= deadline {
                warn!(path = %path.display(), "scan deadline exceeded, skipping remaining files");
                skipped.push(path);
                continue;
            }
        }

        let permit = sem.clone().acquire_owned().await.expect("semaphore is never closed");
        let classifier = classifier.clone();
        let collector = collector.clone();
        let short_literal_threshold = config.short_literal_threshold;
        let recursion_limit = config.recursion_limit;
        let path_display = path.display().to_string();

        let task_path_display = path_display.clone();
        tasks.push((task_path_display, tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || {
                compile_and_score(&path, short_literal_threshold, recursion_limit, classifier.as_ref())
            })
            .await;
            drop(permit);
            match outcome {
                Ok(Ok(compiled)) => {
                    collector.lock().expect("collector mutex poisoned").push(compiled);
                    TaskOutcome::Ok
                }
                // Classifier unavailability is fatal to the whole scan;
                // every other recoverable kind becomes a per-file warning.
                Ok(Err(err @ Error::ClassifierUnavailable(_))) => TaskOutcome::Fatal(err),
                Ok(Err(err)) => TaskOutcome::Warning(Warning::parse_error(format!("{path_display}: {err}"))),
                Err(join_err) => {
                    TaskOutcome::Warning(Warning::parse_error(format!("{path_display}: worker panicked: {join_err}")))
                }
            }
        })));
    }

    let mut fatal: Option<Error> = None;
    for (task_path, task) in tasks {
        let remaining_budget = config
            .deadline
            .map(|d| d.saturating_sub(started.elapsed()).max(Duration::from_millis(1)))
            .unwrap_or(Duration::MAX);
        let bound = config.per_file_timeout.min(remaining_budget);
        match tokio::time::timeout(bound, task).await {
            Ok(Ok(TaskOutcome::Ok)) => {}
            Ok(Ok(TaskOutcome::Warning(w))) => warnings.push(w),
            Ok(Ok(TaskOutcome::Fatal(err))) => {
                fatal.get_or_insert(err);
            }
            Ok(Err(join_err)) => warnings.push(Warning::parse_error(format!("worker join failed: {join_err}"))),
            Err(_) => {
                skipped.push(PathBuf::from(&task_path));
                warnings.push(Warning::truncation(format!("{task_path}: abandoned, exceeded per-file timeout")));
            }
        };
    }
    if let Some(err) = fatal {
        return Err(err);
    }

    let compiled = Arc::try_unwrap(collector)
        .map_err(|_| ())
        .expect("every spawned task has joined by now")
        .into_inner()
        .expect("collector mutex poisoned");
    let processed_file_count = compiled.len();

    let mut all_objects: Vec<ScanObject> = Vec::new();
    for file in compiled {
        warnings.extend(file.warnings);
        all_objects.extend(file.objects);
    }

    let scored: Vec<ScoredObject> = all_objects
        .iter()
        .map(|object| ScoredObject {
            object,
            categories: object.categories().collect(),
            score: object.score().unwrap_or(0.0),
        })
        .collect();

    let skipped_paths: Vec<String> = skipped.iter().map(|p| p.display().to_string()).collect();
    // `candidate_paths` already carries every path that was ever scheduled,
    // including those later abandoned to the deadline or per-file timeout;
    // only discover()'s own up-front skips (excluded dir, unsupported
    // extension) are new names here.
    let already_listed: std::collections::HashSet<&str> = candidate_paths.iter().map(String::as_str).collect();
    let all_files: Vec<String> = candidate_paths
        .iter()
        .cloned()
        .chain(skipped_paths.iter().filter(|p| !already_listed.contains(p.as_str())).cloned())
        .collect();

    let meta = ScanMeta {
        input_path: root.display().to_string(),
        start_time,
        elapsed_seconds: started.elapsed().as_secs_f64(),
        files: all_files,
        skipped_files: skipped_paths,
        processed_file_count,
    };

    let report = report::aggregate(&scored, config.threshold, classifier.model_revision(), meta, warnings);
    info!(
        verdict = ?report.verdict,
        confidence = report.confidence,
        objects = report.object_count,
        "scan complete"
    );
    Ok(report)
}

/// Walks `root` (a single file is its own one-entry tree) and partitions
/// every discovered path into accepted candidates and everything skipped
/// up front (excluded directory, unsupported or disallowed extension).
fn discover(root: &Path, config: &ScanConfig) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let entries: Vec<PathBuf> = if root.is_file() {
        vec![root.to_path_buf()]
    } else {
        WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    };

    let mut candidates = Vec::new();
    let mut skipped = Vec::new();
    for path in entries {
        let path_str = path.to_string_lossy();
        if DIR_EXCLUDES.iter().any(|pat| path_str.contains(pat)) {
            skipped.push(path);
            continue;
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
        let accepted = match &config.extensions {
            Some(allow) => allow.iter().any(|a| a.eq_ignore_ascii_case(&ext)),
            None => Language::from_extension(&ext).is_some(),
        };
        if accepted {
            candidates.push(path);
        } else {
            skipped.push(path);
        }
    }
    (candidates, skipped)
}

/// Runs the full per-file pipeline: parse, compile, assemble, score. Always
/// called from inside `spawn_blocking` — tree-sitter parsing and classifier
/// scoring are both synchronous.
fn compile_and_score(
    path: &Path,
    short_literal_threshold: usize,
    recursion_limit: usize,
    classifier: &dyn ClassifierDriver,
) -> Result<CompiledFile> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let language =
        Language::from_extension(ext).ok_or_else(|| Error::UnsupportedExtension(ext.to_string()))?;
    let source = std::fs::read_to_string(path)?;
    let file = path.display().to_string();

    let code_objects = compile::compile_file(&file, &source, language, short_literal_threshold, recursion_limit)?;
    let warnings: Vec<Warning> = code_objects.iter().flat_map(|o| o.warnings.clone()).collect();

    let mut scan_objects = object::assemble(code_objects, short_literal_threshold, &source);
    classifier.score(&mut scan_objects)?;

    Ok(CompiledFile { objects: scan_objects, warnings })
}
