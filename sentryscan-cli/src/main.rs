//! `sentryscan`: command-line front end over [`sentryscan_core::scan_path`].
//!
//! ```text
//! sentryscan scan <path> [--threshold F] [--extensions EXT,...]
//!                        [--format {tree,json}] [--save FILE] [--quiet]
//! sentryscan pypi <name> [<version>] [--folder DIR] [--format ...]
//!                        [--threshold F] [--save FILE]
//! ```
//!
//! Exit codes: `0` clean, `1` malicious verdict, `2` usage or I/O error.
//! `yaml`/`markdown` report formats and the `pypi` package-fetching mode are
//! parseable for CLI-surface compatibility but are not implemented; both
//! fail with exit code 2.

use clap::{Parser, Subcommand, ValueEnum};
use sentryscan_classifier::{ClassifierConfig, ReferenceOracle};
use sentryscan_core::classifier::ClassifierDriver;
use sentryscan_core::report::{Report, Verdict};
use sentryscan_core::ScanConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Composes the classifier's library-scoped layer with a root fmt layer for
/// everything else this binary logs, filtered by `RUST_LOG` (default
/// `info`).
fn init_tracing() {
    let filter = sentryscan_classifier::telemetry::env_filter_with_level("info", Level::INFO);
    tracing_subscriber::registry()
        .with(sentryscan_classifier::telemetry::layer())
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[derive(Parser)]
#[command(name = "sentryscan", version, about = "Offline malware scanner for Python/JavaScript packages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a local file or directory tree.
    Scan(ScanArgs),
    /// Fetch a package from PyPI and scan it (not implemented).
    Pypi(PypiArgs),
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq)]
enum ReportFormat {
    Tree,
    Json,
    Yaml,
    Markdown,
}

#[derive(clap::Args)]
struct ScanArgs {
    /// File or directory to scan.
    path: PathBuf,

    /// Malicious/benign decision boundary in [0,1].
    #[arg(long)]
    threshold: Option<f64>,

    /// Comma-separated extension allow-list (e.g. "py,js"); defaults to
    /// every extension the compiler supports.
    #[arg(long, value_delimiter = ',')]
    extensions: Option<Vec<String>>,

    /// Report rendering.
    #[arg(long, value_enum, default_value = "tree")]
    format: ReportFormat,

    /// Write the rendered report to a file instead of stdout.
    #[arg(long)]
    save: Option<PathBuf>,

    /// Suppress the tree/json rendering, only set the exit code.
    #[arg(long)]
    quiet: bool,
}

#[derive(clap::Args)]
struct PypiArgs {
    /// Package name.
    name: String,

    /// Package version; defaults to the latest release.
    version: Option<String>,

    /// Directory to unpack the downloaded archive into.
    #[arg(long)]
    folder: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "tree")]
    format: ReportFormat,

    #[arg(long)]
    threshold: Option<f64>,

    #[arg(long)]
    save: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Scan(args) => run_scan(args).await,
        Commands::Pypi(args) => run_pypi(args),
    }
}

async fn run_scan(args: ScanArgs) -> ExitCode {
    let mut config = ScanConfig::default();
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(extensions) = args.extensions {
        config.extensions = Some(extensions);
    }
    if let Err(err) = config.validate() {
        eprintln!("error: {err}");
        return ExitCode::from(2);
    }
    if matches!(args.format, ReportFormat::Yaml | ReportFormat::Markdown) {
        eprintln!("error: {} report rendering is not implemented", args.format.to_label());
        return ExitCode::from(2);
    }

    let classifier: Arc<dyn ClassifierDriver> = match ReferenceOracle::new(&ClassifierConfig::default()) {
        Ok(oracle) => Arc::new(oracle),
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    };

    let report = match sentryscan_core::scan_path(&args.path, &config, classifier).await {
        Ok(report) => report,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    };

    if !args.quiet {
        if let Err(err) = render(&report, args.format, args.save.as_deref()) {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    }

    exit_code_for(report.verdict)
}

fn run_pypi(_args: PypiArgs) -> ExitCode {
    eprintln!(
        "error: the pypi subcommand (package fetching and unpacking) is not implemented; \
         run `sentryscan scan <folder>` against an already-unpacked package instead"
    );
    ExitCode::from(2)
}

fn exit_code_for(verdict: Verdict) -> ExitCode {
    match verdict {
        Verdict::Clean => ExitCode::from(0),
        Verdict::Malicious => ExitCode::from(1),
        Verdict::Inconclusive => ExitCode::from(2),
    }
}

fn render(report: &Report, format: ReportFormat, save: Option<&std::path::Path>) -> anyhow::Result<()> {
    let rendered = match format {
        ReportFormat::Tree => render_tree(report),
        ReportFormat::Json => serde_json::to_string_pretty(report)?,
        ReportFormat::Yaml | ReportFormat::Markdown => unreachable!("rejected before render"),
    };
    match save {
        Some(path) => std::fs::write(path, rendered)?,
        None => println!("{rendered}"),
    }
    Ok(())
}

/// A minimal boundary-level tree print: scan summary, then one line per
/// file with its findings indented underneath.
fn render_tree(report: &Report) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", report.input_path, verdict_label(report.verdict));
    let _ = writeln!(
        out,
        "  files: {} scanned, {} skipped, {} objects, confidence {:.2}",
        report.processed_file_count,
        report.skipped_files.len(),
        report.object_count,
        report.confidence
    );
    if !report.activities.is_empty() {
        let activities: Vec<String> = report.activities.iter().map(|c| format!("{c:?}")).collect();
        let _ = writeln!(out, "  activities: {}", activities.join(", "));
    }

    let mut by_file: std::collections::BTreeMap<&str, Vec<&sentryscan_core::report::Finding>> =
        std::collections::BTreeMap::new();
    for finding in &report.findings {
        by_file.entry(finding.file.as_str()).or_default().push(finding);
    }
    for (file, findings) in by_file {
        let _ = writeln!(out, "  {file}");
        for finding in findings {
            let _ = writeln!(out, "    - {} (score {:.2}) [{}]", finding.name, finding.score, finding.hash);
        }
    }
    if !report.warnings.is_empty() {
        let _ = writeln!(out, "  warnings: {}", report.warnings.len());
    }
    out.trim_end().to_string()
}

fn verdict_label(v: Verdict) -> &'static str {
    match v {
        Verdict::Clean => "clean",
        Verdict::Malicious => "malicious",
        Verdict::Inconclusive => "inconclusive",
    }
}

impl ReportFormat {
    fn to_label(self) -> &'static str {
        match self {
            ReportFormat::Tree => "tree",
            ReportFormat::Json => "json",
            ReportFormat::Yaml => "yaml",
            ReportFormat::Markdown => "markdown",
        }
    }
}
