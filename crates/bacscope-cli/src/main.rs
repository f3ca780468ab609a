mod config;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use bacscope_core::snapshot::SnapshotContents;
use bacscope_core::{
    AnalysisError, CancellationToken, DeepDecodeError, ProgressUpdate, Report, SnapshotError,
    analyze_capture, input_info, read_snapshot, validate_snapshot, write_snapshot,
};
use clap::{Args, Parser, Subcommand};
use glob::glob;
use tracing_subscriber::prelude::*;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("BACSCOPE_BUILD_COMMIT"),
    " ",
    env!("BACSCOPE_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "bacscope")]
#[command(version = VERSION)]
#[command(
    about = "Offline analyzer for BACnet network captures.",
    long_about = None,
    after_help = "Examples:\n  bacscope capture analyse site.pcapng -o report.json\n  bacscope capture analyse site.pcapng --stdout --deep --snapshot site.bscz\n  bacscope snapshot inspect site.bscz --pretty"
)]
struct Cli {
    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// More log output (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Operations on PCAP/PCAPNG inputs.
    Capture {
        #[command(subcommand)]
        command: CaptureCommands,
    },
    /// Operations on stored analysis snapshots.
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CaptureCommands {
    /// Analyse a capture file and generate a versioned JSON report.
    #[command(alias = "analyze")]
    Analyse(AnalyseArgs),
}

#[derive(Args, Debug)]
struct AnalyseArgs {
    /// Path to a .pcap or .pcapng file (a glob matching exactly one file is accepted)
    input: PathBuf,

    /// Output report path (JSON)
    #[arg(short = 'o', long, required_unless_present = "stdout")]
    report: Option<PathBuf>,

    /// Write JSON report to stdout
    #[arg(long, conflicts_with = "report")]
    stdout: bool,

    /// Also store a compressed snapshot of the analysis
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Keep every packet in the snapshot, not only BACnet ones
    #[arg(long, requires = "snapshot")]
    all_packets: bool,

    /// Enrich BACnet frames with the external dissector
    #[arg(long)]
    deep: bool,

    /// Dissector executable used by --deep
    #[arg(long, value_name = "PATH")]
    tshark: Option<PathBuf>,

    /// YAML configuration file (default: ./bacscope.yaml when present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Subcommand, Debug)]
enum SnapshotCommands {
    /// Restore a snapshot and print its report as JSON.
    Inspect {
        file: PathBuf,

        /// Write the report to a file instead of stdout
        #[arg(short = 'o', long)]
        report: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Check that a snapshot is readable without restoring it.
    Validate { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);
    let quiet = cli.quiet;

    let result = match cli.command {
        Commands::Capture {
            command: CaptureCommands::Analyse(args),
        } => cmd_capture_analyse(args, quiet),
        Commands::Snapshot { command } => match command {
            SnapshotCommands::Inspect {
                file,
                report,
                pretty,
            } => cmd_snapshot_inspect(&file, report.as_deref(), pretty, quiet),
            SnapshotCommands::Validate { file } => cmd_snapshot_validate(&file, quiet),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

fn init_logging(quiet: bool, verbose: u8) {
    let level = if quiet {
        tracing::Level::ERROR
    } else {
        match verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .with_filter(tracing_subscriber::filter::LevelFilter::from_level(level)),
        )
        .init();
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{err:#}"), None)
    }
}

impl From<AnalysisError> for CliError {
    fn from(err: AnalysisError) -> Self {
        let hint = match &err {
            AnalysisError::Deep(DeepDecodeError::ToolUnavailable { .. }) => {
                Some("install tshark or pass its location with --tshark".to_string())
            }
            AnalysisError::Deep(DeepDecodeError::ResourceExhausted { .. }) => {
                Some("free disk space in the temporary directory or drop --deep".to_string())
            }
            AnalysisError::Decode(_) => Some("use a readable .pcap or .pcapng file".to_string()),
            _ => None,
        };
        CliError::new(format!("capture analysis failed: {err}"), hint)
    }
}

impl From<SnapshotError> for CliError {
    fn from(err: SnapshotError) -> Self {
        let hint = match &err {
            SnapshotError::UnsupportedVersion { .. } => {
                Some("upgrade bacscope to read this snapshot".to_string())
            }
            SnapshotError::Json(_) | SnapshotError::Invalid(_) => {
                Some("expected a snapshot written by `bacscope capture analyse --snapshot`".to_string())
            }
            _ => None,
        };
        CliError::new(format!("snapshot error: {err}"), hint)
    }
}

fn progress_log(update: ProgressUpdate) {
    tracing::debug!(phase = %update.phase, percent = update.percent, "{}", update.operation);
}

fn cmd_capture_analyse(args: AnalyseArgs, quiet: bool) -> Result<(), CliError> {
    let resolved_input = resolve_input_path(&args.input)?;
    validate_input_file(&resolved_input)?;
    let input_abs = fs::canonicalize(&resolved_input)
        .with_context(|| format!("Failed to resolve input path: {}", resolved_input.display()))?;

    let report_path = if args.stdout {
        None
    } else {
        Some(args.report.clone().ok_or_else(|| {
            CliError::new(
                "missing output path",
                Some("use -o/--report or --stdout".to_string()),
            )
        })?)
    };
    for output in report_path.iter().chain(args.snapshot.iter()) {
        ensure_differs_from_input(output, &input_abs)?;
    }

    let mut config = config::load_config(args.config.as_deref())?;
    if args.deep {
        config.deep_decoder.enabled = true;
    }
    if let Some(tool) = &args.tshark {
        config.deep_decoder.tool = tool.display().to_string();
    }
    if args.all_packets {
        config.snapshot.only_protocol_packets = false;
    }

    let cancel = CancellationToken::new();
    let outcome = analyze_capture(&resolved_input, &config, &progress_log, &cancel)?;
    let report = outcome.report();

    if let Some(snapshot_path) = &args.snapshot {
        let written = write_snapshot(
            snapshot_path,
            SnapshotContents::from(&outcome),
            &config.snapshot,
            &progress_log,
            &cancel,
        )?;
        if !quiet {
            eprintln!(
                "OK: snapshot written ({written} packets) -> {}",
                snapshot_path.display()
            );
        }
    }

    let json = serialize_report(&report, args.pretty)?;
    match report_path {
        None => print!("{}", json),
        Some(path) => {
            create_parent_dir(&path)?;
            fs::write(&path, json)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            if !quiet {
                eprintln!("OK: report written -> {}", path.display());
            }
        }
    }
    Ok(())
}

fn cmd_snapshot_inspect(
    file: &Path,
    report_path: Option<&Path>,
    pretty: bool,
    quiet: bool,
) -> Result<(), CliError> {
    if !file.is_file() {
        return Err(CliError::new(
            format!("snapshot not found: {}", file.display()),
            None,
        ));
    }
    let restored = read_snapshot(file, &progress_log, &CancellationToken::new())?;
    let report = restored.report(input_info(file));
    let json = serialize_report(&report, pretty)?;
    match report_path {
        None => print!("{}", json),
        Some(path) => {
            create_parent_dir(path)?;
            fs::write(path, json)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            if !quiet {
                eprintln!("OK: report written -> {}", path.display());
            }
        }
    }
    Ok(())
}

fn cmd_snapshot_validate(file: &Path, quiet: bool) -> Result<(), CliError> {
    if !file.is_file() {
        return Err(CliError::new(
            format!("snapshot not found: {}", file.display()),
            None,
        ));
    }
    let info = validate_snapshot(file)?;
    if !quiet {
        let packets = info
            .packet_count
            .map_or_else(|| "unknown".to_string(), |count| count.to_string());
        eprintln!(
            "OK: snapshot v{} created {} ({} packets) -> {}",
            info.version,
            info.created_at,
            packets,
            file.display()
        );
    }
    Ok(())
}

fn serialize_report(report: &Report, pretty: bool) -> Result<String, CliError> {
    let json = if pretty {
        serde_json::to_string_pretty(report)
    } else {
        serde_json::to_string(report)
    };
    json.context("JSON serialization failed").map_err(Into::into)
}

fn create_parent_dir(path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create output directory: {}", parent.display())
        })?;
    }
    Ok(())
}

fn ensure_differs_from_input(output: &Path, input_abs: &Path) -> Result<(), CliError> {
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    // A parent that does not exist yet cannot contain the input.
    let Ok(dir) = fs::canonicalize(parent) else {
        return Ok(());
    };
    let name = output
        .file_name()
        .ok_or_else(|| CliError::new(format!("invalid output path: {}", output.display()), None))?;
    if dir.join(name) == input_abs {
        return Err(CliError::new(
            format!("output path must differ from input: {}", output.display()),
            Some("choose a different output path".to_string()),
        ));
    }
    Ok(())
}

fn validate_input_file(input: &Path) -> Result<(), CliError> {
    if !input.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", input.display()),
            Some("use a .pcap or .pcapng file".to_string()),
        ));
    }
    if !input.is_file() {
        return Err(CliError::new(
            format!("input is not a file: {}", input.display()),
            Some("use a .pcap or .pcapng file".to_string()),
        ));
    }
    let ext = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext != "pcap" && ext != "pcapng" {
        return Err(CliError::new(
            format!("unsupported input format '{}'", input.display()),
            Some("expected a .pcap or .pcapng file".to_string()),
        ));
    }
    Ok(())
}

fn resolve_input_path(input: &Path) -> Result<PathBuf, CliError> {
    let pattern = input.to_string_lossy();
    if !is_glob_pattern(&pattern) {
        return Ok(input.to_path_buf());
    }

    let paths = glob(&pattern).map_err(|err| {
        CliError::new(
            format!("invalid input pattern '{}'", pattern),
            Some(format!("pattern error: {}", err.msg)),
        )
    })?;
    let mut matches = Vec::new();
    for entry in paths {
        let path = entry.map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", pattern),
                Some(format!("pattern error: {}", err)),
            )
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }

    match matches.len() {
        0 => Err(CliError::new(
            format!("no files match pattern '{}'", pattern),
            Some("check the path or quote the pattern; expected .pcap or .pcapng".to_string()),
        )),
        1 => Ok(matches.remove(0)),
        count => {
            let mut message = format!("multiple files match pattern '{}' ({} matches)", pattern, count);
            let listed: Vec<String> = matches
                .iter()
                .take(3)
                .map(|p| p.display().to_string())
                .collect();
            message.push_str("; matches: ");
            message.push_str(&listed.join(", "));
            if count > 3 {
                message.push_str(", ...");
            }
            Err(CliError::new(
                message,
                Some("pass a single capture file, or run once per file".to_string()),
            ))
        }
    }
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}
