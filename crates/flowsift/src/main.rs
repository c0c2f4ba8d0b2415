//! flowsift - mitmproxy capture to JSON lines

use anyhow::Context;
use clap::Parser;
use flowsift_capture::FlowReader;
use flowsift_classify::{FilterRules, FlowClassifier, FlowProcessor, RunStats};
use flowsift_core::config::{ConfigLoader, ConfigResult, FlowsiftConfig};
use flowsift_core::FLOWSIFT_VERSION;
use flowsift_export::{JsonlExporter, JsonlExporterConfig};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "flowsift")]
#[command(version)]
#[command(
    about = "Extract gateway and API traffic from a mitmproxy capture as JSON lines",
    long_about = None
)]
struct Cli {
    /// Increase verbosity (logs go to stderr)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short, long, env = "FLOWSIFT_CONFIG")]
    config: Option<PathBuf>,

    /// mitmproxy flow dump to read
    capture: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = ConfigLoader::new().with_cli_path(cli.config.clone()).load();
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // CLI verbose flag takes precedence, then config, then default
    let log_level = if cli.verbose > 0 {
        match cli.verbose {
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    } else {
        match config.log.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Loading ran before logging was up, so its problems are reported here
    let warnings = config_warnings(cli.config.as_deref(), &loaded);
    if warnings.is_empty() {
        info!("Configuration loaded successfully");
    }
    for warning in &warnings {
        warn!("{}", warning);
    }
    debug!("flowsift {}", FLOWSIFT_VERSION);

    let sink = JsonlExporter::stdout(JsonlExporterConfig {
        flush_each: config.output.flush_each,
    });
    run(&cli.capture, &config, sink, &mut io::stderr())?;

    Ok(())
}

/// Problems with the configuration that was asked for
fn config_warnings(cli_path: Option<&Path>, loaded: &ConfigResult<FlowsiftConfig>) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(path) = cli_path {
        if !path.exists() {
            warnings.push(format!(
                "Config file {} does not exist, ignoring it",
                path.display()
            ));
        }
    }
    if let Err(e) = loaded {
        warnings.push(format!("Failed to load configuration: {}, using defaults", e));
    }

    warnings
}

/// Stream a capture into `sink`.
///
/// A capture fault is not an error: it is reported as a single line on
/// `diagnostics`, after everything before it has been flushed to the sink.
fn run<W: Write, E: Write>(
    capture: &Path,
    config: &FlowsiftConfig,
    sink: JsonlExporter<W>,
    diagnostics: &mut E,
) -> anyhow::Result<RunStats> {
    let mut reader = FlowReader::open(capture)
        .with_context(|| format!("Failed to open capture {}", capture.display()))?;

    let classifier = FlowClassifier::new(FilterRules::from(&config.filter));
    let mut processor =
        FlowProcessor::new(classifier, sink).with_policy(config.payload.on_malformed);
    let outcome = processor.run(&mut reader)?;

    info!(
        "Read {} flows from {}, wrote {} events",
        reader.flows_read(),
        capture.display(),
        outcome.stats.events()
    );

    if let Some(fault) = &outcome.fault {
        writeln!(diagnostics, "Flow file corrupted: {}", fault)?;
        diagnostics.flush()?;
    }

    Ok(outcome.stats)
}
