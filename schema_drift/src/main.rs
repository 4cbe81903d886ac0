use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use schema_drift::{
    config, utils, ChangeLogFormat, ExportOutcome, FailureMode, ReportOptions, SchemaDriftClient,
    SchemaReporter, SchemaSnapshot,
};

#[derive(Parser)]
#[command(name = "schema_drift", version, about = "Report drift between entity mappings and a live database schema")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "schema_drift.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compare the registered models with the configured database
    Check {
        #[command(flatten)]
        report: ReportArgs,

        /// Override the configured failure mode
        #[arg(long, value_enum)]
        failure_mode: Option<FailureMode>,
    },
    /// Dump a schema snapshot as JSON
    Snapshot {
        #[arg(long, value_enum, default_value_t = SnapshotSide::Database)]
        source: SnapshotSide,

        /// Write the snapshot here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare two JSON snapshot files
    Diff {
        /// Snapshot holding the expected schema
        reference: PathBuf,
        /// Snapshot holding the actual schema
        actual: PathBuf,

        #[command(flatten)]
        report: ReportArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SnapshotSide {
    Database,
    Models,
}

#[derive(Args)]
struct ReportArgs {
    /// Changelog format
    #[arg(long, value_enum)]
    format: Option<ChangeLogFormat>,

    /// Write the changelog to this file instead of logging it; without an
    /// extension the format's extension is appended
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Tables whose differences are ignored, in addition to the configured ones
    #[arg(long = "ignore", value_name = "TABLE")]
    ignore: Vec<String>,

    /// Exit with status 1 when outstanding changes are found
    #[arg(long)]
    fail_on_changes: bool,
}

impl ReportArgs {
    fn apply(&self, mut options: ReportOptions) -> ReportOptions {
        options = options.ignore_tables(self.ignore.iter().cloned());
        if let Some(format) = self.format {
            options = options.with_format(format);
        }
        if let Some(output) = &self.output {
            options = options.with_output_file(output);
        }
        options
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Some(load_config(&cli.config)?)
    } else {
        None
    };
    utils::init_logging(&config.as_ref().and_then(|c| c.logging.clone()))?;

    let has_changes = match cli.command {
        Command::Check { report, failure_mode } => {
            let config = config.with_context(|| {
                format!("Configuration file {} not found", cli.config.display())
            })?;
            let failure_mode = failure_mode.unwrap_or(config.report.failure_mode);

            let mut client = SchemaDriftClient::new(config).await?;
            let found = client.register_models()?;
            tracing::info!(models = found, "Registered models");

            let options = report.apply(client.report_options());
            let outcome = client.check_with(&options, failure_mode).await?;
            report.fail_on_changes && outcome.as_ref().map_or(false, ExportOutcome::has_changes)
        }
        Command::Snapshot { source, output } => {
            let config = config.with_context(|| {
                format!("Configuration file {} not found", cli.config.display())
            })?;

            let mut client = SchemaDriftClient::new(config).await?;
            let snapshot = match source {
                SnapshotSide::Database => client.snapshot_database().await?,
                SnapshotSide::Models => {
                    client.register_models()?;
                    client.reference_snapshot()?
                }
            };

            let json = serde_json::to_string_pretty(&snapshot)?;
            match output {
                Some(path) => std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => println!("{}", json),
            }
            false
        }
        Command::Diff {
            reference,
            actual,
            report,
        } => {
            let options = config
                .as_ref()
                .map(|c| ReportOptions::from_config(&c.report))
                .unwrap_or_default();
            let options = report.apply(options);

            let outcome = SchemaReporter::new().compare_snapshots(
                &read_snapshot(&reference)?,
                &read_snapshot(&actual)?,
                &options,
            )?;
            report.fail_on_changes && outcome.has_changes()
        }
    };

    if has_changes {
        std::process::exit(1);
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<config::Config> {
    let path_str = path
        .to_str()
        .with_context(|| format!("Configuration path {} is not valid UTF-8", path.display()))?;
    Ok(config::load_from_file(path_str)?)
}

fn read_snapshot(path: &Path) -> Result<SchemaSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))
}
