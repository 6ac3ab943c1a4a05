//! coverme command line
//!
//! `coverme backup -c backup.yml` runs every configured backup once.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use coverme::logging::init_logging;
use coverme::{ArchiveRegistry, BackupRun, BackupSpec, ConfigError, ConfigFormat, RunContext};

#[derive(Debug, Parser)]
#[command(name = "coverme", version, about = "Back up databases and directories to S3 and Glacier")]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every configured backup once
    Backup(ConfigArgs),
    /// Check the configuration without running anything
    Validate(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// Backups configuration file, or `-` to read standard input
    #[arg(short, long, default_value = "backup.yml")]
    config: PathBuf,

    /// Configuration format; guessed from the file extension when omitted
    #[arg(long, value_enum)]
    format: Option<ConfigFormat>,
}

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Captured once so every name in this run sees the same environment.
    let ctx = RunContext::from_process();
    let registry = ArchiveRegistry::default();

    let (args, run) = match cli.command {
        Command::Backup(args) => (args, true),
        Command::Validate(args) => (args, false),
    };

    let spec = match BackupSpec::create_with_config(&args.config, args.format, &ctx, &registry) {
        Ok(spec) => spec,
        Err(e) => {
            report_config_error(&e);
            return ExitCode::FAILURE;
        }
    };

    if !run {
        println!(
            "✅ Configuration is valid: {} backups, {} vaults.",
            spec.sources.len(),
            spec.vaults.len()
        );
        return ExitCode::SUCCESS;
    }

    match run_backup(spec, ctx, registry).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("❌ Backup failed: {:?}", e);
            eprintln!("❌ Backup failed, see the log above for details.");
            ExitCode::FAILURE
        }
    }
}

async fn run_backup(spec: BackupSpec, ctx: RunContext, registry: ArchiveRegistry) -> Result<()> {
    let run = BackupRun::from_spec(spec, ctx, registry);
    // Per-source and per-vault failures are already logged and do not change
    // the exit status.
    run.run().await.context("Backup run could not start")?;
    Ok(())
}

fn report_config_error(error: &ConfigError) {
    match error {
        ConfigError::Invalid { path, .. } | ConfigError::Spec { path, .. } => {
            eprintln!("Errors in configuration file `{}`", path);
        }
        _ => eprintln!("Failed to load configuration"),
    }
    for message in error.messages() {
        eprintln!("- {}", message);
    }
    eprintln!(
        "\n    Run `coverme --help` for basic usage\n    \
         See README.md for configuration examples\n"
    );
}
