//! CLI entry point for running asset provisioning outside the mobile shell.
//!
//! # Responsibility
//! - Run the same startup provisioning pass the host app runs.
//! - Inspect provisioned databases for local and CI sanity checks.

use clap::{Parser, Subcommand};
use finos_core::{
    fingerprint_file, init_logging, run_startup, AssetDatabaseProvisioner, DirAssetSource,
    FailurePolicy, LogLevel, ProvisionManifest, ProvisionOutcome, ProvisionedFile, StartupStatus,
    StorageLayout, DEFAULT_DATABASE_NAME,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(author, version, about = "FinOS storage bootstrap CLI", long_about = None)]
struct Cli {
    /// Write rolling logs to this absolute directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    /// Log level (trace|debug|info|warn|error)
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print core linkage info
    Ping,
    /// Copy bundled databases into private storage if missing
    Provision {
        /// Directory holding the bundled assets
        #[arg(long)]
        assets: PathBuf,
        /// App-private root; databases land in <private-dir>/databases
        #[arg(long)]
        private_dir: PathBuf,
        /// Asset to provision when no manifest is given
        #[arg(long, default_value = DEFAULT_DATABASE_NAME)]
        name: String,
        /// JSON manifest listing several databases
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Stop at the first failure instead of reporting and continuing
        #[arg(long)]
        abort_on_error: bool,
    },
    /// Show whether a database is provisioned and its fingerprint
    Inspect {
        #[arg(long)]
        private_dir: PathBuf,
        #[arg(long, default_value = DEFAULT_DATABASE_NAME)]
        name: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let level = cli
            .log_level
            .clone()
            .unwrap_or_else(|| LogLevel::build_default().to_string());
        if let Err(err) = init_logging(&level, &log_dir.display().to_string()) {
            eprintln!("logging disabled: {err}");
        }
    }

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {
        Commands::Ping => {
            println!("finos_core ping={}", finos_core::ping());
            println!("finos_core version={}", finos_core::core_version());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Provision {
            assets,
            private_dir,
            name,
            manifest,
            abort_on_error,
        } => {
            let layout = StorageLayout::new(&private_dir)?;
            let manifest = match manifest {
                Some(path) => ProvisionManifest::from_path(path)?,
                None => ProvisionManifest::single(name),
            };
            let requests = manifest.to_requests(&layout)?;
            let policy = if abort_on_error {
                FailurePolicy::Abort
            } else {
                FailurePolicy::Continue
            };

            let provisioner = AssetDatabaseProvisioner::new(DirAssetSource::new(assets));
            let report = run_startup(&provisioner, &requests, policy)?;
            for item in &report.items {
                match &item.status {
                    StartupStatus::Ready(ProvisionOutcome::Copied { bytes, digest }) => println!(
                        "copied   {} -> {} ({bytes} bytes, blake3 {})",
                        item.asset_name,
                        item.destination.display(),
                        digest.to_hex()
                    ),
                    StartupStatus::Ready(ProvisionOutcome::AlreadyPresent { len }) => println!(
                        "present  {} ({len} bytes)",
                        item.destination.display()
                    ),
                    StartupStatus::Failed {
                        error,
                        retry_on_next_launch,
                    } => println!(
                        "failed   {} [{}] {error} (retry_on_next_launch={retry_on_next_launch})",
                        item.asset_name,
                        error.error_code()
                    ),
                }
            }

            Ok(if report.all_ready() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Inspect { private_dir, name } => {
            let layout = StorageLayout::new(&private_dir)?;
            let destination = layout.database_path(&name)?;
            let file = ProvisionedFile::inspect(name.as_str(), destination);
            println!("path   {}", file.destination_path.display());
            println!("exists {}", file.exists);
            if file.exists {
                let fingerprint = fingerprint_file(&file.destination_path)?;
                println!("len    {}", fingerprint.len);
                println!("blake3 {}", fingerprint.blake3.to_hex());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
