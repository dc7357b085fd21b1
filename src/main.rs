//! confine - disk usage and quota report
//!
//! Loads the daemon configuration, prepares the data directory and reports
//! usage for each server identifier given on the command line.

use clap::Parser;
use log::{error, info};
use std::process::ExitCode;

use rax_confine::config::DaemonConfig;
use rax_confine::server::ServerRegistry;
use rax_confine::utils::logging::setup_logging;

/// Disk usage and quota report for confined server directories.
#[derive(Parser)]
#[command(name = "confine", version)]
struct Args {
    /// Configuration file, without extension
    #[arg(long)]
    config: Option<String>,

    /// Disk allowance in MiB; zero or negative means unlimited
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    limit: i64,

    /// Server identifiers to report on
    #[arg(required = true)]
    servers: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging();

    let loaded = match &args.config {
        Some(path) => DaemonConfig::from_file(path),
        None => DaemonConfig::load(),
    };
    let (mut startup, runtime) = match loaded {
        Ok(config) => config.split(),
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = startup.prepare_data_directory() {
        error!(
            "Failed to prepare data directory {}: {}",
            startup.data_directory, e
        );
        return ExitCode::FAILURE;
    }

    let registry = ServerRegistry::new(&startup, runtime.subscribe());
    info!("Using data directory {}", registry.data_directory().display());
    let mut status = ExitCode::SUCCESS;

    for server_id in &args.servers {
        let filesystem = match registry.create(server_id, args.limit).await {
            Ok(filesystem) => filesystem,
            Err(e) => {
                error!("Skipping server {}: {}", server_id, e);
                status = ExitCode::FAILURE;
                continue;
            }
        };

        match filesystem.directory_size("/").await {
            Ok(bytes) => {
                let fits = filesystem.quota().fits(bytes);
                println!(
                    "{server_id}\t{bytes} bytes\tlimit {} MiB\t{}",
                    filesystem.quota().disk_limit(),
                    if fits { "ok" } else { "over quota" }
                );
            }
            Err(e) => {
                error!("Failed to size server {}: {}", server_id, e);
                status = ExitCode::FAILURE;
            }
        }
    }

    status
}
