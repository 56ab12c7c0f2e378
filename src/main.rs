//! Prefork HTTP demo server.
//!
//! Started by hand this process is the manager. It re-executes itself with
//! the same arguments for every worker, so flags and the config file apply
//! to both roles.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use prefork::config::{load_config, validate_config, PreforkConfig};
use prefork::http::HelloService;
use prefork::observability::logging;
use prefork::Role;

#[derive(Debug, Parser)]
#[command(name = "prefork-server", version, about = "Prefork HTTP server")]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overrides `listener.bind_address`.
    #[arg(long)]
    addr: Option<String>,

    /// Number of worker processes, overrides `workers.count`. 0 serves in
    /// the manager process.
    #[arg(long)]
    workers: Option<usize>,

    /// Connection cap per worker, overrides `admission.max_connections`.
    #[arg(long)]
    conns: Option<usize>,
}

impl Cli {
    fn apply(&self, config: &mut PreforkConfig) {
        if let Some(addr) = &self.addr {
            config.listener.bind_address = addr.clone();
        }
        if let Some(workers) = self.workers {
            config.workers.count = workers;
        }
        if let Some(conns) = self.conns {
            config.admission.max_connections = conns;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let role = Role::detect();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("prefork-server: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => PreforkConfig::default(),
    };
    cli.apply(&mut config);

    if let Err(errors) = validate_config(&config) {
        for e in errors {
            eprintln!("prefork-server: {}", e);
        }
        return ExitCode::FAILURE;
    }

    logging::init(&config.observability.log_level);

    if role == Role::Manager {
        tracing::info!(
            bind_address = %config.listener.bind_address,
            workers = config.workers.count,
            max_connections = config.admission.max_connections,
            "Configuration loaded"
        );
    }

    let service = HelloService::from_config(&config.admission);
    match prefork::run_with_config(role, &service, &config).await {
        Ok(()) => {
            tracing::info!(role = %role, "Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(role = %role, error = %e, "Exiting");
            ExitCode::FAILURE
        }
    }
}
