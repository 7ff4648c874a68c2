#![forbid(unsafe_code)]

use fpr_client::config::{env_var, parse_args, usage};
use fpr_client::{ClientConfig, Command, FprClient};
use fpr_storage::SqliteStore;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &ClientConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr; stdout carries only the JSON result.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(config: &ClientConfig) -> Result<bool, String> {
    let mut store = SqliteStore::open(&config.storage_dir).map_err(|e| e.to_string())?;
    let client = FprClient::from_config(config).map_err(|e| e.to_string())?;
    tracing::info!(
        server = %client.base_url(),
        storage_dir = %store.storage_dir().display(),
        full = config.full,
        "starting FPR synchronization"
    );

    let result = client.synchronize(&mut store);
    println!("{}", result.to_json());
    Ok(result.is_success())
}

fn main() -> ExitCode {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let config = match parse_args(&args, env_var) {
        Ok(Command::Help) => {
            print!("{}", usage());
            return ExitCode::SUCCESS;
        }
        Ok(Command::Sync(config)) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    init_tracing(&config);
    match run(&config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "synchronization could not start");
            eprintln!("{e}");
            ExitCode::from(2)
        }
    }
}
