#![forbid(unsafe_code)]

use std::path::PathBuf;

pub const DEFAULT_SERVER: &str = "http://localhost:9000/fpr/api/v2/";
pub const DEFAULT_STORAGE_DIR: &str = ".fpr";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub server: String,
    pub storage_dir: PathBuf,
    pub limit: u32,
    pub timeout_s: u64,
    pub retries: u32,
    pub full: bool,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            limit: 0,
            timeout_s: 30,
            retries: 2,
            full: false,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Sync(ClientConfig),
}

pub fn usage() -> &'static str {
    "fpr_sync: pull Format Policy Registry rules into the local store\n\n\
USAGE:\n\
  fpr_sync [--server URL] [--storage-dir DIR] [--limit N]\n\
           [--timeout-s S] [--retries N] [--full] [--log-level LEVEL]\n\n\
ENV:\n\
  FPR_SERVER, FPR_STORAGE_DIR, FPR_LIMIT, FPR_TIMEOUT_S, FPR_RETRIES, FPR_LOG_LEVEL\n\
  RUST_LOG overrides --log-level when set.\n\n\
NOTES:\n\
  - Without --full only records modified since the stored maxLastUpdate marker are fetched.\n\
  - Prints one JSON result object on stdout; exit code 1 on sync failure.\n"
}

pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Flags win over environment values, which win over defaults.
pub fn parse_args<F>(args: &[String], env: F) -> Result<Command, String>
where
    F: Fn(&str) -> Option<String>,
{
    if args.iter().any(|a| a == "-h" || a == "--help") {
        return Ok(Command::Help);
    }

    let defaults = ClientConfig::default();
    let mut server = env("FPR_SERVER").unwrap_or(defaults.server);
    let mut storage_dir = env("FPR_STORAGE_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.storage_dir);
    let mut limit: u32 = env("FPR_LIMIT")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.limit);
    let mut timeout_s: u64 = env("FPR_TIMEOUT_S")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.timeout_s);
    let mut retries: u32 = env("FPR_RETRIES")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.retries);
    let mut full = false;
    let mut log_level = env("FPR_LOG_LEVEL").unwrap_or(defaults.log_level);

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--server" => {
                i += 1;
                let v = args.get(i).ok_or("--server requires URL")?;
                server = v.to_string();
            }
            "--storage-dir" => {
                i += 1;
                let v = args.get(i).ok_or("--storage-dir requires DIR")?;
                storage_dir = PathBuf::from(v);
            }
            "--limit" => {
                i += 1;
                let v = args.get(i).ok_or("--limit requires N")?;
                limit = v
                    .parse::<u32>()
                    .map_err(|_| "--limit must be a non-negative integer")?;
            }
            "--timeout-s" => {
                i += 1;
                let v = args.get(i).ok_or("--timeout-s requires S")?;
                timeout_s = v
                    .parse::<u64>()
                    .map_err(|_| "--timeout-s must be an integer (seconds)")?;
            }
            "--retries" => {
                i += 1;
                let v = args.get(i).ok_or("--retries requires N")?;
                retries = v
                    .parse::<u32>()
                    .map_err(|_| "--retries must be a non-negative integer")?;
            }
            "--full" => full = true,
            "--log-level" => {
                i += 1;
                let v = args.get(i).ok_or("--log-level requires LEVEL")?;
                log_level = v.to_string();
            }
            other => return Err(format!("unknown argument: {other}\n\n{}", usage())),
        }
        i += 1;
    }

    if server.trim().is_empty() {
        return Err("--server must not be empty".to_string());
    }
    if timeout_s == 0 {
        return Err("--timeout-s must be at least 1".to_string());
    }

    Ok(Command::Sync(ClientConfig {
        server,
        storage_dir,
        limit,
        timeout_s,
        retries,
        full,
        log_level,
    }))
}
