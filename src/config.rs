// Application configuration, loaded once from environment variables and CLI flags.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::models::UserId;

/// Immutable application configuration, shared as `Arc<Config>`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the collection files and `backups/`.
    pub data_dir: PathBuf,
    /// Port to bind the HTTP server to.
    pub port: u16,
    pub admin_user_ids: Vec<UserId>,
    /// Maximum Active competitions per scope.
    pub max_active_competitions: usize,
    /// Backups retained per collection.
    pub max_backup_files: usize,
    pub stats_api_url: String,
    pub stats_timeout: Duration,
    pub stats_rate_limit_per_minute: usize,
    pub default_duration_hours: i64,
    pub default_max_participants: usize,
    pub expiry_sweep_interval: Duration,
    /// Every actor is an admin and rate limits are off.
    pub local_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            port: 3000,
            admin_user_ids: Vec::new(),
            max_active_competitions: 5,
            max_backup_files: 10,
            stats_api_url: "https://api.wiseoldman.net/v2".to_string(),
            stats_timeout: Duration::from_secs(10),
            stats_rate_limit_per_minute: 60,
            default_duration_hours: 168,
            default_max_participants: 100,
            expiry_sweep_interval: Duration::from_secs(60),
            local_mode: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `CLANBOT_DATA_DIR` - data directory (default: `./data`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `ADMIN_USER_IDS` - comma-separated platform ids with admin rights
    /// - `MAX_ACTIVE_COMPETITIONS` - per-scope active limit (default: 5)
    /// - `MAX_BACKUP_FILES` - backups kept per collection (default: 10)
    /// - `STATS_API_URL`, `STATS_TIMEOUT_SECS`, `STATS_RATE_LIMIT_PER_MINUTE`
    /// - `DEFAULT_DURATION_HOURS`, `DEFAULT_MAX_PARTICIPANTS`
    /// - `EXPIRY_SWEEP_SECS` - expiry sweeper interval (default: 60)
    /// - `CLANBOT_LOCAL_MODE` - set to `true` to enable local mode
    ///
    /// CLI flags:
    /// - `--local` - Enable local mode
    /// - `--port <PORT>` - Override the port
    /// - `--data-dir <DIR>` - Override the data directory
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env_parse(&env, "PORT"))
            .unwrap_or(defaults.port);

        let data_dir = Self::parse_cli_value(args, "--data-dir")
            .or_else(|| env("CLANBOT_DATA_DIR"))
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let admin_user_ids = env("ADMIN_USER_IDS")
            .map(|v| parse_id_list(&v))
            .unwrap_or_default();

        let local_mode = args.iter().any(|a| a == "--local")
            || env("CLANBOT_LOCAL_MODE")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false);

        Config {
            data_dir,
            port,
            admin_user_ids,
            max_active_competitions: env_parse(&env, "MAX_ACTIVE_COMPETITIONS")
                .unwrap_or(defaults.max_active_competitions),
            max_backup_files: env_parse(&env, "MAX_BACKUP_FILES")
                .unwrap_or(defaults.max_backup_files),
            stats_api_url: env("STATS_API_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.stats_api_url),
            stats_timeout: env_parse(&env, "STATS_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.stats_timeout),
            stats_rate_limit_per_minute: env_parse(&env, "STATS_RATE_LIMIT_PER_MINUTE")
                .unwrap_or(defaults.stats_rate_limit_per_minute),
            default_duration_hours: env_parse(&env, "DEFAULT_DURATION_HOURS")
                .unwrap_or(defaults.default_duration_hours),
            default_max_participants: env_parse(&env, "DEFAULT_MAX_PARTICIPANTS")
                .unwrap_or(defaults.default_max_participants),
            expiry_sweep_interval: env_parse(&env, "EXPIRY_SWEEP_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.expiry_sweep_interval),
            local_mode,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

fn env_parse<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| v.trim().parse().ok())
}

fn parse_id_list(raw: &str) -> Vec<UserId> {
    raw.split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            match s.parse() {
                Ok(id) => Some(UserId(id)),
                Err(_) => {
                    tracing::warn!("ignoring invalid admin user id '{s}'");
                    None
                }
            }
        })
        .collect()
}
