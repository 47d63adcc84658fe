//! Configuration loader
//!
//! ## Loading Strategy
//! 1. Environment variables, when the Google client credentials are set
//! 2. Otherwise a config file, probed near the working directory and the
//!    executable (`config.{toml,json}`, `calsync.{toml,json}`)
//!
//! Optional environment variables override file values in both cases.
//!
//! ## Environment Variables
//! - `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`: OAuth client (required)
//! - `CALSYNC_BIND_ADDRESS`, `CALSYNC_PUBLIC_BASE_URL`, `CALSYNC_ADMIN_TOKEN`
//! - `CALSYNC_DB_PATH`, `CALSYNC_DB_POOL_SIZE`
//! - `CALSYNC_GOOGLE_API_BASE_URL`, `CALSYNC_GOOGLE_TOKEN_URL`
//! - `CALSYNC_PROVIDER_TIMEOUT_SECS`, `CALSYNC_PROVIDER_MAX_ATTEMPTS`
//! - `CALSYNC_RENEWAL_MARGIN_SECS`, `CALSYNC_RENEWAL_CRON`, `CALSYNC_CHANNEL_TTL_SECS`
//! - `CALSYNC_REFRESH_SKEW_SECS`
//! - `CALSYNC_DOWNSTREAM_URL`
//! - `CALSYNC_LOG_FILTER`, `CALSYNC_LOG_JSON`

use std::path::{Path, PathBuf};
use std::str::FromStr;

use calsync_domain::{CalSyncError, Config, Result};

/// Load configuration from the environment, falling back to a file.
///
/// # Errors
/// Returns `CalSyncError::Config` when neither source yields a valid
/// configuration.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "environment incomplete, trying config file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables alone.
///
/// # Errors
/// Returns `CalSyncError::Config` if the client credentials are missing or
/// any variable has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let client_id = env_var("GOOGLE_CLIENT_ID")?;
    let client_secret = env_var("GOOGLE_CLIENT_SECRET")?;

    let mut config = Config::with_google_credentials(client_id, client_secret);
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file, then apply environment overrides.
///
/// If `path` is `None`, probes the standard locations. The format is
/// detected by extension (`.json` or `.toml`).
///
/// # Errors
/// Returns `CalSyncError::Config` if no file is found, the file is
/// malformed, or the result fails validation.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CalSyncError::Config(format!("config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            CalSyncError::Config("no config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CalSyncError::Config(format!("failed to read config file: {e}")))?;

    let mut config = parse_config(&contents, &config_path)?;
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| CalSyncError::Config(format!("invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| CalSyncError::Config(format!("invalid JSON format: {e}"))),
        _ => Err(CalSyncError::Config(format!("unsupported config format: {extension}"))),
    }
}

fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Some(id) = env_opt("GOOGLE_CLIENT_ID") {
        config.google.client_id = id;
    }
    if let Some(secret) = env_opt("GOOGLE_CLIENT_SECRET") {
        config.google.client_secret = secret;
    }

    if let Some(addr) = env_opt("CALSYNC_BIND_ADDRESS") {
        config.server.bind_address = addr;
    }
    if let Some(base) = env_opt("CALSYNC_PUBLIC_BASE_URL") {
        config.server.public_base_url = Some(base);
    }
    if let Some(token) = env_opt("CALSYNC_ADMIN_TOKEN") {
        config.server.admin_token = Some(token);
    }

    if let Some(path) = env_opt("CALSYNC_DB_PATH") {
        config.database.path = path;
    }
    if let Some(size) = env_parse("CALSYNC_DB_POOL_SIZE")? {
        config.database.pool_size = size;
    }

    if let Some(url) = env_opt("CALSYNC_GOOGLE_API_BASE_URL") {
        config.google.api_base_url = url;
    }
    if let Some(url) = env_opt("CALSYNC_GOOGLE_TOKEN_URL") {
        config.google.token_url = url;
    }
    if let Some(secs) = env_parse("CALSYNC_PROVIDER_TIMEOUT_SECS")? {
        config.google.request_timeout_secs = secs;
    }
    if let Some(attempts) = env_parse("CALSYNC_PROVIDER_MAX_ATTEMPTS")? {
        config.google.max_attempts = attempts;
    }

    if let Some(margin) = env_parse("CALSYNC_RENEWAL_MARGIN_SECS")? {
        config.sync.renewal_margin_secs = margin;
    }
    if let Some(cron) = env_opt("CALSYNC_RENEWAL_CRON") {
        config.sync.renewal_cron = cron;
    }
    if let Some(ttl) = env_parse("CALSYNC_CHANNEL_TTL_SECS")? {
        config.sync.channel_ttl_secs = Some(ttl);
    }
    if let Some(skew) = env_parse("CALSYNC_REFRESH_SKEW_SECS")? {
        config.sync.refresh_skew_secs = skew;
    }

    if let Some(url) = env_opt("CALSYNC_DOWNSTREAM_URL") {
        config.downstream.url = Some(url);
    }

    if let Some(filter) = env_opt("CALSYNC_LOG_FILTER") {
        config.logging.filter = filter;
    }
    config.logging.json = env_bool("CALSYNC_LOG_JSON", config.logging.json);

    Ok(())
}

/// First existing config file among the standard locations.
pub fn probe_config_paths() -> Option<PathBuf> {
    const NAMES: [&str; 4] = ["config.toml", "config.json", "calsync.toml", "calsync.json"];

    let mut roots: Vec<PathBuf> = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.extend(cwd.parent().map(Path::to_path_buf));
        roots.insert(0, cwd);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            roots.push(exe_dir.to_path_buf());
            roots.extend(exe_dir.parent().map(Path::to_path_buf));
        }
    }

    roots
        .iter()
        .flat_map(|root| NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.is_file())
}

fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| {
        CalSyncError::Config(format!("missing required environment variable: {key}"))
    })
}

/// Set and non-blank.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| CalSyncError::Config(format!("invalid value for {key}: {e}")))
        })
        .transpose()
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
