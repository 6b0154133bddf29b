#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::http::DEFAULT_USER_AGENT;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_OUTPUT_ROOT: &str = "output";
pub const DEFAULT_REMUX_BIN: &str = "ffmpeg";
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct Settings {
    pub output_root: PathBuf,
    pub remux_bin: PathBuf,
    pub retry_delay: Duration,
    /// Connect and per-read timeout for every HTTP request.
    pub timeout: Duration,
    pub user_agent: String,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub output_root: Option<PathBuf>,
    pub remux_bin: Option<PathBuf>,
    pub retry_delay_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub env_path: Option<PathBuf>,
}

/// CLI overrides win, then the process environment, then the `.env` file,
/// then built-in defaults.
pub fn resolve_settings(overrides: SettingsOverrides) -> Result<Settings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_settings(&file_vars, env_var_string, overrides))
}

fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Settings {
    let output_root = overrides
        .output_root
        .filter(|path| !path.as_os_str().is_empty())
        .or_else(|| lookup_value("RIPTUBE_OUTPUT_ROOT", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_ROOT));
    let remux_bin = overrides
        .remux_bin
        .filter(|path| !path.as_os_str().is_empty())
        .or_else(|| lookup_value("RIPTUBE_REMUX_BIN", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REMUX_BIN));
    let retry_delay_secs = overrides
        .retry_delay_secs
        .or_else(|| lookup_secs("RIPTUBE_RETRY_DELAY_SECS", file_vars, &env_lookup))
        .unwrap_or(DEFAULT_RETRY_DELAY_SECS);
    // A zero timeout would make every request fail immediately.
    let timeout_secs = overrides
        .timeout_secs
        .filter(|secs| *secs > 0)
        .or_else(|| {
            lookup_secs("RIPTUBE_TIMEOUT_SECS", file_vars, &env_lookup).filter(|secs| *secs > 0)
        })
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let user_agent = lookup_value("RIPTUBE_USER_AGENT", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
    Settings {
        output_root,
        remux_bin,
        retry_delay: Duration::from_secs(retry_delay_secs),
        timeout: Duration::from_secs(timeout_secs),
        user_agent,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().as_deref().and_then(non_blank)
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .as_deref()
        .and_then(non_blank)
}

fn lookup_secs(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<u64> {
    lookup_value(key, file_vars, env_lookup).and_then(|value| value.trim().parse().ok())
}

/// Reads `KEY=value` lines, tolerating `export` prefixes, quotes and comments.
/// A missing file is not an error.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("reading env file {}", path.display()));
        }
    };
    Ok(content
        .lines()
        .filter_map(parse_env_line)
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect())
}

fn parse_env_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").map_or(line, str::trim_start);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, unquote(value.trim())))
}

/// Strips one matching pair of surrounding quotes.
fn unquote(value: &str) -> &str {
    ['"', '\'']
        .into_iter()
        .find_map(|quote| value.strip_prefix(quote)?.strip_suffix(quote))
        .unwrap_or(value)
}
