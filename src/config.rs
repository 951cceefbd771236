//! Optional config file loading. Search order: ./ficfetch.toml, then
//! $XDG_CONFIG_HOME/ficfetch/config.toml (or ~/.config/ficfetch/config.toml).

use serde::Deserialize;
use std::path::PathBuf;

/// Config file contents. All fields optional; only present keys override
/// defaults, and CLI flags override config.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Default output directory when -o is not set. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// Base URL of the conversion API.
    pub api_base_url: Option<String>,
    /// HTTP User-Agent header. Defaults to the fixed client identifier.
    pub user_agent: Option<String>,
    /// Connect timeout in seconds (default 6).
    pub connect_timeout_secs: Option<u64>,
    /// Read timeout in seconds (default 300; artifact bodies can be large).
    pub read_timeout_secs: Option<u64>,
    /// Total HTTP attempts for retryable failures (default 4).
    pub retry_count: Option<u32>,
    /// Delay in seconds before each status retry (e.g. [1, 2, 4]).
    pub retry_backoff_secs: Option<Vec<u64>>,
    /// Fixed delay in seconds before retrying a connect/timeout failure.
    pub transient_delay_secs: Option<u64>,
    /// Filename template applied to resolved artifacts, e.g.
    /// "{title} by {author}". Unresolved tokens become empty strings.
    pub filename_template: Option<String>,
    /// Extra regex rules for URLs the API is known not to convert.
    pub unsupported_patterns: Option<Vec<String>>,
    /// Directory for output.log / err.log (default: current directory).
    pub ledger_dir: Option<PathBuf>,
}

/// Search order: (1) ./ficfetch.toml, (2) $XDG_CONFIG_HOME/ficfetch/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present
/// file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("ficfetch.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("ficfetch").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            return Ok(Some(config));
        }
    }
    Ok(None)
}
