//! Server configuration loaded from environment variables.
//!
//! Everything has a default so the server starts with zero configuration;
//! without a sheets token, sheet writes fail and are logged.

use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Directory holding the database and the media cache.
    /// Env: `DATA_DIR`
    /// Default: the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// JSON pipeline configuration (projects, monitored chat, sheet layout).
    /// Env: `PIPELINE_CONFIG`
    /// Default: built-in deployment defaults.
    pub pipeline_config: Option<PathBuf>,

    /// Base URL of the protocol client's local API.
    /// Env: `TRANSPORT_URL`
    pub transport_url: String,

    /// User part of the bridge's own account, used for history senders.
    /// Env: `OWN_USER`
    pub own_user: Option<String>,

    /// OAuth bearer token for the Sheets API.
    /// Env: `SHEETS_TOKEN`, or a file named by `SHEETS_TOKEN_FILE`.
    pub sheets_token: Option<String>,
    pub sheets_token_file: Option<PathBuf>,

    /// External feedback text service. Template text when unset.
    /// Env: `FEEDBACK_URL`
    pub feedback_url: Option<String>,

    /// Seconds between feedback rounds; 0 disables the loop.
    /// Env: `FEEDBACK_INTERVAL_SECS`
    pub feedback_interval_secs: u64,

    /// Overrides the pipeline file's remote-call timeout.
    /// Env: `REMOTE_TIMEOUT_SECS`
    pub remote_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            data_dir: None,
            pipeline_config: None,
            transport_url: "http://127.0.0.1:8081".to_string(),
            own_user: None,
            sheets_token: None,
            sheets_token_file: None,
            feedback_url: None,
            feedback_interval_secs: 900,
            remote_timeout_secs: None,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("data_dir", &self.data_dir)
            .field("pipeline_config", &self.pipeline_config)
            .field("transport_url", &self.transport_url)
            .field("own_user", &self.own_user)
            .field("sheets_token", &self.sheets_token.as_ref().map(|_| "<redacted>"))
            .field("sheets_token_file", &self.sheets_token_file)
            .field("feedback_url", &self.feedback_url)
            .field("feedback_interval_secs", &self.feedback_interval_secs)
            .field("remote_timeout_secs", &self.remote_timeout_secs)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = non_empty("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        config.data_dir = non_empty("DATA_DIR").map(PathBuf::from);
        config.pipeline_config = non_empty("PIPELINE_CONFIG").map(PathBuf::from);

        if let Some(url) = non_empty("TRANSPORT_URL") {
            config.transport_url = url;
        }

        config.own_user = non_empty("OWN_USER");
        config.sheets_token = non_empty("SHEETS_TOKEN");
        config.sheets_token_file = non_empty("SHEETS_TOKEN_FILE").map(PathBuf::from);
        config.feedback_url = non_empty("FEEDBACK_URL");

        if let Some(val) = non_empty("FEEDBACK_INTERVAL_SECS") {
            match val.parse::<u64>() {
                Ok(n) => config.feedback_interval_secs = n,
                Err(_) => tracing::warn!(value = %val, "Invalid FEEDBACK_INTERVAL_SECS, using default"),
            }
        }

        if let Some(val) = non_empty("REMOTE_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => config.remote_timeout_secs = Some(n),
                _ => tracing::warn!(value = %val, "Invalid REMOTE_TIMEOUT_SECS, ignoring"),
            }
        }

        config
    }

    /// The inline token wins over the token file.
    pub fn resolve_sheets_token(&self) -> std::io::Result<Option<String>> {
        if let Some(token) = &self.sheets_token {
            return Ok(Some(token.clone()));
        }
        match &self.sheets_token_file {
            Some(path) => {
                let token = std::fs::read_to_string(path)?;
                let token = token.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = lookup(&[]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.feedback_interval_secs, 900);
        assert!(config.data_dir.is_none());
        assert!(config.remote_timeout_secs.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = lookup(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATA_DIR", "/var/lib/dropwatch"),
            ("OWN_USER", "27649999999"),
            ("FEEDBACK_INTERVAL_SECS", "0"),
            ("REMOTE_TIMEOUT_SECS", "10"),
            ("FEEDBACK_URL", ""),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/dropwatch")));
        assert_eq!(config.own_user.as_deref(), Some("27649999999"));
        assert_eq!(config.feedback_interval_secs, 0);
        assert_eq!(config.remote_timeout_secs, Some(10));
        assert!(config.feedback_url.is_none());
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = lookup(&[("HTTP_ADDR", "nope"), ("REMOTE_TIMEOUT_SECS", "0")]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert!(config.remote_timeout_secs.is_none());
    }

    #[test]
    fn test_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "ya29.token\n").unwrap();

        let config = lookup(&[("SHEETS_TOKEN_FILE", path.to_str().unwrap())]);
        assert_eq!(config.resolve_sheets_token().unwrap().as_deref(), Some("ya29.token"));

        let config = lookup(&[
            ("SHEETS_TOKEN", "inline"),
            ("SHEETS_TOKEN_FILE", path.to_str().unwrap()),
        ]);
        assert_eq!(config.resolve_sheets_token().unwrap().as_deref(), Some("inline"));
        assert!(!format!("{config:?}").contains("inline"));
    }
}
