use std::env;

use flagbag_lib::{FlagSet, FlagValue, DEFAULT_ENDPOINT};
use serde::Deserialize;

/// Top-level flagbag.toml configuration
#[derive(Debug, Deserialize, Default)]
pub struct FlagbagToml {
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub project_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub disable_cache: bool,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub default_flags: FlagSet,
}

// ── Default value functions ──────────────────────────

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_data_dir() -> String {
    "./.flagbag".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            project_key: String::new(),
            endpoint: default_endpoint(),
            disable_cache: false,
            data_dir: default_data_dir(),
            default_flags: FlagSet::new(),
        }
    }
}

impl FlagbagToml {
    /// Load configuration from a TOML file, falling back to defaults if the file
    /// doesn't exist or cannot be parsed.
    pub fn load(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path, error = %e, "failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(env::vars());
    }

    fn apply_overrides(&mut self, vars: impl Iterator<Item = (String, String)>) {
        for (key, val) in vars {
            match key.as_str() {
                "FLAGBAG_PROJECT_KEY" => self.client.project_key = val,
                "FLAGBAG_ENDPOINT" => self.client.endpoint = val,
                "FLAGBAG_DATA_DIR" => self.client.data_dir = val,
                "FLAGBAG_DISABLE_CACHE" => match val.to_lowercase().as_str() {
                    "1" | "true" | "yes" => self.client.disable_cache = true,
                    "0" | "false" | "no" => self.client.disable_cache = false,
                    other => tracing::warn!("unknown FLAGBAG_DISABLE_CACHE value: {}", other),
                },
                _ => {}
            }
        }
    }
}

/// Parse a `--default key=value` argument.
///
/// `true`/`false` become booleans, `null` an unresolved flag, numbers stay
/// numeric and anything else is a string.
pub fn parse_default_flag(arg: &str) -> Result<(String, FlagValue), String> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("invalid default '{}', expected key=value", arg))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid default '{}', empty key", arg));
    }

    let raw = raw.trim();
    let value = match raw {
        "true" => FlagValue::Bool(true),
        "false" => FlagValue::Bool(false),
        "null" => FlagValue::Null,
        _ => {
            if let Ok(n) = raw.parse::<i64>() {
                FlagValue::Number(n.into())
            } else if let Some(n) = raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
            {
                FlagValue::Number(n)
            } else {
                FlagValue::String(raw.trim_matches('"').to_string())
            }
        }
    };
    Ok((key.to_string(), value))
}
