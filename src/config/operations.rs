//! Config loading, overrides, and validation.

use super::model::Config;
use super::types::{AuthenticatorKind, ENV_PREFIX};
use crate::error::{LeaseError, Result};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the config YAML file
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(LeaseError::ConfigError)` - Read error, parse error, or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LeaseError::ConfigError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| LeaseError::ConfigError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            LeaseError::ConfigError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Build the effective config: the file if given (defaults otherwise),
    /// then `CS3_*` environment overrides, then validation.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `CS3_<FIELD>` environment variables.
    ///
    /// The environment wins over the file. Empty variables are ignored.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Override fields from any key lookup, using the `CS3_<FIELD>` names.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |field: &str| {
            let key = format!("{}{}", ENV_PREFIX, field.to_uppercase());
            lookup(&key).filter(|v| !v.is_empty()).inspect(|_| {
                debug!(key = %key, "config value overridden from environment");
            })
        };

        if let Some(v) = get("locks_expiration_time") {
            self.locks_expiration_time = parse_number("locks_expiration_time", &v)?;
        }
        if let Some(v) = get("mount_dir") {
            self.mount_dir = v;
        }
        if let Some(v) = get("home_dir") {
            self.home_dir = Some(v);
        }
        if let Some(v) = get("chunk_size") {
            self.chunk_size = parse_number("chunk_size", &v)?;
        }
        if let Some(v) = get("endpoint") {
            self.endpoint = v;
        }
        if let Some(v) = get("authenticator") {
            self.authenticator = AuthenticatorKind::from_str(&v).ok_or_else(|| {
                LeaseError::ConfigError(format!(
                    "unknown authenticator '{}' (expected reva_password, oauth, or eos)",
                    v
                ))
            })?;
        }
        if let Some(v) = get("client_id") {
            self.client_id = Some(v);
        }
        if let Some(v) = get("client_secret") {
            self.client_secret = Some(v);
        }
        if let Some(v) = get("login_type") {
            self.login_type = v;
        }
        if let Some(v) = get("oauth_token") {
            self.oauth_token = Some(v);
        }
        if let Some(v) = get("oauth_file") {
            self.oauth_file = Some(v);
        }
        if let Some(v) = get("eos_token") {
            self.eos_token = Some(v);
        }
        if let Some(v) = get("eos_file") {
            self.eos_file = Some(v);
        }

        Ok(())
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `locks_expiration_time` must be positive
    /// - `chunk_size` must be positive
    /// - `mount_dir` must be an absolute path
    pub fn validate(&self) -> Result<()> {
        if self.locks_expiration_time == 0 {
            return Err(LeaseError::ConfigError(
                "config validation failed: locks_expiration_time must be greater than 0"
                    .to_string(),
            ));
        }

        if self.chunk_size == 0 {
            return Err(LeaseError::ConfigError(
                "config validation failed: chunk_size must be greater than 0".to_string(),
            ));
        }

        if !self.mount_dir.starts_with('/') {
            return Err(LeaseError::ConfigError(format!(
                "config validation failed: mount_dir must be absolute (found '{}')",
                self.mount_dir
            )));
        }

        Ok(())
    }
}

fn parse_number<T: FromStr>(field: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        LeaseError::ConfigError(format!(
            "invalid value for {}: '{}' is not a number",
            field, value
        ))
    })
}
