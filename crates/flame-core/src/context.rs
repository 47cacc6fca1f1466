//! Client configuration.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::FlameError;

/// Environment variable consulted for the service endpoint.
pub const FLAME_ENDPOINT_ENV: &str = "FLAME_ENDPOINT";
/// Endpoint used when neither an argument nor the environment provides one.
pub const DEFAULT_FLAME_ENDPOINT: &str = "http://127.0.0.1:8080";
/// Default context name.
pub const DEFAULT_CONTEXT_NAME: &str = "flame";
/// Default configuration file, relative to `~/.flame`.
pub const DEFAULT_FLAME_CONF: &str = "flame-conf.yaml";
/// Largest payload accepted in one message (4 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Resolve the service endpoint.
///
/// Priority: explicit argument, then `FLAME_ENDPOINT`, then
/// [`DEFAULT_FLAME_ENDPOINT`].
#[must_use]
pub fn resolve_endpoint(explicit: Option<&str>) -> String {
    resolve_endpoint_from(explicit, std::env::var(FLAME_ENDPOINT_ENV).ok())
}

fn resolve_endpoint_from(explicit: Option<&str>, env: Option<String>) -> String {
    explicit
        .map(ToString::to_string)
        .or(env)
        .unwrap_or_else(|| DEFAULT_FLAME_ENDPOINT.to_string())
}

/// Named connection settings, usually loaded from `~/.flame/flame-conf.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlameContext {
    pub name: String,
    pub endpoint: String,
    /// Upper bound for task input, common data and decoded responses.
    pub max_message_size: usize,
}

impl Default for FlameContext {
    fn default() -> Self {
        Self {
            name: DEFAULT_CONTEXT_NAME.to_string(),
            endpoint: DEFAULT_FLAME_ENDPOINT.to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl fmt::Display for FlameContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name: {}, endpoint: {}", self.name, self.endpoint)
    }
}

impl FlameContext {
    /// Context whose endpoint is resolved from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            endpoint: resolve_endpoint(None),
            ..Self::default()
        }
    }

    /// Default configuration file location, if a home directory is known.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".flame").join(DEFAULT_FLAME_CONF))
    }

    /// Load a context from a YAML file, or from [`Self::default_path`].
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the file is missing, unreadable or malformed.
    pub fn from_file(path: Option<PathBuf>) -> Result<Self, FlameError> {
        let path = path
            .or_else(Self::default_path)
            .ok_or_else(|| FlameError::InvalidConfig("no home directory".to_string()))?;
        Self::load(&path)
    }

    fn load(path: &Path) -> Result<Self, FlameError> {
        if !path.is_file() {
            return Err(FlameError::InvalidConfig(format!(
                "<{}> is not a file",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            FlameError::InvalidConfig(format!("failed to read <{}>: {e}", path.display()))
        })?;
        let ctx: Self = serde_yaml::from_str(&contents).map_err(|e| {
            FlameError::InvalidConfig(format!("failed to parse <{}>: {e}", path.display()))
        })?;

        tracing::debug!("Loaded flame context from <{}>: {ctx}", path.display());

        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::ErrorCode;

    #[test]
    fn test_explicit_endpoint_wins() {
        let endpoint = resolve_endpoint_from(
            Some("http://10.0.0.1:9000"),
            Some("http://env:8080".to_string()),
        );
        assert_eq!(endpoint, "http://10.0.0.1:9000");
    }

    #[test]
    fn test_env_endpoint_before_default() {
        let endpoint = resolve_endpoint_from(None, Some("http://env:8080".to_string()));
        assert_eq!(endpoint, "http://env:8080");
    }

    #[test]
    fn test_default_endpoint() {
        assert_eq!(resolve_endpoint_from(None, None), DEFAULT_FLAME_ENDPOINT);
    }

    #[test]
    fn test_load_context_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name: prod\nendpoint: http://flame:8080").unwrap();

        let ctx = FlameContext::from_file(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(ctx.name, "prod");
        assert_eq!(ctx.endpoint, "http://flame:8080");
        assert_eq!(ctx.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_missing_file_is_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let err = FlameContext::from_file(Some(dir.path().join("absent.yaml"))).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfig);
    }

    #[test]
    fn test_malformed_file_is_invalid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_message_size: [not, a, number]").unwrap();

        let err = FlameContext::from_file(Some(file.path().to_path_buf())).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfig);
    }
}
