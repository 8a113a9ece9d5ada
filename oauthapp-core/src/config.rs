use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Process-level settings for the OAuth core.
///
/// Provider choice and client credentials are not here; they live in the
/// host's store and reach the core through [`crate::store::ConfigReader`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub http: HttpSettings,
    pub logging: LoggingConfig,
}

/// Outbound HTTP client used for every provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Whole-request timeout, including reading the body.
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            connect_timeout_seconds: 10,
            user_agent: concat!("oauthapp/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpSettings {
    /// Build the shared client. Redirects are never followed on token or
    /// discovery requests.
    pub fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_seconds))
            .connect_timeout(Duration::from_secs(self.connect_timeout_seconds))
            .user_agent(self.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::none())
            .build()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive, e.g. `info` or `oauthapp_core=debug`.
    pub level: String,
    pub format: LogFormat,
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl Settings {
    /// Load settings from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided and present)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // OAUTHAPP__HTTP__TIMEOUT_SECONDS, OAUTHAPP__LOGGING__FORMAT, ...
        builder = builder.add_source(
            Environment::with_prefix("OAUTHAPP")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Load from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.http.timeout_seconds, 30);
        assert_eq!(settings.http.connect_timeout_seconds, 10);
        assert!(settings.http.user_agent.starts_with("oauthapp/"));
        assert_eq!(settings.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[http]\ntimeout_seconds = 5\n\n[logging]\nlevel = \"debug\"\nformat = \"json\""
        )
        .unwrap();

        let settings = Settings::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(settings.http.timeout_seconds, 5);
        assert_eq!(settings.http.connect_timeout_seconds, 10);
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let settings = Settings::load(Some("/nonexistent/oauthapp.toml")).unwrap();
        assert_eq!(settings.http.timeout_seconds, 30);
    }

    #[test]
    fn test_build_client() {
        assert!(HttpSettings::default().build_client().is_ok());
    }
}
