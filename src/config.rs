use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub service_account: ServiceAccountConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            session_ttl_secs: default_session_ttl(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5380
}

fn default_session_ttl() -> u64 {
    1800 // 30 minutes idle
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceAccountConfig {
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime_secs: i64,
    /// Overrides the `token_uri` found in the key file.
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl Default for ServiceAccountConfig {
    fn default() -> Self {
        Self {
            key_path: default_key_path(),
            scopes: default_scopes(),
            token_lifetime_secs: default_token_lifetime(),
            token_uri: None,
        }
    }
}

fn default_key_path() -> PathBuf {
    PathBuf::from("service-account.json")
}

fn default_scopes() -> Vec<String> {
    vec!["https://www.googleapis.com/auth/analytics.readonly".to_string()]
}

fn default_token_lifetime() -> i64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.googleapis.com/analytics/v3/data/ga".to_string()
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    600
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReportConfig {
    #[serde(default)]
    pub profile_id: Option<String>,
}

/// `ga:` followed by one or more ASCII digits.
pub fn is_valid_profile_id(id: &str) -> bool {
    id.strip_prefix("ga:")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref id) = self.report.profile_id {
            if !is_valid_profile_id(id) {
                return Err(format!(
                    "report.profile_id must look like ga:<numeric-id>, got {id:?}"
                ));
            }
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err("cache.ttl_secs must be positive when caching is enabled".to_string());
        }
        if self.service_account.token_lifetime_secs <= 0 {
            return Err("service_account.token_lifetime_secs must be positive".to_string());
        }
        url::Url::parse(&self.api.base_url)
            .map_err(|e| format!("api.base_url is not a valid URL: {e}"))?;
        if let Some(ref uri) = self.service_account.token_uri {
            url::Url::parse(uri)
                .map_err(|e| format!("service_account.token_uri is not a valid URL: {e}"))?;
        }
        Ok(())
    }

    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        let path = config_path.unwrap_or("gastat.toml");
        builder = builder.add_source(File::with_name(path).required(false));

        // GASTAT__CACHE__TTL_SECS=300, GASTAT__REPORT__PROFILE_ID=ga:123, ...
        builder = builder.add_source(
            Environment::with_prefix("GASTAT")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert!(!cfg.cache.enabled);
        assert_eq!(cfg.cache.ttl_secs, 600);
        assert_eq!(
            cfg.service_account.scopes,
            vec!["https://www.googleapis.com/auth/analytics.readonly".to_string()]
        );
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_profile_id_format() {
        assert!(is_valid_profile_id("ga:12345"));
        assert!(!is_valid_profile_id("ga:"));
        assert!(!is_valid_profile_id("12345"));
        assert!(!is_valid_profile_id("ga:12a45"));
    }

    #[test]
    fn test_validate_rejects_bad_profile() {
        let mut cfg = AppConfig::default();
        cfg.report.profile_id = Some("UA-1234".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_ttl_when_enabled() {
        let mut cfg = AppConfig::default();
        cfg.cache.enabled = true;
        cfg.cache.ttl_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gastat.toml");
        std::fs::write(
            &path,
            "[cache]\nenabled = true\nttl_secs = 120\n\n[report]\nprofile_id = \"ga:42\"\n",
        )
        .unwrap();

        let cfg = AppConfig::load(path.to_str()).unwrap();
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.cache.ttl_secs, 120);
        assert_eq!(cfg.report.profile_id.as_deref(), Some("ga:42"));
        assert_eq!(cfg.server.port, 5380);
    }
}
