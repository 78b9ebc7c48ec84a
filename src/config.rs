//! Client configuration

use crate::error::{ClientError, Result};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Configuration for the session client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, e.g. `http://127.0.0.1:8000`; endpoint paths are appended to it
    pub base_url: String,

    pub login_path: String,
    pub signup_path: String,
    pub refresh_path: String,
    pub logout_path: String,

    /// Upper bound for a token refresh call; hitting it ends the session
    /// Default: 10 seconds
    pub refresh_timeout: Duration,

    /// Per-request timeout for the HTTP transport
    /// Default: 30 seconds
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            login_path: "/tasks/auth/login/".to_string(),
            signup_path: "/tasks/auth/signup/".to_string(),
            refresh_path: "/api/token/refresh/".to_string(),
            logout_path: "/auth/logout/".to_string(),
            refresh_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Build from `RBAC_API_BASE_URL`, `RBAC_REFRESH_TIMEOUT_SECS` and
    /// `RBAC_REQUEST_TIMEOUT_SECS`; missing or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("RBAC_API_BASE_URL") {
            config.base_url = url;
        }
        if let Some(secs) = env_secs("RBAC_REFRESH_TIMEOUT_SECS") {
            config.refresh_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_secs("RBAC_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        config
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_paths(
        mut self,
        login: impl Into<String>,
        signup: impl Into<String>,
        refresh: impl Into<String>,
        logout: impl Into<String>,
    ) -> Self {
        self.login_path = login.into();
        self.signup_path = signup.into();
        self.refresh_path = refresh.into();
        self.logout_path = logout.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ClientError::Configuration(format!("invalid base URL {:?}: {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::Configuration(format!(
                "unsupported URL scheme {:?}",
                url.scheme()
            )));
        }
        if self.refresh_timeout.is_zero() {
            return Err(ClientError::Configuration("refresh timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Absolute URL for an endpoint path
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

fn env_secs(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_joins_without_double_slash() {
        let config = ClientConfig::new("http://localhost:8000/");
        assert_eq!(config.url_for("/api/token/refresh/"), "http://localhost:8000/api/token/refresh/");
        assert_eq!(config.url_for("tasks/"), "http://localhost:8000/tasks/");
    }

    #[test]
    fn test_validate() {
        assert!(ClientConfig::default().validate().is_ok());
        assert!(ClientConfig::new("not a url").validate().is_err());
        assert!(ClientConfig::new("ftp://host").validate().is_err());
        assert!(ClientConfig::default()
            .with_refresh_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
