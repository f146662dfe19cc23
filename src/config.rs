#[derive(Clone, Debug)]
pub struct Config {
    pub service_url: String,
    /// `memory` selects the plain map store; anything else is a SQLite path.
    pub storage_path: String,
    pub request_timeout_ms: u64,
    pub retry_max: u32,
    pub retry_base_ms: u64,
    pub retry_max_delay_ms: u64,
    pub user_agent: Option<String>,
    pub offline: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:8080/API/".to_string(),
            storage_path: ":memory:".to_string(),
            request_timeout_ms: 10_000,
            retry_max: 3,
            retry_base_ms: 100,
            retry_max_delay_ms: 2_000,
            user_agent: None,
            offline: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            service_url: std::env::var("SERVICE_URL").unwrap_or(d.service_url),
            storage_path: std::env::var("STORAGE_PATH").unwrap_or(d.storage_path),
            request_timeout_ms: std::env::var("HTTP_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.request_timeout_ms),
            retry_max: std::env::var("RETRY_MAX").ok().and_then(|v| v.parse().ok()).unwrap_or(d.retry_max),
            retry_base_ms: std::env::var("RETRY_BASE_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.retry_base_ms),
            retry_max_delay_ms: std::env::var("RETRY_MAX_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.retry_max_delay_ms),
            user_agent: std::env::var("CLIENT_USER_AGENT").ok(),
            offline: std::env::var("OFFLINE").map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes")).unwrap_or(false),
        }
    }

    pub fn is_mobile(&self) -> bool {
        self.user_agent.as_deref().map(crate::session::is_mobile_agent).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_ephemeral() {
        let cfg = Config::default();
        assert_eq!(cfg.storage_path, ":memory:");
        assert!(!cfg.offline);
        assert!(!cfg.is_mobile());
    }

    #[test]
    fn test_mobile_flag_follows_user_agent() {
        let cfg = Config {
            user_agent: Some("Mozilla/5.0 (Linux; Android 14; Pixel 8)".to_string()),
            ..Default::default()
        };
        assert!(cfg.is_mobile());
    }
}
