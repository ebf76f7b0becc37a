use crate::storage::resolve_data_path;
use std::{env, path::PathBuf, time::Duration};

pub const DEFAULT_CONTENT_API_URL: &str = "https://directus-production-3727.up.railway.app";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the headless content API, without a trailing slash.
    pub content_api_url: String,
    pub fetch_timeout: Duration,
    pub data_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            content_api_url: DEFAULT_CONTENT_API_URL.to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            data_path: PathBuf::from("data/state.json"),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let content_api_url = env::var("DIRECTUS_URL")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_API_URL.to_string());
        let fetch_timeout = env::var("CONTENT_API_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_FETCH_TIMEOUT);

        Self {
            content_api_url,
            fetch_timeout,
            data_path: resolve_data_path(),
        }
    }

    pub fn with_content_api_url(mut self, url: impl Into<String>) -> Self {
        self.content_api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}
