//! OpenRouter connection settings

use std::fmt;
use std::time::Duration;

use crumbs_core::{EngineConfig, DEFAULT_MODEL};

/// Public OpenRouter API root.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Per-request HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone)]
pub struct OpenRouterConfig {
    /// Bearer token; requests are never attempted without one.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Sent as `X-Title` so usage shows up under this name on OpenRouter.
    pub app_name: Option<String>,
}

impl OpenRouterConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            app_name: None,
        }
    }

    /// Read `OPENROUTER_API_KEY`, `OPENROUTER_MODEL`, `OPENROUTER_BASE_URL`
    /// and `OPENROUTER_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`OpenRouterConfig::from_env`] with a custom variable source.
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            api_key: var("OPENROUTER_API_KEY"),
            model: var("OPENROUTER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: var("OPENROUTER_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout_secs: var("OPENROUTER_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            app_name: var("OPENROUTER_APP_NAME"),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Credentials and a model are both present.
    pub fn is_available(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty()) && !self.model.trim().is_empty()
    }

    /// `{base_url}/chat/completions`, tolerating a trailing slash.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Engine configuration whose availability and model mirror this one.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            api_available: self.is_available(),
            model: self.model.clone(),
            ..EngineConfig::default()
        }
    }
}

impl fmt::Debug for OpenRouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("app_name", &self.app_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = OpenRouterConfig::from_lookup(lookup(&[]));
        assert_eq!(config.api_key, None);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(!config.is_available());
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = OpenRouterConfig::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "sk-or-test"),
            ("OPENROUTER_MODEL", "openai/gpt-4o-mini"),
            ("OPENROUTER_BASE_URL", "http://localhost:8080/v1/"),
            ("OPENROUTER_TIMEOUT_SECS", "15"),
        ]));
        assert!(config.is_available());
        assert_eq!(config.model, "openai/gpt-4o-mini");
        assert_eq!(config.timeout_secs, 15);
        assert_eq!(config.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_blank_and_invalid_values_fall_back() {
        let config = OpenRouterConfig::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "   "),
            ("OPENROUTER_TIMEOUT_SECS", "soon"),
        ]));
        assert_eq!(config.api_key, None);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_engine_config_mirrors_availability() {
        let engine = OpenRouterConfig::new("sk-or-test")
            .with_model("meta/llama")
            .engine_config();
        assert!(engine.api_available);
        assert_eq!(engine.model, "meta/llama");

        let offline = OpenRouterConfig::from_lookup(lookup(&[])).engine_config();
        assert!(!offline.api_available);
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", OpenRouterConfig::new("sk-or-secret"));
        assert!(!rendered.contains("sk-or-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
