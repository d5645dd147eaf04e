use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::types::MergePolicy;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_REPLY_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_SUMMARY_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_CONFIG_FILENAME: &str = "minimusk.toml";

const ENV_CONFIG_FILE: &str = "MINIMUSK_CONFIG";
const ENV_API_KEYS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Empty when no credential is set; the service then rejects requests.
    pub api_key: String,
    pub base_url: String,
    pub reply_model: String,
    pub summary_model: String,
    pub temperature: f32,
    pub merge_policy: MergePolicy,
    pub timeout_ms: Option<u64>,
    pub proxy: Option<String>,
    pub log_dir: PathBuf,
    pub log_filter: String,
    pub opening_message: Option<String>,
}

/// Keys accepted in `minimusk.toml`. Credentials are env-only.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    reply_model: Option<String>,
    summary_model: Option<String>,
    temperature: Option<f32>,
    merge_policy: Option<MergePolicy>,
    timeout_ms: Option<u64>,
    log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            reply_model: DEFAULT_REPLY_MODEL.to_string(),
            summary_model: DEFAULT_SUMMARY_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            merge_policy: MergePolicy::default(),
            timeout_ms: None,
            proxy: None,
            log_dir: default_log_dir(),
            log_filter: "info".to_string(),
            opening_message: None,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file (if any), then the process environment.
    pub fn load() -> Result<(Self, Vec<String>)> {
        let mut config = Self::default();

        let explicit = std::env::var(ENV_CONFIG_FILE).ok().map(PathBuf::from);
        let path = explicit
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));
        if explicit.is_some() || path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read `{}`", path.display()))?;
            config
                .apply_toml(&text)
                .with_context(|| format!("invalid config file `{}`", path.display()))?;
        }

        let warnings = config.apply_env(|key| std::env::var(key).ok());
        Ok((config, warnings))
    }

    pub fn apply_toml(&mut self, text: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(text)?;
        if let Some(v) = file.base_url {
            self.base_url = v;
        }
        if let Some(v) = file.reply_model {
            self.reply_model = v;
        }
        if let Some(v) = file.summary_model {
            self.summary_model = v;
        }
        if let Some(v) = file.temperature {
            self.temperature = v;
        }
        if let Some(v) = file.merge_policy {
            self.merge_policy = v;
        }
        if let Some(v) = file.timeout_ms {
            self.timeout_ms = Some(v);
        }
        if let Some(v) = file.log_dir {
            self.log_dir = v;
        }
        Ok(())
    }

    /// Overlay environment values. Returns a warning per value that was ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut warnings = Vec::new();

        if let Some(key) = ENV_API_KEYS.iter().find_map(|&k| get(k)) {
            self.api_key = key;
        }
        if let Some(v) = get("GEMINI_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = get("MINIMUSK_REPLY_MODEL") {
            self.reply_model = v;
        }
        if let Some(v) = get("MINIMUSK_SUMMARY_MODEL") {
            self.summary_model = v;
        }
        if let Some(v) = get("MINIMUSK_TEMPERATURE") {
            match v.parse::<f32>() {
                Ok(t) if (0.0..=2.0).contains(&t) => self.temperature = t,
                _ => warnings.push(format!("ignoring MINIMUSK_TEMPERATURE={v}")),
            }
        }
        if let Some(v) = get("MINIMUSK_MERGE_POLICY") {
            match MergePolicy::parse(&v) {
                Some(policy) => self.merge_policy = policy,
                None => warnings.push(format!("ignoring MINIMUSK_MERGE_POLICY={v}")),
            }
        }
        if let Some(v) = get("API_TIMEOUT_MS") {
            match v.parse::<u64>() {
                Ok(ms) => self.timeout_ms = Some(ms),
                Err(_) => warnings.push(format!("ignoring API_TIMEOUT_MS={v}")),
            }
        }
        if let Some(v) = get("HTTP_PROXY") {
            self.proxy = Some(v);
        }
        if let Some(v) = get("MINIMUSK_LOG_DIR") {
            self.log_dir = PathBuf::from(v);
        }
        if let Some(v) = get("MINIMUSK_LOG") {
            self.log_filter = v;
        }
        if let Some(v) = get("MINIMUSK_OPENING") {
            self.opening_message = Some(v);
        }
        warnings
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join("minimusk.log")
    }

    pub fn audit_file(&self) -> PathBuf {
        self.log_dir.join("exchanges.jsonl")
    }
}

fn default_log_dir() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(Path::new(".minimusk"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_service_contract() {
        let config = Config::default();
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.merge_policy, MergePolicy::KeepOnEmpty);
        assert!(config.timeout_ms.is_none());
        assert!(!config.has_api_key());
    }

    #[test]
    fn toml_overrides_defaults() {
        let mut config = Config::default();
        config
            .apply_toml(
                r#"
                reply_model = "gemini-2.5-pro"
                merge_policy = "authoritative"
                timeout_ms = 30000
                "#,
            )
            .unwrap();
        assert_eq!(config.reply_model, "gemini-2.5-pro");
        assert_eq!(config.summary_model, DEFAULT_SUMMARY_MODEL);
        assert_eq!(config.merge_policy, MergePolicy::Authoritative);
        assert_eq!(config.timeout_ms, Some(30000));
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        let mut config = Config::default();
        assert!(config.apply_toml("api_key = \"nope\"").is_err());
    }

    #[test]
    fn env_overrides_toml() {
        let mut config = Config::default();
        config.apply_toml("reply_model = \"from-file\"").unwrap();
        let warnings = config.apply_env(env(&[
            ("MINIMUSK_REPLY_MODEL", "from-env"),
            ("API_KEY", "k-fallback"),
        ]));
        assert!(warnings.is_empty());
        assert_eq!(config.reply_model, "from-env");
        assert_eq!(config.api_key, "k-fallback");
    }

    #[test]
    fn gemini_key_wins_over_generic_key() {
        let mut config = Config::default();
        config.apply_env(env(&[("GEMINI_API_KEY", "k-gemini"), ("API_KEY", "k-generic")]));
        assert_eq!(config.api_key, "k-gemini");
    }

    #[test]
    fn bad_env_values_are_ignored_with_warnings() {
        let mut config = Config::default();
        let warnings = config.apply_env(env(&[
            ("MINIMUSK_TEMPERATURE", "hot"),
            ("MINIMUSK_MERGE_POLICY", "maybe"),
            ("API_TIMEOUT_MS", "-1"),
        ]));
        assert_eq!(warnings.len(), 3);
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.merge_policy, MergePolicy::KeepOnEmpty);
        assert_eq!(config.timeout_ms, None);
    }

    #[test]
    fn blank_env_values_count_as_unset() {
        let mut config = Config::default();
        config.apply_env(env(&[("GEMINI_API_KEY", "  ")]));
        assert!(!config.has_api_key());
    }
}
