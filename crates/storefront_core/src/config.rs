use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::filter::DEFAULT_PER_PAGE;

pub const DEFAULT_CONFIG_FILE: &str = "storefront.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorefrontConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub default_per_page: u32,
    pub location: Option<String>,
    pub user_id: Option<String>,
    pub access_token: Option<String>,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8088".into(),
            request_timeout_ms: 10_000,
            default_per_page: DEFAULT_PER_PAGE,
            location: None,
            user_id: None,
            access_token: None,
        }
    }
}

impl StorefrontConfig {
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.api_base_url)
            .with_context(|| format!("invalid api_base_url '{}'", self.api_base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("api_base_url must start with http:// or https://"));
        }
        if self.request_timeout_ms == 0 {
            return Err(anyhow!("request_timeout_ms must be positive"));
        }
        if self.default_per_page == 0 {
            return Err(anyhow!("default_per_page must be positive"));
        }
        Ok(())
    }
}

/// Defaults, then `storefront.toml` in the working directory, then the
/// environment.
pub fn load_config() -> Result<StorefrontConfig> {
    load_config_from(Path::new(DEFAULT_CONFIG_FILE), |key| std::env::var(key).ok())
}

pub fn load_config_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<StorefrontConfig> {
    let mut config = if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        toml::from_str::<StorefrontConfig>(&raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?
    } else {
        StorefrontConfig::default()
    };

    apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

fn lookup(env: &impl Fn(&str) -> Option<String>, keys: [&str; 2]) -> Option<String> {
    keys.iter().find_map(|key| env(*key))
}

fn apply_env_overrides(
    config: &mut StorefrontConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(v) = lookup(&env, ["APP__API_BASE_URL", "STOREFRONT_API_URL"]) {
        config.api_base_url = v;
    }
    if let Some(v) = lookup(&env, ["APP__REQUEST_TIMEOUT_MS", "STOREFRONT_TIMEOUT_MS"]) {
        config.request_timeout_ms = v
            .parse()
            .with_context(|| format!("invalid request timeout '{v}'"))?;
    }
    if let Some(v) = lookup(&env, ["APP__DEFAULT_PER_PAGE", "STOREFRONT_PER_PAGE"]) {
        config.default_per_page = v
            .parse()
            .with_context(|| format!("invalid page size '{v}'"))?;
    }
    if let Some(v) = lookup(&env, ["APP__LOCATION", "STOREFRONT_LOCATION"]) {
        config.location = Some(v);
    }
    if let Some(v) = lookup(&env, ["APP__USER_ID", "STOREFRONT_USER_ID"]) {
        config.user_id = Some(v);
    }
    if let Some(v) = lookup(&env, ["APP__ACCESS_TOKEN", "STOREFRONT_TOKEN"]) {
        config.access_token = Some(v);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::TempDir;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn temp_config(contents: &str) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, contents).expect("write config");
        (dir, path)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config_from(Path::new("does/not/exist.toml"), no_env).expect("config");
        assert_eq!(config, StorefrontConfig::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let (_dir, path) = temp_config(
            "api_base_url = \"https://shop.example\"\ndefault_per_page = 12\nlocation = \"Lagos\"\n",
        );
        let config = load_config_from(&path, no_env).expect("config");
        assert_eq!(config.api_base_url, "https://shop.example");
        assert_eq!(config.default_per_page, 12);
        assert_eq!(config.location.as_deref(), Some("Lagos"));
        assert_eq!(config.request_timeout_ms, 10_000);
    }

    #[test]
    fn environment_overrides_file_and_app_prefix_wins() {
        let (_dir, path) = temp_config("default_per_page = 12\n");
        let vars = HashMap::from([
            ("STOREFRONT_PER_PAGE", "30"),
            ("APP__DEFAULT_PER_PAGE", "40"),
            ("STOREFRONT_USER_ID", "user-7"),
        ]);
        let config = load_config_from(&path, |key| vars.get(key).map(|v| v.to_string()))
            .expect("config");

        assert_eq!(config.default_per_page, 40);
        assert_eq!(config.user_id.as_deref(), Some("user-7"));
    }

    #[test]
    fn rejects_invalid_values() {
        let bad_url = HashMap::from([("STOREFRONT_API_URL", "ftp://shop")]);
        assert!(load_config_from(Path::new("missing.toml"), |key| bad_url
            .get(key)
            .map(|v| v.to_string()))
        .is_err());

        let bad_page = HashMap::from([("STOREFRONT_PER_PAGE", "0")]);
        assert!(load_config_from(Path::new("missing.toml"), |key| bad_page
            .get(key)
            .map(|v| v.to_string()))
        .is_err());
    }
}
