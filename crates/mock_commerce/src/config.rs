use std::{collections::HashMap, fs, path::PathBuf};

use anyhow::Context;
use shared::protocol::Product;

use crate::api::demo_catalog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: String,
    /// JSON array of products; the built-in demo catalog is used when unset.
    pub seed_catalog: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8088".into(),
            seed_catalog: None,
        }
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string("mock_commerce.toml").ok();
    settings_from(file.as_deref(), |key| std::env::var(key).ok())
}

fn settings_from(file: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
            if let Some(v) = file_cfg.get("bind_addr") {
                settings.bind_addr = v.clone();
            }
            if let Some(v) = file_cfg.get("seed_catalog") {
                settings.seed_catalog = Some(PathBuf::from(v));
            }
        }
    }

    if let Some(v) = env("MOCK_BIND") {
        settings.bind_addr = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.bind_addr = v;
    }

    if let Some(v) = env("MOCK_SEED_CATALOG") {
        settings.seed_catalog = Some(PathBuf::from(v));
    }
    if let Some(v) = env("APP__SEED_CATALOG") {
        settings.seed_catalog = Some(PathBuf::from(v));
    }

    settings
}

pub fn load_catalog(settings: &Settings) -> anyhow::Result<Vec<Product>> {
    let Some(path) = &settings.seed_catalog else {
        return Ok(demo_catalog());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read seed catalog '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse seed catalog '{}'", path.display()))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
