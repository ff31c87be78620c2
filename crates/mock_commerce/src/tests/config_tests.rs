use std::{collections::HashMap, fs, path::Path};

use super::{load_catalog, settings_from, Settings};

fn env_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_apply_without_file_or_env() {
    assert_eq!(settings_from(None, env_from(&[])), Settings::default());
}

#[test]
fn file_then_env_then_app_prefix() {
    let file = "bind_addr = \"0.0.0.0:9000\"\nseed_catalog = \"seed.json\"\n";
    let settings = settings_from(Some(file), env_from(&[]));
    assert_eq!(settings.bind_addr, "0.0.0.0:9000");
    assert_eq!(settings.seed_catalog.as_deref(), Some(Path::new("seed.json")));

    let settings = settings_from(Some(file), env_from(&[("MOCK_BIND", "127.0.0.1:1")]));
    assert_eq!(settings.bind_addr, "127.0.0.1:1");

    let settings = settings_from(
        Some(file),
        env_from(&[("MOCK_BIND", "127.0.0.1:1"), ("APP__BIND_ADDR", "127.0.0.1:2")]),
    );
    assert_eq!(settings.bind_addr, "127.0.0.1:2");
}

#[test]
fn unparsable_file_is_ignored() {
    let settings = settings_from(Some("this is not toml ["), env_from(&[]));
    assert_eq!(settings, Settings::default());
}

#[test]
fn demo_catalog_is_used_without_seed_file() {
    let products = load_catalog(&Settings::default()).expect("catalog");
    assert!(!products.is_empty());
}

#[test]
fn seed_file_replaces_demo_catalog() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let path = dir.path().join("seed.json");
    fs::write(
        &path,
        r#"[{"_id":"only","name":"Only Product","price":10.9,"countInStock":1}]"#,
    )
    .expect("write seed");

    let settings = Settings {
        seed_catalog: Some(path),
        ..Settings::default()
    };
    let products = load_catalog(&settings).expect("catalog");
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].id.as_str(), "only");
    assert_eq!(products[0].price.0, 10);
}

#[test]
fn broken_seed_file_is_an_error() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let path = dir.path().join("seed.json");
    fs::write(&path, "{ not json").expect("write seed");
    let settings = Settings {
        seed_catalog: Some(path),
        ..Settings::default()
    };
    assert!(load_catalog(&settings).is_err());

    let missing = Settings {
        seed_catalog: Some(dir.path().join("missing.json")),
        ..Settings::default()
    };
    assert!(load_catalog(&missing).is_err());
}
