use std::fs::File;

use swcache::config::{Config, ConfigProperties};
use swcache::error::SWError;

#[test]
fn test_read_config_fixture() {
    let f = File::open("./tests/fixtures/config.toml").unwrap();
    let config = Config::new(f, "space-explorer").unwrap();
    assert_eq!("v2", config.version());
    assert_eq!("http://localhost:8080", config.origin());
    assert_eq!(Some("./tests/fixtures/precache.txt"), config.manifest());
    assert_eq!(Some("/tmp/swcache"), config.cache_location());
    assert_eq!("/offline.html", config.offline_fallback());
    assert!(config.skip_waiting());
    assert_eq!(120, *config.network_timeout());
}

#[test]
fn test_read_config_fixture_defaults() {
    let f = File::open("./tests/fixtures/config.toml").unwrap();
    let config = Config::new(f, "default").unwrap();
    assert_eq!("v1", config.version());
    assert_eq!(None, config.manifest());
    assert_eq!("/index.html", config.offline_fallback());
    assert!(!config.skip_waiting());
    assert_eq!(30, *config.network_timeout());
}

#[test]
fn test_read_config_unknown_app_is_error() {
    let f = File::open("./tests/fixtures/config.toml").unwrap();
    let err = Config::new(f, "unknown-app").unwrap_err();
    match err.downcast_ref::<SWError>() {
        Some(SWError::ConfigurationError(msg)) => assert!(msg.contains("unknown-app")),
        _ => panic!("Expected ConfigurationError"),
    }
}

#[test]
fn test_fixture_manifest_loads() {
    let f = File::open("./tests/fixtures/config.toml").unwrap();
    let config = Config::new(f, "space-explorer").unwrap();
    let manifest = swcache::manifest::Manifest::from_file(config.manifest().unwrap()).unwrap();
    assert_eq!(
        vec!["/", "/index.html", "/css/style.css", "/js/app.js", "/data/topics.json"],
        manifest.urls()
    );
}
