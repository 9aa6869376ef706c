use opencode_cli::Config;
use opencode_client::{PreferenceStore, Preferences, TomlPreferenceStore};
use std::io::Write;

#[test]
fn test_config_from_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[client]
base_url = "http://127.0.0.1:4096/"
request_timeout_secs = 5

[logging]
level = "info"
"#
    )
    .unwrap();

    let mut config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.client.request_timeout_secs, 5);
    assert_eq!(config.client.reconnect.base_delay_ms, 1_000);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "compact");

    let resolved = config.resolve_base_url(None, &Preferences::default());
    assert_eq!(resolved, Some("http://127.0.0.1:4096"));
}

#[test]
fn test_saved_server_used_when_unconfigured() {
    let dir = tempfile::tempdir().unwrap();
    let store = TomlPreferenceStore::new(dir.path().join("nested").join("prefs.toml"));
    store
        .update(&mut |prefs| {
            prefs.base_url = "http://saved.local:4096".to_string();
            prefs.has_completed_setup = true;
        })
        .unwrap();

    let mut config = Config {
        preferences_path: Some(store.path().to_path_buf()),
        ..Default::default()
    };
    let preferences = store.load().unwrap();

    assert_eq!(
        config.resolve_base_url(None, &preferences),
        Some("http://saved.local:4096")
    );
    assert_eq!(config.preferences_path(), store.path());
}
