use duplex_audio::config::{ConfigError, ConfigManager, StreamConfig};
use tempfile::TempDir;

#[test]
fn test_missing_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stream.json");

    let config = ConfigManager::load(&path).unwrap();
    assert_eq!(config, StreamConfig::default());
}

#[test]
fn test_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("stream.json");

    let config = StreamConfig::default()
        .with_sample_rate(44100.0)
        .with_frames_per_buffer(256)
        .with_warn_xruns(false);
    ConfigManager::save(&path, &config).unwrap();
    assert!(path.exists());

    let loaded = ConfigManager::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_delete() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stream.json");

    ConfigManager::save(&path, &StreamConfig::default()).unwrap();
    ConfigManager::delete(&path).unwrap();
    assert!(!path.exists());

    // Deleting again is fine
    ConfigManager::delete(&path).unwrap();
}

#[test]
fn test_invalid_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stream.json");
    std::fs::write(&path, "{ not json").unwrap();

    match ConfigManager::load(&path) {
        Err(ConfigError::Json(_)) => {}
        other => panic!("Expected a JSON error, got {:?}", other),
    }
}
