use core_governor::PriorityClass;
use core_governor::models::{
    CURRENT_CONFIG_VERSION, CoreMask, EngineConfig, PolicyProfile, SchedulingMode, TrimMode,
};
use serde_json::json;
use tempfile::TempDir;

#[test]
fn save_then_load_keeps_every_section() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.json");

    let mut config = EngineConfig::default();
    config.upsert_profile(
        PolicyProfile::new("Game.exe", CoreMask::from_hex("1FFFFFFFFFFFFFFFF").unwrap(), SchedulingMode::Balanced)
            .with_priority(PriorityClass::AboveNormal)
            .with_primary_core(4),
    );
    config.set_value("gameList", json!(["Other.exe"])).unwrap();
    config.set_value("smartTrim", json!({"enabled": true, "mode": "working-set"})).unwrap();
    config.save(&path).unwrap();

    let loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.smart_trim.mode, TrimMode::WorkingSet);
    assert_eq!(loaded.smart_trim.threshold_percent, 80.0);

    let profile = loaded.profile_for("game.exe").unwrap();
    assert_eq!(profile.mask.count_ones(), 65);
    assert_eq!(profile.primary_core, Some(4));
}

#[test]
fn persisted_form_uses_hex_masks_and_mode_tags() {
    let mut config = EngineConfig::default();
    config.upsert_profile(PolicyProfile::new("cs2.exe", CoreMask::from(0xFF00), SchedulingMode::Ultimate));
    let value = serde_json::to_value(&config).unwrap();

    assert_eq!(value["version"], json!(CURRENT_CONFIG_VERSION));
    assert_eq!(value["profiles"][0]["name"], json!("cs2.exe"));
    assert_eq!(value["profiles"][0]["mask"], json!("FF00"));
    assert_eq!(value["profiles"][0]["mode"], json!("d3"));
    assert_eq!(value["defaultRules"]["gamePriority"], json!("High"));
    assert_eq!(value["tickIntervalSecs"], json!(5));
}

#[test]
fn missing_file_is_created_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.json");

    let config = EngineConfig::load_or_default(&path);
    assert_eq!(config, EngineConfig::default());
    assert!(path.exists());
    assert_eq!(EngineConfig::load(&path).unwrap(), config);
}

#[test]
fn corrupt_file_falls_back_without_overwriting() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.json");
    std::fs::write(&path, "{ not json").unwrap();

    let config = EngineConfig::load_or_default(&path);
    assert_eq!(config, EngineConfig::default());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    assert!(EngineConfig::load(&path).is_err());
}

#[test]
fn version_one_file_is_migrated_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.json");
    std::fs::write(
        &path,
        r#"{"profiles":[{"name":"Game.exe","affinity":"FFFF","mode":"static","primaryCore":3}]}"#,
    )
    .unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.version, CURRENT_CONFIG_VERSION);
    let profile = config.profile_for("game.exe").unwrap();
    assert_eq!(profile.mode, SchedulingMode::Static);
    assert_eq!(profile.primary_core, Some(3));
    assert_eq!(profile.mask, CoreMask::from(0xFFFF));
}

#[test]
fn bad_mask_in_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.json");
    std::fs::write(
        &path,
        r#"{"version":2,"profiles":[{"name":"x.exe","mask":"GG"}]}"#,
    )
    .unwrap();
    assert!(EngineConfig::load(&path).is_err());
}
