use puppet_core::{resolve_url, ManifestFormat, ModelManifest};
use puppet_test_fixtures::models;
use serde_json::{json, Value};

fn load(name: &str) -> ModelManifest {
    let json: Value = models::manifest(name).unwrap();
    let url = models::manifest_rel(name).unwrap();
    ModelManifest::parse(&json, url).unwrap()
}

/// it should normalize a modern manifest with groups, hit areas and layout
#[test]
fn modern_manifest_normalizes() {
    let m = load("haru");
    assert_eq!(m.format, ManifestFormat::Modern);
    assert_eq!(m.name, "haru");
    assert_eq!(m.core_file, "haru.moc3");
    assert_eq!(m.texture_files.len(), 2);
    assert_eq!(m.physics_file.as_deref(), Some("haru.physics3.json"));
    assert_eq!(m.motion_groups.keys().collect::<Vec<_>>(), vec!["Idle", "TapBody"]);
    assert_eq!(m.motion_groups["Idle"][0].fade_in_secs, Some(0.5));
    assert_eq!(
        m.motion_groups["TapBody"][0].sound.as_deref(),
        Some("sounds/tap_body_01.wav")
    );
    assert_eq!(m.parameter_groups.eye_blink, vec!["ParamEyeLOpen", "ParamEyeROpen"]);
    assert_eq!(m.parameter_groups.lip_sync, vec!["ParamMouthOpenY"]);
    assert_eq!(m.hit_areas[0].name, "Head");
    assert_eq!(m.layout.width, Some(2.0));
    assert_eq!(m.layout.center_x, Some(0.0));
    assert_eq!(m.idle_group(), "Idle");
}

/// it should normalize a legacy manifest into the same shape, converting fades to seconds
#[test]
fn legacy_manifest_normalizes_to_same_shape() {
    let m = load("shizuku");
    assert_eq!(m.format, ManifestFormat::Legacy);
    assert_eq!(m.name, "shizuku");
    assert_eq!(m.core_file, "shizuku.moc");
    assert_eq!(m.pose_file.as_deref(), Some("shizuku.pose.json"));
    assert_eq!(m.motion_groups.keys().collect::<Vec<_>>(), vec!["idle", "tap_body"]);
    assert_eq!(m.motion_groups["idle"][0].fade_in_secs, Some(2.0));
    assert_eq!(m.motion_groups["idle"][1].fade_in_secs, None);
    assert_eq!(m.expressions[0].name, "f01");
    assert_eq!(m.hit_areas[1].id, "D_REF.BODY");
    assert_eq!(m.layout.y, Some(1.2));
    assert_eq!(
        m.parameter_groups.eye_blink,
        vec!["PARAM_EYE_L_OPEN", "PARAM_EYE_R_OPEN"]
    );
    assert_eq!(m.parameter_groups.lip_sync, vec!["PARAM_MOUTH_OPEN_Y"]);
    assert_eq!(m.idle_group(), "idle");
}

/// it should reject documents lacking a core file or string textures
#[test]
fn structural_validation() {
    assert!(!ModelManifest::validate_json(&json!({"FileReferences": {"Moc": "a.moc3"}})));
    assert!(!ModelManifest::validate_json(&json!({"model": 3, "textures": ["a.png"]})));
    assert!(ModelManifest::validate_json(
        &json!({"model": "a.moc", "textures": ["a.png"]})
    ));
    assert!(ModelManifest::parse(&json!({"textures": []}), "x.json").is_err());
    assert!(
        ModelManifest::parse_as(
            ManifestFormat::Modern,
            &json!({"model": "a.moc", "textures": ["a.png"]}),
            "x.json"
        )
        .is_err()
    );
}

/// it should visit file fields in a fixed order with RFC 6901 pointers
#[test]
fn resolve_paths_order_and_pointers() {
    let mut m = load("haru");
    assert!(!m.paths_resolved);
    let mut visited = Vec::new();
    m.resolve_paths(|value, pointer| {
        visited.push(pointer.to_string());
        resolve_url("https://cdn.test/models/haru/haru.model3.json", value)
    });
    assert_eq!(
        visited,
        vec![
            "/core_file",
            "/texture_files/0",
            "/texture_files/1",
            "/physics_file",
            "/pose_file",
            "/motion_groups/Idle/0/file",
            "/motion_groups/TapBody/0/file",
            "/motion_groups/TapBody/0/sound",
            "/expressions/0/file",
        ]
    );
    assert!(m.paths_resolved);
    assert_eq!(m.core_file, "https://cdn.test/models/haru/haru.moc3");
    assert_eq!(
        m.motion_groups["TapBody"][0].sound.as_deref(),
        Some("https://cdn.test/models/haru/sounds/tap_body_01.wav")
    );
}
