//! Model manifest normalization.
//!
//! Two manifest generations exist: the legacy `model.json` shape (lower-case keys, fades
//! in milliseconds) and the modern `model3.json` shape (`FileReferences`, fades in
//! seconds). Both normalize into [`ModelManifest`].
//!
//! Notes:
//! - Group order and in-group order follow the source document.
//! - File references stay manifest-relative until [`ModelManifest::resolve_paths`] runs.
//! - Legacy manifests carry no parameter groups; the legacy default ids are filled in.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ManifestError;
use crate::layout::LayoutSpec;

/// Manifest generation, one per native engine generation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManifestFormat {
    /// `model.json`: generation 2 engines.
    Legacy,
    /// `model3.json`: generation 3 and later engines.
    Modern,
}

impl ManifestFormat {
    /// Structural check: a core file reference and a non-empty list of string textures.
    pub fn is_valid_json(self, json: &JsonValue) -> bool {
        let (core, textures) = match self {
            ManifestFormat::Modern => {
                let refs = json.get("FileReferences");
                (
                    refs.and_then(|r| r.get("Moc")),
                    refs.and_then(|r| r.get("Textures")),
                )
            }
            ManifestFormat::Legacy => (json.get("model"), json.get("textures")),
        };
        let core_ok = core.map_or(false, |c| c.is_string());
        let textures_ok = textures
            .and_then(|t| t.as_array())
            .map_or(false, |t| !t.is_empty() && t.iter().all(|item| item.is_string()));
        core_ok && textures_ok
    }

    /// First format whose structural check accepts the document; modern is tried first.
    pub fn detect(json: &JsonValue) -> Option<Self> {
        [ManifestFormat::Modern, ManifestFormat::Legacy]
            .into_iter()
            .find(|f| f.is_valid_json(json))
    }

    pub fn idle_group(self) -> &'static str {
        match self {
            ManifestFormat::Legacy => "idle",
            ManifestFormat::Modern => "Idle",
        }
    }

    pub fn standard_parameter_ids(self) -> StandardParameterIds {
        match self {
            ManifestFormat::Legacy => StandardParameterIds {
                angle_x: "PARAM_ANGLE_X".into(),
                angle_y: "PARAM_ANGLE_Y".into(),
                angle_z: "PARAM_ANGLE_Z".into(),
                eye_ball_x: "PARAM_EYE_BALL_X".into(),
                eye_ball_y: "PARAM_EYE_BALL_Y".into(),
                body_angle_x: "PARAM_BODY_ANGLE_X".into(),
                breath: "PARAM_BREATH".into(),
            },
            ManifestFormat::Modern => StandardParameterIds {
                angle_x: "ParamAngleX".into(),
                angle_y: "ParamAngleY".into(),
                angle_z: "ParamAngleZ".into(),
                eye_ball_x: "ParamEyeBallX".into(),
                eye_ball_y: "ParamEyeBallY".into(),
                body_angle_x: "ParamBodyAngleX".into(),
                breath: "ParamBreath".into(),
            },
        }
    }

    fn default_parameter_groups(self) -> ParameterGroups {
        match self {
            ManifestFormat::Legacy => ParameterGroups {
                eye_blink: vec!["PARAM_EYE_L_OPEN".into(), "PARAM_EYE_R_OPEN".into()],
                lip_sync: vec!["PARAM_MOUTH_OPEN_Y".into()],
            },
            ManifestFormat::Modern => ParameterGroups::default(),
        }
    }
}

/// Parameter ids driven by focus and breath.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardParameterIds {
    pub angle_x: String,
    pub angle_y: String,
    pub angle_z: String,
    pub eye_ball_x: String,
    pub eye_ball_y: String,
    pub body_angle_x: String,
    pub breath: String,
}

/// Parameter ids the engine treats as eye-blink and lip-sync targets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterGroups {
    pub eye_blink: Vec<String>,
    pub lip_sync: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionDefinition {
    pub file: String,
    #[serde(default)]
    pub sound: Option<String>,
    /// Explicit fade-in in seconds; wins over the payload and config defaults.
    #[serde(default)]
    pub fade_in_secs: Option<f32>,
    #[serde(default)]
    pub fade_out_secs: Option<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpressionDefinition {
    pub name: String,
    pub file: String,
    #[serde(default)]
    pub fade_in_secs: Option<f32>,
    #[serde(default)]
    pub fade_out_secs: Option<f32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitAreaDefinition {
    pub id: String,
    pub name: String,
}

/// Normalized model description, independent of the source generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub format: ManifestFormat,
    pub url: String,
    pub name: String,
    pub core_file: String,
    pub texture_files: Vec<String>,
    pub physics_file: Option<String>,
    pub pose_file: Option<String>,
    pub motion_groups: IndexMap<String, Vec<MotionDefinition>>,
    pub expressions: Vec<ExpressionDefinition>,
    pub hit_areas: Vec<HitAreaDefinition>,
    pub layout: LayoutSpec,
    pub parameter_groups: ParameterGroups,
    /// Set once [`Self::resolve_paths`] has rewritten the file fields.
    #[serde(default)]
    pub paths_resolved: bool,
}

impl ModelManifest {
    /// Structural check against every known generation.
    pub fn validate_json(json: &JsonValue) -> bool {
        ManifestFormat::detect(json).is_some()
    }

    /// Parse a document of either generation.
    pub fn parse(json: &JsonValue, url: &str) -> Result<Self, ManifestError> {
        let format = ManifestFormat::detect(json).ok_or_else(|| {
            ManifestError::Invalid(
                "missing core file reference or non-empty string texture list".into(),
            )
        })?;
        Self::parse_as(format, json, url)
    }

    /// Parse a document as a specific generation.
    pub fn parse_as(
        format: ManifestFormat,
        json: &JsonValue,
        url: &str,
    ) -> Result<Self, ManifestError> {
        if !format.is_valid_json(json) {
            return Err(ManifestError::Invalid(format!(
                "document is not a valid {format:?} manifest"
            )));
        }
        let manifest = match format {
            ManifestFormat::Modern => {
                let raw: Model3Json = serde_json::from_value(json.clone())?;
                raw.normalize(url)
            }
            ManifestFormat::Legacy => {
                let raw: LegacyModelJson = serde_json::from_value(json.clone())?;
                raw.normalize(url)
            }
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Invariant check on a normalized manifest.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.core_file.is_empty() {
            return Err(ManifestError::Invalid("core file reference is empty".into()));
        }
        if self.texture_files.is_empty() {
            return Err(ManifestError::Invalid("no texture files".into()));
        }
        if self.texture_files.iter().any(|t| t.is_empty()) {
            return Err(ManifestError::Invalid("empty texture file reference".into()));
        }
        Ok(())
    }

    pub fn idle_group(&self) -> &'static str {
        self.format.idle_group()
    }

    /// Apply `resolver(value, json_pointer)` to every file-valued field, in order: core
    /// file, textures, physics, pose, motions (group by group, file then sound), expressions.
    pub fn resolve_paths<F>(&mut self, mut resolver: F)
    where
        F: FnMut(&str, &str) -> String,
    {
        self.core_file = resolver(&self.core_file, "/core_file");

        for (i, tex) in self.texture_files.iter_mut().enumerate() {
            *tex = resolver(tex, &format!("/texture_files/{i}"));
        }

        if let Some(physics) = self.physics_file.as_mut() {
            *physics = resolver(physics, "/physics_file");
        }
        if let Some(pose) = self.pose_file.as_mut() {
            *pose = resolver(pose, "/pose_file");
        }

        for (group, motions) in self.motion_groups.iter_mut() {
            let group = escape_pointer_token(group);
            for (i, motion) in motions.iter_mut().enumerate() {
                motion.file = resolver(&motion.file, &format!("/motion_groups/{group}/{i}/file"));
                if let Some(sound) = motion.sound.as_mut() {
                    *sound = resolver(sound, &format!("/motion_groups/{group}/{i}/sound"));
                }
            }
        }

        for (i, expr) in self.expressions.iter_mut().enumerate() {
            expr.file = resolver(&expr.file, &format!("/expressions/{i}/file"));
        }
        self.paths_resolved = true;
    }

    pub fn motion_definition(&self, group: &str, index: usize) -> Option<&MotionDefinition> {
        self.motion_groups.get(group).and_then(|g| g.get(index))
    }

    pub fn expression_index(&self, name: &str) -> Option<usize> {
        self.expressions.iter().position(|e| e.name == name)
    }
}

fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn name_from_url(url: &str) -> String {
    let file = url.rsplit(['/', '\\']).next().unwrap_or(url);
    file.split('.').next().unwrap_or(file).to_string()
}

/// Resolve `relative` against the location of `base`. Absolute references (with a scheme,
/// a leading `/`, or a data URI) are returned unchanged.
pub fn resolve_url(base: &str, relative: &str) -> String {
    if relative.contains("://") || relative.starts_with('/') || relative.starts_with("data:") {
        return relative.to_string();
    }

    let dir = base.rfind('/').map(|i| &base[..=i]).unwrap_or("");
    let (origin, dir_path) = split_origin(dir);
    let absolute = dir_path.starts_with('/');

    let mut out: Vec<&str> = Vec::new();
    for seg in dir_path.split('/').chain(relative.split('/')) {
        match seg {
            "" | "." => {}
            ".." => {
                if out.last().map_or(false, |s| *s != "..") {
                    out.pop();
                } else if !absolute {
                    out.push("..");
                }
            }
            s => out.push(s),
        }
    }

    let root = if absolute { "/" } else { "" };
    format!("{origin}{root}{}", out.join("/"))
}

fn split_origin(s: &str) -> (&str, &str) {
    match s.find("://") {
        Some(scheme_end) => {
            let after = scheme_end + 3;
            match s[after..].find('/') {
                Some(i) => s.split_at(after + i),
                None => (s, ""),
            }
        }
        None => ("", s),
    }
}

fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn layout_from_keys(raw: IndexMap<String, f32>) -> LayoutSpec {
    let normalized: IndexMap<String, f32> =
        raw.into_iter().map(|(k, v)| (snake_case(&k), v)).collect();
    LayoutSpec::from_map(&normalized)
}

/// Only positive fades override; zero or negative fall through to the payload or default.
fn explicit(v: Option<f32>) -> Option<f32> {
    v.filter(|v| *v > 0.0)
}

// ----- JSON schema: model3.json (serde) -----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Model3Json {
    file_references: Model3FileReferences,
    #[serde(default)]
    groups: Vec<Model3Group>,
    #[serde(default)]
    hit_areas: Vec<Model3HitArea>,
    #[serde(default)]
    layout: IndexMap<String, f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Model3FileReferences {
    moc: String,
    textures: Vec<String>,
    #[serde(default)]
    physics: Option<String>,
    #[serde(default)]
    pose: Option<String>,
    #[serde(default)]
    motions: IndexMap<String, Vec<Model3Motion>>,
    #[serde(default)]
    expressions: Vec<Model3Expression>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Model3Motion {
    file: String,
    #[serde(default)]
    sound: Option<String>,
    #[serde(default)]
    fade_in_time: Option<f32>,
    #[serde(default)]
    fade_out_time: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Model3Expression {
    name: String,
    file: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Model3Group {
    target: String,
    name: String,
    #[serde(default)]
    ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Model3HitArea {
    id: String,
    name: String,
}

impl Model3Json {
    fn normalize(self, url: &str) -> ModelManifest {
        let refs = self.file_references;

        let mut parameter_groups = ParameterGroups::default();
        for group in self.groups.into_iter().filter(|g| g.target == "Parameter") {
            match group.name.as_str() {
                "EyeBlink" => parameter_groups.eye_blink.extend(group.ids),
                "LipSync" => parameter_groups.lip_sync.extend(group.ids),
                _ => {}
            }
        }

        let motion_groups = refs
            .motions
            .into_iter()
            .map(|(group, motions)| {
                let defs = motions
                    .into_iter()
                    .map(|m| MotionDefinition {
                        file: m.file,
                        sound: m.sound,
                        fade_in_secs: explicit(m.fade_in_time),
                        fade_out_secs: explicit(m.fade_out_time),
                    })
                    .collect();
                (group, defs)
            })
            .collect();

        ModelManifest {
            format: ManifestFormat::Modern,
            url: url.to_string(),
            name: name_from_url(url),
            core_file: refs.moc,
            texture_files: refs.textures,
            physics_file: refs.physics.filter(|p| !p.is_empty()),
            pose_file: refs.pose.filter(|p| !p.is_empty()),
            motion_groups,
            expressions: refs
                .expressions
                .into_iter()
                .map(|e| ExpressionDefinition {
                    name: e.name,
                    file: e.file,
                    fade_in_secs: None,
                    fade_out_secs: None,
                })
                .collect(),
            hit_areas: self
                .hit_areas
                .into_iter()
                .map(|h| HitAreaDefinition {
                    id: h.id,
                    name: h.name,
                })
                .collect(),
            layout: layout_from_keys(self.layout),
            parameter_groups,
            paths_resolved: false,
        }
    }
}

// ----- JSON schema: legacy model.json (serde) -----

#[derive(Debug, Deserialize)]
struct LegacyModelJson {
    #[serde(default)]
    name: Option<String>,
    model: String,
    textures: Vec<String>,
    #[serde(default)]
    physics: Option<String>,
    #[serde(default)]
    pose: Option<String>,
    #[serde(default)]
    motions: IndexMap<String, Vec<LegacyMotion>>,
    #[serde(default)]
    expressions: Vec<LegacyExpression>,
    #[serde(default)]
    hit_areas: Vec<LegacyHitArea>,
    #[serde(default)]
    layout: IndexMap<String, f32>,
}

#[derive(Debug, Deserialize)]
struct LegacyMotion {
    file: String,
    #[serde(default)]
    sound: Option<String>,
    /// milliseconds
    #[serde(default)]
    fade_in: Option<f32>,
    #[serde(default)]
    fade_out: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct LegacyExpression {
    name: String,
    file: String,
}

#[derive(Debug, Deserialize)]
struct LegacyHitArea {
    name: String,
    id: String,
}

impl LegacyModelJson {
    fn normalize(self, url: &str) -> ModelManifest {
        let ms_to_secs = |v: Option<f32>| explicit(v).map(|ms| ms / 1000.0);

        let motion_groups = self
            .motions
            .into_iter()
            .map(|(group, motions)| {
                let defs = motions
                    .into_iter()
                    .map(|m| MotionDefinition {
                        file: m.file,
                        sound: m.sound,
                        fade_in_secs: ms_to_secs(m.fade_in),
                        fade_out_secs: ms_to_secs(m.fade_out),
                    })
                    .collect();
                (group, defs)
            })
            .collect();

        ModelManifest {
            format: ManifestFormat::Legacy,
            url: url.to_string(),
            name: self.name.unwrap_or_else(|| name_from_url(url)),
            core_file: self.model,
            texture_files: self.textures,
            physics_file: self.physics.filter(|p| !p.is_empty()),
            pose_file: self.pose.filter(|p| !p.is_empty()),
            motion_groups,
            expressions: self
                .expressions
                .into_iter()
                .map(|e| ExpressionDefinition {
                    name: e.name,
                    file: e.file,
                    fade_in_secs: None,
                    fade_out_secs: None,
                })
                .collect(),
            hit_areas: self
                .hit_areas
                .into_iter()
                .map(|h| HitAreaDefinition {
                    id: h.id,
                    name: h.name,
                })
                .collect(),
            layout: layout_from_keys(self.layout),
            parameter_groups: ManifestFormat::Legacy.default_parameter_groups(),
            paths_resolved: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_url_joins_and_normalizes() {
        assert_eq!(
            resolve_url("https://cdn.test/models/haru/haru.model3.json", "motions/idle.json"),
            "https://cdn.test/models/haru/motions/idle.json"
        );
        assert_eq!(
            resolve_url("/data/models/haru/haru.model3.json", "../shared/./tex.png"),
            "/data/models/shared/tex.png"
        );
        assert_eq!(resolve_url("haru.model3.json", "haru.moc3"), "haru.moc3");
        assert_eq!(resolve_url("a/b.json", "../../c.png"), "../c.png");
        assert_eq!(
            resolve_url("/x/y.json", "https://elsewhere/z.png"),
            "https://elsewhere/z.png"
        );
    }

    #[test]
    fn snake_case_layout_keys() {
        assert_eq!(snake_case("CenterX"), "center_x");
        assert_eq!(snake_case("center_y"), "center_y");
        assert_eq!(snake_case("Width"), "width");
    }

    #[test]
    fn detect_rejects_non_string_textures() {
        let bad = json!({"FileReferences": {"Moc": "a.moc3", "Textures": [1]}});
        assert_eq!(ManifestFormat::detect(&bad), None);
        let empty = json!({"model": "a.moc", "textures": []});
        assert_eq!(ManifestFormat::detect(&empty), None);
        let legacy = json!({"model": "a.moc", "textures": ["t.png"]});
        assert_eq!(ManifestFormat::detect(&legacy), Some(ManifestFormat::Legacy));
    }

    #[test]
    fn pointer_tokens_are_escaped() {
        let json = json!({
            "FileReferences": {
                "Moc": "a.moc3",
                "Textures": ["t.png"],
                "Motions": {"a/b": [{"File": "m.json"}]}
            }
        });
        let mut m = ModelManifest::parse(&json, "x/a.model3.json").unwrap();
        let mut seen = Vec::new();
        m.resolve_paths(|v, p| {
            seen.push(p.to_string());
            v.to_string()
        });
        assert!(seen.contains(&"/motion_groups/a~1b/0/file".to_string()));
    }

    #[test]
    fn non_positive_fades_are_unset() {
        let json = json!({
            "FileReferences": {
                "Moc": "a.moc3",
                "Textures": ["t.png"],
                "Motions": {"Tap": [
                    {"File": "a.json", "FadeInTime": 0, "FadeOutTime": -1},
                    {"File": "b.json", "FadeInTime": 0.3}
                ]}
            }
        });
        let m = ModelManifest::parse(&json, "x/a.model3.json").unwrap();
        let tap = &m.motion_groups["Tap"];
        assert_eq!(tap[0].fade_in_secs, None);
        assert_eq!(tap[0].fade_out_secs, None);
        assert_eq!(tap[1].fade_in_secs, Some(0.3));

        let legacy = json!({
            "model": "a.moc",
            "textures": ["t.png"],
            "motions": {"idle": [{"file": "i.mtn", "fade_in": 0, "fade_out": 500}]}
        });
        let m = ModelManifest::parse(&legacy, "x/a.model.json").unwrap();
        assert_eq!(m.motion_groups["idle"][0].fade_in_secs, None);
        assert_eq!(m.motion_groups["idle"][0].fade_out_secs, Some(0.5));
    }
}
