use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    models: HashMap<String, String>,
    #[serde(default)]
    motions: HashMap<String, String>,
    #[serde(default)]
    expressions: HashMap<String, String>,
}

pub fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

/// Raw bytes of any file under the fixtures root.
pub fn read_bytes(rel: &str) -> Result<Vec<u8>> {
    let path = resolve_path(rel);
    fs::read(&path).with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a>(map: &'a HashMap<String, String>, kind: &str, name: &str) -> Result<&'a str> {
    map.get(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod models {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.models.keys().cloned().collect()
    }

    /// Manifest path relative to the fixtures root, e.g. `models/haru/haru.model3.json`.
    pub fn manifest_rel(name: &str) -> Result<&'static str> {
        lookup(&MANIFEST.models, "model", name)
    }

    pub fn manifest_json(name: &str) -> Result<String> {
        read_to_string(manifest_rel(name)?)
    }

    pub fn manifest<T: DeserializeOwned>(name: &str) -> Result<T> {
        super::load_json(manifest_rel(name)?)
    }

    pub fn manifest_path(name: &str) -> Result<PathBuf> {
        Ok(resolve_path(manifest_rel(name)?))
    }

    /// Every file of the model directory keyed by its fixtures-relative path.
    pub fn files(name: &str) -> Result<HashMap<String, Vec<u8>>> {
        let manifest = manifest_rel(name)?;
        let dir = Path::new(manifest)
            .parent()
            .ok_or_else(|| anyhow!("model fixture '{name}' has no directory"))?;
        let mut out = HashMap::new();
        collect(&resolve_path(&dir.to_string_lossy()), dir, &mut out)?;
        Ok(out)
    }

    fn collect(abs: &Path, rel: &Path, out: &mut HashMap<String, Vec<u8>>) -> Result<()> {
        let entries =
            fs::read_dir(abs).with_context(|| format!("failed to list {}", abs.display()))?;
        for entry in entries {
            let entry = entry?;
            let child_rel = rel.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                collect(&entry.path(), &child_rel, out)?;
            } else {
                let key = child_rel.to_string_lossy().replace('\\', "/");
                out.insert(key, fs::read(entry.path())?);
            }
        }
        Ok(())
    }
}

pub mod motions {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.motions.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        read_to_string(lookup(&MANIFEST.motions, "motion", name)?)
    }

    pub fn bytes(name: &str) -> Result<Vec<u8>> {
        read_bytes(lookup(&MANIFEST.motions, "motion", name)?)
    }
}

pub mod expressions {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.expressions.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        read_to_string(lookup(&MANIFEST.expressions, "expression", name)?)
    }

    pub fn bytes(name: &str) -> Result<Vec<u8>> {
        read_bytes(lookup(&MANIFEST.expressions, "expression", name)?)
    }
}
