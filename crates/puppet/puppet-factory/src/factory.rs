//! Asynchronous model construction.
//!
//! Every await happens before the first native allocation, so dropping a pending
//! [`Factory::create`] future never leaks native resources.

use std::sync::Arc;

use futures::future::try_join_all;
use indexmap::IndexMap;
use puppet_core::{
    resolve_url, Config, ExpressionData, InternalModel, ManifestError, ModelComponents,
    ModelManifest, MotionData, NativeModel,
};
use serde_json::Value as JsonValue;

use crate::adapter::RuntimeAdapter;
use crate::error::{FactoryError, LoadError};
use crate::loader::ResourceLoader;

/// Where a model's manifest comes from.
#[derive(Clone, Debug)]
pub enum ModelSource {
    /// Load and parse the manifest at this URL.
    Url(String),
    /// Already-parsed manifest document; `url` is the base for its relative paths.
    Json { url: String, json: JsonValue },
    /// Already-normalized manifest. Relative paths are resolved against its `url` unless
    /// it was resolved before (e.g. taken from an existing model).
    Manifest(ModelManifest),
}

impl From<&str> for ModelSource {
    fn from(url: &str) -> Self {
        ModelSource::Url(url.to_string())
    }
}

#[derive(Clone, Debug, Default)]
pub struct FactoryOptions {
    /// Ask the runtime to verify the core file's internal consistency.
    pub check_moc_consistency: bool,
    /// Playback configuration handed to the constructed model.
    pub config: Config,
}

/// Builds [`InternalModel`]s from manifests, picking the runtime per source.
pub struct Factory {
    adapters: Vec<Arc<dyn RuntimeAdapter>>,
    loader: Arc<dyn ResourceLoader>,
}

impl Factory {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            adapters: Vec::new(),
            loader,
        }
    }

    /// Adapters are tried in registration order.
    pub fn register(&mut self, adapter: Arc<dyn RuntimeAdapter>) {
        log::debug!(
            "registered runtime {} (v{})",
            adapter.startup().name(),
            adapter.version()
        );
        self.adapters.push(adapter);
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn RuntimeAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn adapters(&self) -> &[Arc<dyn RuntimeAdapter>] {
        &self.adapters
    }

    fn adapter_for_json(&self, json: &JsonValue) -> Result<Arc<dyn RuntimeAdapter>, FactoryError> {
        self.adapters
            .iter()
            .find(|a| a.test(json))
            .cloned()
            .ok_or(FactoryError::UnsupportedFormat)
    }

    fn adapter_for_manifest(
        &self,
        manifest: &ModelManifest,
    ) -> Result<Arc<dyn RuntimeAdapter>, FactoryError> {
        self.adapters
            .iter()
            .find(|a| a.format() == manifest.format)
            .cloned()
            .ok_or(FactoryError::UnsupportedFormat)
    }

    pub async fn create(
        &self,
        source: ModelSource,
        options: &FactoryOptions,
    ) -> Result<InternalModel, FactoryError> {
        let (adapter, mut manifest) = match source {
            ModelSource::Url(url) => {
                let bytes = self.loader.load(&url).await?;
                let json: JsonValue =
                    serde_json::from_slice(&bytes).map_err(ManifestError::from)?;
                self.manifest_from_json(&json, &url).await?
            }
            ModelSource::Json { url, json } => self.manifest_from_json(&json, &url).await?,
            ModelSource::Manifest(manifest) => {
                let adapter = self.adapter_for_manifest(&manifest)?;
                adapter.startup().ready().await?;
                (adapter, manifest)
            }
        };

        if !manifest.paths_resolved {
            let base = manifest.url.clone();
            manifest.resolve_paths(|value, _| resolve_url(&base, value));
        }

        log::debug!("loading core file {}", manifest.core_file);
        let moc_bytes = self.loader.load(&manifest.core_file).await?;
        if !adapter.is_valid_moc(&moc_bytes) {
            return Err(FactoryError::Validation(format!(
                "{} is not a valid core model file for runtime {}",
                manifest.core_file,
                adapter.startup().name()
            )));
        }

        let payloads = self.load_payloads(&manifest).await?;
        log::debug!(
            "loaded {} motion and {} expression payloads for {:?}",
            payloads.motions.len(),
            payloads.expressions.len(),
            manifest.name
        );

        // Parse everything before touching the native runtime.
        let physics = payloads
            .physics
            .as_deref()
            .map(|b| adapter.create_physics(b))
            .transpose()?;
        let pose = payloads
            .pose
            .as_deref()
            .map(|b| adapter.create_pose(b))
            .transpose()?;
        let mut motions: IndexMap<String, Vec<MotionData>> = IndexMap::new();
        for (group, bytes) in payloads.motions {
            motions
                .entry(group)
                .or_default()
                .push(adapter.parse_motion(&bytes)?);
        }
        let expressions = payloads
            .expressions
            .iter()
            .map(|b| adapter.parse_expression(b))
            .collect::<Result<Vec<ExpressionData>, _>>()?;

        let moc = adapter.create_moc(moc_bytes, options)?;
        let model = match moc.create_model() {
            Ok(model) => model,
            Err(err) => {
                drop(moc);
                return Err(err.into());
            }
        };
        let native = NativeModel::adopt(moc, model);

        let components = ModelComponents {
            motions,
            expressions,
            physics,
            pose,
        };
        let model = InternalModel::new(native, manifest, options.config.clone(), components)?;
        log::info!(
            "created model {:?} with runtime {}",
            model.manifest().name,
            adapter.startup().name()
        );
        Ok(model)
    }

    async fn manifest_from_json(
        &self,
        json: &JsonValue,
        url: &str,
    ) -> Result<(Arc<dyn RuntimeAdapter>, ModelManifest), FactoryError> {
        let adapter = self.adapter_for_json(json)?;
        adapter.startup().ready().await?;
        let manifest = adapter.create_manifest(json, url)?;
        Ok((adapter, manifest))
    }

    async fn load_payloads(&self, manifest: &ModelManifest) -> Result<Payloads, LoadError> {
        let motion_files: Vec<(&str, &str)> = manifest
            .motion_groups
            .iter()
            .flat_map(|(group, defs)| defs.iter().map(move |d| (group.as_str(), d.file.as_str())))
            .collect();

        let (physics, pose, motion_bytes, expressions) = futures::try_join!(
            self.load_optional(manifest.physics_file.as_deref()),
            self.load_optional(manifest.pose_file.as_deref()),
            try_join_all(motion_files.iter().map(|(_, file)| self.loader.load(file))),
            try_join_all(manifest.expressions.iter().map(|e| self.loader.load(&e.file))),
        )?;

        let motions = motion_files
            .iter()
            .map(|(group, _)| group.to_string())
            .zip(motion_bytes)
            .collect();
        Ok(Payloads {
            physics,
            pose,
            motions,
            expressions,
        })
    }

    async fn load_optional(&self, url: Option<&str>) -> Result<Option<Vec<u8>>, LoadError> {
        match url {
            Some(url) => self.loader.load(url).await.map(Some),
            None => Ok(None),
        }
    }
}

struct Payloads {
    physics: Option<Vec<u8>>,
    pose: Option<Vec<u8>>,
    motions: Vec<(String, Vec<u8>)>,
    expressions: Vec<Vec<u8>>,
}
