#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use puppet_core::{
    CanvasInfo, CoreModel, ManifestFormat, Moc, NativeError, ParameterStore, PayloadError,
    PhysicsEvaluator, PoseEvaluator,
};
use puppet_factory::{FactoryOptions, MemoryLoader, RuntimeAdapter, RuntimeStartup};
use puppet_test_fixtures::models;

pub const MOC_MAGIC: &[u8; 4] = b"MOC3";

static PROCESS_STARTED: AtomicBool = AtomicBool::new(false);

/// Startup shared by every adapter built with [`MockAdapter::process_wide`].
static PROCESS_STARTUP: Lazy<RuntimeStartup> = Lazy::new(|| {
    RuntimeStartup::new(
        "mock",
        || {
            PROCESS_STARTED.store(true, Ordering::SeqCst);
            Ok(())
        },
        || PROCESS_STARTED.load(Ordering::SeqCst),
    )
});

#[derive(Debug, Default)]
pub struct Counters {
    pub mocs_created: AtomicUsize,
    pub mocs_released: AtomicUsize,
    pub models_created: AtomicUsize,
    pub models_released: AtomicUsize,
    pub physics_created: AtomicUsize,
    pub physics_released: AtomicUsize,
    pub poses_created: AtomicUsize,
    pub poses_released: AtomicUsize,
    pub consistency_checks: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn live_natives(&self) -> usize {
        Self::get(&self.mocs_created) + Self::get(&self.models_created)
            - Self::get(&self.mocs_released)
            - Self::get(&self.models_released)
    }
}

pub struct MockAdapter {
    pub counters: Arc<Counters>,
    pub fail_model_creation: bool,
    own_startup: Option<RuntimeStartup>,
}

impl MockAdapter {
    pub fn process_wide() -> Self {
        Self {
            counters: Arc::default(),
            fail_model_creation: false,
            own_startup: None,
        }
    }

    pub fn with_startup(startup: RuntimeStartup) -> Self {
        Self {
            counters: Arc::default(),
            fail_model_creation: false,
            own_startup: Some(startup),
        }
    }
}

impl RuntimeAdapter for MockAdapter {
    fn version(&self) -> u32 {
        5
    }

    fn startup(&self) -> &RuntimeStartup {
        self.own_startup.as_ref().unwrap_or(&PROCESS_STARTUP)
    }

    fn format(&self) -> ManifestFormat {
        ManifestFormat::Modern
    }

    fn is_valid_moc(&self, bytes: &[u8]) -> bool {
        bytes.len() >= 4 && &bytes[..4] == MOC_MAGIC
    }

    fn create_moc(
        &self,
        bytes: Vec<u8>,
        options: &FactoryOptions,
    ) -> Result<Box<dyn Moc>, NativeError> {
        if options.check_moc_consistency {
            self.counters.consistency_checks.fetch_add(1, Ordering::SeqCst);
        }
        let spec = std::str::from_utf8(&bytes[4..])
            .map_err(|e| NativeError::new(format!("moc body: {e}")))?;
        ParameterStore::from_json(spec)?;
        self.counters.mocs_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockMoc {
            spec: spec.to_string(),
            fail: self.fail_model_creation,
            counters: self.counters.clone(),
        }))
    }

    fn create_physics(&self, bytes: &[u8]) -> Result<Box<dyn PhysicsEvaluator>, PayloadError> {
        serde_json::from_slice::<serde_json::Value>(bytes)
            .map_err(|e| PayloadError::malformed("physics", e.to_string()))?;
        self.counters.physics_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPhysics {
            counters: self.counters.clone(),
        }))
    }

    fn create_pose(&self, bytes: &[u8]) -> Result<Box<dyn PoseEvaluator>, PayloadError> {
        serde_json::from_slice::<serde_json::Value>(bytes)
            .map_err(|e| PayloadError::malformed("pose", e.to_string()))?;
        self.counters.poses_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPose {
            counters: self.counters.clone(),
        }))
    }
}

struct MockMoc {
    spec: String,
    fail: bool,
    counters: Arc<Counters>,
}

impl Moc for MockMoc {
    fn create_model(&self) -> Result<Box<dyn CoreModel>, NativeError> {
        if self.fail {
            return Err(NativeError::new("model allocation failed"));
        }
        let store = ParameterStore::from_json(&self.spec)?;
        self.counters.models_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockModel {
            store,
            counters: self.counters.clone(),
        }))
    }
}

impl Drop for MockMoc {
    fn drop(&mut self) {
        self.counters.mocs_released.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockModel {
    store: ParameterStore,
    counters: Arc<Counters>,
}

impl Drop for MockModel {
    fn drop(&mut self) {
        self.counters.models_released.fetch_add(1, Ordering::SeqCst);
    }
}

impl CoreModel for MockModel {
    fn parameter_count(&self) -> usize {
        self.store.parameter_count()
    }
    fn parameter_index(&self, id: &str) -> Option<usize> {
        self.store.parameter_index(id)
    }
    fn parameter_value(&self, index: usize) -> f32 {
        self.store.parameter_value(index)
    }
    fn set_parameter_value(&mut self, index: usize, value: f32) {
        self.store.set_parameter_value(index, value)
    }
    fn part_count(&self) -> usize {
        self.store.part_count()
    }
    fn part_index(&self, id: &str) -> Option<usize> {
        self.store.part_index(id)
    }
    fn part_opacity(&self, index: usize) -> f32 {
        self.store.part_opacity(index)
    }
    fn set_part_opacity(&mut self, index: usize, value: f32) {
        self.store.set_part_opacity(index, value)
    }
    fn save_parameters(&mut self) {
        self.store.save_parameters()
    }
    fn load_parameters(&mut self) {
        self.store.load_parameters()
    }
    fn update(&mut self) {
        self.store.update()
    }
    fn canvas_info(&self) -> CanvasInfo {
        self.store.canvas_info()
    }
    fn drawable_ids(&self) -> &[String] {
        self.store.drawable_ids()
    }
    fn drawable_vertices(&self, index: usize) -> &[f32] {
        self.store.drawable_vertices(index)
    }
}

struct MockPhysics {
    counters: Arc<Counters>,
}

impl PhysicsEvaluator for MockPhysics {
    fn evaluate(&mut self, _model: &mut dyn CoreModel, _dt_secs: f32) {}
}

impl Drop for MockPhysics {
    fn drop(&mut self) {
        self.counters.physics_released.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockPose {
    counters: Arc<Counters>,
}

impl PoseEvaluator for MockPose {
    fn update_parameters(&mut self, _model: &mut dyn CoreModel, _dt_secs: f32) {}
}

impl Drop for MockPose {
    fn drop(&mut self) {
        self.counters.poses_released.fetch_add(1, Ordering::SeqCst);
    }
}

/// The haru fixture served from memory under its fixtures-relative paths.
pub fn haru_loader() -> MemoryLoader {
    models::files("haru")
        .expect("haru fixture files")
        .into_iter()
        .collect()
}

pub fn haru_url() -> &'static str {
    models::manifest_rel("haru").expect("haru manifest path")
}
