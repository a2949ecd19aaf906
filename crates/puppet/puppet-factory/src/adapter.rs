//! Native runtime adapters: one per engine generation.

use puppet_core::{
    ExpressionData, ManifestError, ManifestFormat, Moc, ModelManifest, MotionData, NativeError,
    PayloadError, PhysicsEvaluator, PoseEvaluator,
};
use serde_json::Value as JsonValue;

use crate::factory::FactoryOptions;
use crate::runtime::RuntimeStartup;

/// Bridges one native engine generation into the factory.
///
/// Native objects returned here release themselves on drop.
pub trait RuntimeAdapter: Send + Sync {
    /// Engine generation, e.g. 2 or 5.
    fn version(&self) -> u32;

    /// Process-wide startup of the native runtime.
    fn startup(&self) -> &RuntimeStartup;

    fn format(&self) -> ManifestFormat;

    /// Whether this runtime handles the manifest document.
    fn test(&self, json: &JsonValue) -> bool {
        self.format().is_valid_json(json)
    }

    /// Cheap signature check on the core model file.
    fn is_valid_moc(&self, bytes: &[u8]) -> bool;

    fn create_manifest(&self, json: &JsonValue, url: &str) -> Result<ModelManifest, ManifestError> {
        ModelManifest::parse_as(self.format(), json, url)
    }

    fn create_moc(
        &self,
        bytes: Vec<u8>,
        options: &FactoryOptions,
    ) -> Result<Box<dyn Moc>, NativeError>;

    fn create_physics(&self, bytes: &[u8]) -> Result<Box<dyn PhysicsEvaluator>, PayloadError>;

    fn create_pose(&self, bytes: &[u8]) -> Result<Box<dyn PoseEvaluator>, PayloadError>;

    fn parse_motion(&self, bytes: &[u8]) -> Result<MotionData, PayloadError> {
        MotionData::from_slice(bytes)
    }

    fn parse_expression(&self, bytes: &[u8]) -> Result<ExpressionData, PayloadError> {
        ExpressionData::from_slice(bytes)
    }
}
