//! Puppet Core (engine-agnostic)
//!
//! Computes, once per display frame, the parameter vector a renderer needs to deform a
//! rigged 2D puppet model. Motions, expressions, eye blink, breath, lip sync, physics,
//! pose and gaze focus write into one native parameter store in a fixed order.
//!
//! Native engines plug in through the capability traits in [`native`]; the asynchronous
//! construction side lives in the `puppet-factory` crate.

pub mod breath;
pub mod config;
pub mod error;
pub mod events;
pub mod expression;
pub mod eye_blink;
pub mod focus;
pub mod ids;
pub mod layout;
pub mod manifest;
pub mod model;
pub mod motion;
pub mod native;
pub mod store;

// Re-exports for consumers (factory, hosts)
pub use breath::{Breath, BreathParameter};
pub use config::Config;
pub use error::{ManifestError, ModelError, NativeError, PayloadError};
pub use events::ModelEvent;
pub use expression::{
    Expression, ExpressionBlend, ExpressionData, ExpressionKey, ExpressionManager,
};
pub use eye_blink::EyeBlink;
pub use focus::FocusController;
pub use ids::PlaybackHandle;
pub use layout::{LayoutSpec, ModelLayout};
pub use manifest::{
    resolve_url, ExpressionDefinition, HitAreaDefinition, ManifestFormat, ModelManifest,
    MotionDefinition, ParameterGroups, StandardParameterIds,
};
pub use model::{Bounds, HitArea, InternalModel, ModelComponents};
pub use motion::{
    AnimationQueue, FinishCallback, Motion, MotionData, MotionManager, MotionPriority, Playable,
};
pub use native::{
    CanvasInfo, CoreModel, Moc, NativeModel, PhysicsEvaluator, PoseEvaluator, Renderer,
};
pub use store::{ParameterStore, StoreSpec};
