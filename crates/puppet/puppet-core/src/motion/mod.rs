//! Motion payloads, the shared playback queue, and the motion manager.

pub mod data;
pub mod manager;
pub mod queue;

pub use data::{CurvePoint, CurveTarget, Motion, MotionCurve, MotionData, Segment, UserDataEvent};
pub use manager::{MotionManager, MotionPriority};
pub use queue::{
    ease_sine, AnimationQueue, FinishCallback, PlaybackFrame, Playable, QueueEvent,
};
