//! Host-facing notifications.
//!
//! Events accumulate inside the model during `update` and the playback calls, and the
//! host drains them with [`crate::InternalModel::take_events`].

use serde::{Deserialize, Serialize};

/// Discrete signals emitted while a model runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ModelEvent {
    /// A motion entered the queue. `sound` is set when the host should play its audio.
    MotionStarted {
        group: String,
        index: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        sound: Option<String>,
    },
    /// A motion left the queue, either completed or stopped.
    MotionFinished { group: String, index: usize },
    /// Custom event embedded in motion data, fired when playback crossed its time.
    MotionUserData { value: String },
    /// A new expression was set.
    ExpressionSet { index: usize },
    /// The model released its native state. Emitted once.
    Destroyed,
}
