//! Core configuration for strata-animation-core.

use serde::{Deserialize, Serialize};

/// Where the target state's clock starts when a `syncfade` transition fires.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncFadePhase {
    /// Target starts at local time 0.
    #[default]
    Restart,
    /// Target starts at the source state's normalized phase.
    MatchPhase,
}

/// Configuration for engine sizing and runtime defaults.
/// Keep this minimal; expand as needed without breaking API.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name given to the implicit base layer.
    pub base_layer_name: String,

    /// Number of pose buffers pre-warmed in the scratch pool.
    pub scratch_poses: usize,

    /// Maximum events to retain per tick before backpressure policy applies.
    pub max_events_per_tick: usize,

    pub sync_fade_phase: SyncFadePhase,

    /// A channel "arms" when its composited value rises above this threshold.
    pub channel_arm_threshold: f32,

    /// Value used for blend keys nobody has set.
    pub default_blend_value: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_layer_name: "base".to_string(),
            scratch_poses: 8,
            max_events_per_tick: 256,
            sync_fade_phase: SyncFadePhase::Restart,
            channel_arm_threshold: 0.5,
            default_blend_value: 1.0,
        }
    }
}
