//! Strata Animation Core (engine-agnostic)
//!
//! Layered skeletal animation: per-layer state machines with time-windowed
//! transition rules, blend trees over a pluggable clip source, and a
//! compositor that stacks layer poses (lerp, additive, override) into one
//! skeleton pose. Hosts drive it with `AnimationManager::update(dt)` and read
//! joint, channel and attachment transforms back out.

pub mod accumulate;
pub mod attachment;
pub mod blend_tree;
pub mod clip;
pub mod composite;
pub mod config;
pub mod error;
pub mod ids;
pub mod inputs;
pub mod interp;
pub mod layer;
pub mod manager;
pub mod outputs;
pub mod pose;
pub mod sampling;
pub mod scratch;
pub mod setup;
pub mod skeleton;
pub mod state;
pub mod transform;
pub mod transition;

// Re-exports for hosts
pub use attachment::Attachment;
pub use blend_tree::{BlendNode, ClipLeaf, EvalContext, FilteredClipLeaf, ManagedLeaf};
pub use clip::{parse_clip_json, Clip, ClipInfo, ClipLibrary, ClipSource};
pub use config::{Config, SyncFadePhase};
pub use error::{ClipSourceError, ConfigurationError};
pub use ids::{LayerId, StateId};
pub use inputs::{Inputs, LayerCommand};
pub use interp::BlendCurve;
pub use layer::{AnimationLayer, BlendMode, LayerBlend, LayerMachine};
pub use manager::AnimationManager;
pub use outputs::{CoreEvent, IgnoreReason, Outputs};
pub use pose::PoseBuffer;
pub use setup::{
    parse_setup_json, AnimationSetup, AttachmentConfig, BlendTreeConfig, LayerConfig, StateConfig,
    TransitionRuleConfig,
};
pub use skeleton::{Joint, Skeleton};
pub use state::SteadyState;
pub use transform::Transform;
pub use transition::{TimeWindow, TransitionKind, TransitionRule};
