//! Error types for layer setup and clip sampling.

/// Setup-time validation failure. Fatal to the configuration call that raised it,
/// never to the manager as a whole.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigurationError {
    #[error("Unknown clip: {clip}")]
    UnknownClip { clip: String },

    #[error("Unknown joint: {joint}")]
    UnknownJoint { joint: String },

    #[error("Joint index {index} out of range (skeleton has {joint_count} joints)")]
    JointIndexOutOfRange { index: usize, joint_count: usize },

    #[error("Unknown layer: {layer}")]
    UnknownLayer { layer: String },

    #[error("Unknown state: {state} in layer {layer}")]
    UnknownState { layer: String, state: String },

    #[error("Unknown attachment: {name}")]
    UnknownAttachment { name: String },

    #[error("Duplicate layer: {layer}")]
    DuplicateLayer { layer: String },

    #[error("Duplicate blend key: {key}")]
    DuplicateBlendKey { key: String },

    #[error("Duplicate state: {state} in layer {layer}")]
    DuplicateState { layer: String, state: String },

    #[error("Duplicate attachment: {name}")]
    DuplicateAttachment { name: String },

    #[error("Duplicate joint: {joint}")]
    DuplicateJoint { joint: String },

    #[error("Invalid time window [{start:?}, {end:?}] for a state of duration {duration:?}")]
    InvalidWindow {
        start: Option<f32>,
        end: Option<f32>,
        duration: Option<f32>,
    },

    #[error("Invalid transition: {reason}")]
    InvalidTransition { reason: String },

    #[error("Unknown blend curve: {name}")]
    UnknownCurve { name: String },

    #[error("State {state} has neither a clip nor a blend tree")]
    MissingSource { state: String },

    #[error("State {state} has both a clip and a blend tree")]
    AmbiguousSource { state: String },

    #[error("The base layer cannot be removed")]
    BaseLayerRemoval,

    #[error("Invalid skeleton: {reason}")]
    InvalidSkeleton { reason: String },

    #[error("Invalid clip {clip}: {reason}")]
    InvalidClip { clip: String, reason: String },

    #[error("Parse error: {reason}")]
    Parse { reason: String },
}

impl ConfigurationError {
    pub(crate) fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    pub(crate) fn transition(reason: impl Into<String>) -> Self {
        Self::InvalidTransition {
            reason: reason.into(),
        }
    }

    /// Get error category for logging/metrics
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnknownClip { .. }
            | Self::UnknownJoint { .. }
            | Self::JointIndexOutOfRange { .. }
            | Self::UnknownLayer { .. }
            | Self::UnknownState { .. }
            | Self::UnknownAttachment { .. } => "reference",
            Self::DuplicateLayer { .. }
            | Self::DuplicateBlendKey { .. }
            | Self::DuplicateState { .. }
            | Self::DuplicateAttachment { .. }
            | Self::DuplicateJoint { .. } => "duplicate",
            Self::InvalidWindow { .. }
            | Self::InvalidTransition { .. }
            | Self::UnknownCurve { .. } => "transition",
            Self::MissingSource { .. } | Self::AmbiguousSource { .. } => "state",
            Self::BaseLayerRemoval => "layer",
            Self::InvalidSkeleton { .. } | Self::InvalidClip { .. } => "data",
            Self::Parse { .. } => "parse",
        }
    }
}

impl From<serde_json::Error> for ConfigurationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse {
            reason: err.to_string(),
        }
    }
}

/// Failure reported by a [`crate::clip::ClipSource`] while sampling.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ClipSourceError {
    #[error("Clip not available: {clip}")]
    MissingClip { clip: String },

    #[error("Missing sample data in clip {clip}: {reason}")]
    MissingSamples { clip: String, reason: String },
}
