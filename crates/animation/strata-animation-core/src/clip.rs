//! Clip data and the [`ClipSource`] boundary the engine samples through.
//!
//! The engine never owns clip storage; it asks a `ClipSource` for metadata at
//! setup time and for samples each frame. [`ClipLibrary`] is the in-memory,
//! keyframed implementation used by tests, fixtures and simple hosts.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::{ClipSourceError, ConfigurationError};
use crate::pose::PoseBuffer;
use crate::sampling::{sample_channel_track, sample_joint_track};
use crate::skeleton::Skeleton;
use crate::transform::Transform;

/// Metadata a clip source reports for a named clip.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipInfo {
    pub name: String,
    /// Duration in seconds (> 0).
    pub duration: f32,
    pub looping: bool,
    /// Joints the clip writes, in track order.
    pub joints: Vec<String>,
    /// Scalar channels the clip writes.
    pub channels: Vec<String>,
}

/// Supplier of sampled joint transforms and channel values.
///
/// Implementations hold read-only clip data; the engine calls `sample` with a
/// buffer it owns, so one source can serve many managers.
pub trait ClipSource {
    fn clip_info(&self, clip: &str) -> Option<ClipInfo>;

    /// Write the clip's joints and channels at clip-local `time` (seconds,
    /// already wrapped or clamped by the caller) into `out`.
    fn sample(&self, clip: &str, time: f32, out: &mut PoseBuffer) -> Result<(), ClipSourceError>;
}

/// A single joint keyframe in seconds.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JointKey {
    pub time: f32,
    #[serde(flatten)]
    pub transform: Transform,
}

/// A joint track targeting a skeleton joint by name.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JointTrack {
    pub joint: String,
    pub keys: Vec<JointKey>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChannelKey {
    pub time: f32,
    pub value: f32,
}

/// Step-sampled scalar channel (e.g. a "punch_fire" trigger flag).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChannelTrack {
    pub name: String,
    pub keys: Vec<ChannelKey>,
}

/// Keyframed clip. Immutable once loaded into a library.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Clip {
    pub name: String,
    /// Duration in seconds.
    pub duration: f32,
    #[serde(default)]
    pub looping: bool,
    #[serde(default)]
    pub joints: Vec<JointTrack>,
    #[serde(default)]
    pub channels: Vec<ChannelTrack>,
}

impl Clip {
    /// Validate basic invariants (positive duration, non-empty tracks,
    /// non-decreasing key times inside `[0, duration]`).
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidClip {
            clip: self.name.clone(),
            reason,
        };
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(invalid(format!("duration must be > 0, got {}", self.duration)));
        }
        let check_times = |label: &str, times: &mut dyn Iterator<Item = f32>| {
            let mut last = -f32::INFINITY;
            let mut count = 0usize;
            for t in times {
                if !t.is_finite() || t < 0.0 || t > self.duration {
                    return Err(invalid(format!(
                        "key time {t} outside [0, {}] on '{label}'",
                        self.duration
                    )));
                }
                if t < last {
                    return Err(invalid(format!("key times must be non-decreasing on '{label}'")));
                }
                last = t;
                count += 1;
            }
            if count == 0 {
                return Err(invalid(format!("track '{label}' has no keys")));
            }
            Ok(())
        };
        for track in &self.joints {
            check_times(&track.joint, &mut track.keys.iter().map(|k| k.time))?;
            if track.keys.iter().any(|k| !k.transform.is_finite()) {
                return Err(invalid(format!("non-finite key on '{}'", track.joint)));
            }
        }
        for track in &self.channels {
            check_times(&track.name, &mut track.keys.iter().map(|k| k.time))?;
        }
        Ok(())
    }

    pub fn info(&self) -> ClipInfo {
        ClipInfo {
            name: self.name.clone(),
            duration: self.duration,
            looping: self.looping,
            joints: self.joints.iter().map(|t| t.joint.clone()).collect(),
            channels: self.channels.iter().map(|t| t.name.clone()).collect(),
        }
    }
}

/// Parse clip JSON and validate it.
pub fn parse_clip_json(s: &str) -> Result<Clip, ConfigurationError> {
    let clip: Clip = serde_json::from_str(s)?;
    clip.validate()?;
    Ok(clip)
}

#[derive(Debug)]
struct LoadedClip {
    clip: Clip,
    /// Skeleton joint index per joint track, resolved once at insert.
    joint_indices: Vec<usize>,
}

/// In-memory clip store bound to one skeleton layout.
#[derive(Debug, Default)]
pub struct ClipLibrary {
    clips: HashMap<String, LoadedClip>,
}

impl ClipLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `clip`, resolve its joint names against `skeleton` and store it,
    /// replacing any clip with the same name.
    pub fn insert(&mut self, clip: Clip, skeleton: &Skeleton) -> Result<(), ConfigurationError> {
        clip.validate()?;
        let joint_indices = clip
            .joints
            .iter()
            .map(|track| skeleton.require_joint(&track.joint))
            .collect::<Result<Vec<_>, _>>()?;
        self.clips.insert(
            clip.name.clone(),
            LoadedClip {
                clip,
                joint_indices,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Clip> {
        self.clips.get(name).map(|c| &c.clip)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

impl ClipSource for ClipLibrary {
    fn clip_info(&self, clip: &str) -> Option<ClipInfo> {
        self.clips.get(clip).map(|c| c.clip.info())
    }

    fn sample(&self, clip: &str, time: f32, out: &mut PoseBuffer) -> Result<(), ClipSourceError> {
        let loaded = self
            .clips
            .get(clip)
            .ok_or_else(|| ClipSourceError::MissingClip {
                clip: clip.to_string(),
            })?;
        for (track, &index) in loaded.clip.joints.iter().zip(&loaded.joint_indices) {
            let t = sample_joint_track(&track.keys, time).ok_or_else(|| {
                ClipSourceError::MissingSamples {
                    clip: clip.to_string(),
                    reason: format!("joint track '{}' is empty", track.joint),
                }
            })?;
            out.set_joint(index, t);
        }
        for track in &loaded.clip.channels {
            if let Some(v) = sample_channel_track(&track.keys, time) {
                out.set_channel(&track.name, v);
            }
        }
        Ok(())
    }
}
