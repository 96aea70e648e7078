//! Declarative setup data: the JSON shapes that describe layers, states,
//! transitions, blend trees and attachments, and their conversion into
//! validated engine types.
//!
//! Stringly-typed fields (`"lerp"`, `"syncfade"`, `"-"`) become closed enums
//! here; anything unrecognized is rejected with a [`ConfigurationError`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::blend_tree::{BlendNode, ClipLeaf, FilteredClipLeaf, ManagedInit, ManagedLeaf, WeightedChild};
use crate::clip::{ClipInfo, ClipSource};
use crate::error::ConfigurationError;
use crate::interp::BlendCurve;
use crate::layer::{BlendMode, LayerBlend};
use crate::skeleton::Skeleton;
use crate::transform::Transform;
use crate::transition::{TimeWindow, TransitionKind, TransitionRule};

fn one() -> f32 {
    1.0
}

fn yes() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LayerConfig {
    pub name: String,
    #[serde(default)]
    pub blend_type: BlendMode,
    #[serde(default = "one")]
    pub blend_weight: f32,
    #[serde(default)]
    pub blend_key: Option<String>,
}

impl LayerConfig {
    pub fn new(name: impl Into<String>, blend_type: BlendMode) -> Self {
        Self {
            name: name.into(),
            blend_type,
            blend_weight: 1.0,
            blend_key: None,
        }
    }

    pub fn blend(&self) -> Result<LayerBlend, ConfigurationError> {
        if !self.blend_weight.is_finite() || self.blend_weight < 0.0 {
            return Err(ConfigurationError::parse(format!(
                "layer '{}' blendWeight must be a finite value >= 0",
                self.name
            )));
        }
        Ok(LayerBlend {
            mode: self.blend_type,
            weight: self.blend_weight,
            key: self.blend_key.clone(),
        })
    }
}

/// `[start|"-", end|"-", "immediate"|"fade"|"syncfade", target, fadeTime?, curve?]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "Vec<Value>")]
pub struct TransitionRuleConfig {
    pub start: Option<f32>,
    pub end: Option<f32>,
    pub kind: String,
    pub target: String,
    pub fade_time: Option<f32>,
    pub curve: Option<String>,
}

fn parse_edge(v: &Value) -> Result<Option<f32>, String> {
    match v {
        Value::String(s) if s == "-" => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(|f| Some(f as f32))
            .ok_or_else(|| format!("invalid window bound {n}")),
        other => Err(format!("window bound must be a number or \"-\", got {other}")),
    }
}

impl TryFrom<Vec<Value>> for TransitionRuleConfig {
    type Error = String;

    fn try_from(items: Vec<Value>) -> Result<Self, Self::Error> {
        if !(4..=6).contains(&items.len()) {
            return Err(format!(
                "transition rule needs 4 to 6 entries, got {}",
                items.len()
            ));
        }
        let text = |i: usize, what: &str| match &items[i] {
            Value::String(s) => Ok(s.clone()),
            other => Err(format!("{what} must be a string, got {other}")),
        };
        let fade_time = match items.get(4) {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => n.as_f64().map(|f| f as f32),
            Some(other) => return Err(format!("fadeTime must be a number, got {other}")),
        };
        let curve = match items.get(5) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => return Err(format!("curve must be a string, got {other}")),
        };
        Ok(Self {
            start: parse_edge(&items[0])?,
            end: parse_edge(&items[1])?,
            kind: text(2, "kind")?,
            target: text(3, "target")?,
            fade_time,
            curve,
        })
    }
}

impl From<TransitionRuleConfig> for Vec<Value> {
    fn from(cfg: TransitionRuleConfig) -> Self {
        let edge = |e: Option<f32>| e.map_or(Value::from("-"), |v| Value::from(v as f64));
        let mut items = vec![
            edge(cfg.start),
            edge(cfg.end),
            Value::from(cfg.kind),
            Value::from(cfg.target),
        ];
        if cfg.fade_time.is_some() || cfg.curve.is_some() {
            items.push(cfg.fade_time.map_or(Value::Null, |f| Value::from(f as f64)));
        }
        if let Some(curve) = cfg.curve {
            items.push(Value::from(curve));
        }
        items
    }
}

impl TransitionRuleConfig {
    pub fn immediate(target: impl Into<String>) -> Self {
        Self {
            start: None,
            end: None,
            kind: "immediate".to_string(),
            target: target.into(),
            fade_time: None,
            curve: None,
        }
    }

    /// Resolve kind and curve names. Window bounds are checked later against
    /// the owning state's duration.
    pub fn to_rule(&self) -> Result<TransitionRule, ConfigurationError> {
        let curve = match &self.curve {
            Some(name) => BlendCurve::parse(name)?,
            None => BlendCurve::Linear,
        };
        let fade = || {
            self.fade_time.ok_or_else(|| {
                ConfigurationError::transition(format!(
                    "'{}' transition to '{}' needs a fade time",
                    self.kind, self.target
                ))
            })
        };
        let kind = match self.kind.to_ascii_lowercase().as_str() {
            "immediate" => TransitionKind::Immediate,
            "fade" => TransitionKind::Fade {
                duration: fade()?,
                curve,
            },
            "syncfade" => TransitionKind::SyncFade {
                duration: fade()?,
                curve,
            },
            other => {
                return Err(ConfigurationError::transition(format!(
                    "unknown transition kind '{other}'"
                )))
            }
        };
        Ok(TransitionRule {
            window: TimeWindow::new(self.start, self.end),
            kind,
            target: self.target.clone(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClipLeafConfig {
    pub name: String,
    #[serde(default = "yes")]
    pub active: bool,
    #[serde(default = "one")]
    pub time_scale: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FilteredClipConfig {
    pub name: String,
    #[serde(default)]
    pub joints: Vec<usize>,
    #[serde(default)]
    pub joint_names: Vec<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "yes")]
    pub active: bool,
    #[serde(default = "one")]
    pub time_scale: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InitFromClipConfig {
    pub clip: String,
    #[serde(default)]
    pub joint_names: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ManagedConfig {
    #[serde(default)]
    pub init_from_clip: Option<InitFromClipConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WeightedChildConfig {
    #[serde(default = "one")]
    pub weight: f32,
    #[serde(default)]
    pub blend_key: Option<String>,
    pub node: BlendTreeConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WeightedBlendConfig {
    pub children: Vec<WeightedChildConfig>,
}

/// One blend-tree node, keyed by its kind: `{"inclusiveClip": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlendTreeConfig {
    Clip(ClipLeafConfig),
    InclusiveClip(FilteredClipConfig),
    ExclusiveClip(FilteredClipConfig),
    Managed(ManagedConfig),
    WeightedBlend(WeightedBlendConfig),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StateConfig {
    pub name: String,
    #[serde(default)]
    pub clip: Option<String>,
    #[serde(default)]
    pub tree: Option<BlendTreeConfig>,
    #[serde(default)]
    pub transitions: IndexMap<String, TransitionRuleConfig>,
    /// Missing means an immediate self-loop.
    #[serde(default)]
    pub end_transition: Option<TransitionRuleConfig>,
    #[serde(default)]
    pub default: bool,
}

impl StateConfig {
    /// State playing one looping-or-not clip, ending in a self-loop.
    pub fn clip(name: impl Into<String>, clip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clip: Some(clip.into()),
            tree: None,
            transitions: IndexMap::new(),
            end_transition: None,
            default: false,
        }
    }

    pub fn with_tree(name: impl Into<String>, tree: BlendTreeConfig) -> Self {
        Self {
            name: name.into(),
            clip: None,
            tree: Some(tree),
            transitions: IndexMap::new(),
            end_transition: None,
            default: false,
        }
    }

    pub fn with_transition(mut self, trigger: impl Into<String>, rule: TransitionRuleConfig) -> Self {
        self.transitions.insert(trigger.into(), rule);
        self
    }

    pub fn with_end_transition(mut self, rule: TransitionRuleConfig) -> Self {
        self.end_transition = Some(rule);
        self
    }

    /// The tree this state plays: its `tree`, or a clip leaf for `clip`.
    pub fn source(&self) -> Result<BlendTreeConfig, ConfigurationError> {
        match (&self.clip, &self.tree) {
            (Some(_), Some(_)) => Err(ConfigurationError::AmbiguousSource {
                state: self.name.clone(),
            }),
            (None, None) => Err(ConfigurationError::MissingSource {
                state: self.name.clone(),
            }),
            (Some(clip), None) => Ok(BlendTreeConfig::Clip(ClipLeafConfig {
                name: clip.clone(),
                active: true,
                time_scale: 1.0,
            })),
            (None, Some(tree)) => Ok(tree.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AttachmentConfig {
    pub name: String,
    /// Joint name the attachment follows.
    pub joint: String,
    #[serde(default)]
    pub offset_index: u32,
    #[serde(default)]
    pub offset: Option<Transform>,
    #[serde(default)]
    pub extra: Option<Value>,
}

/// A layer together with its states.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LayerSetup {
    pub name: String,
    #[serde(default)]
    pub blend_type: BlendMode,
    #[serde(default = "one")]
    pub blend_weight: f32,
    #[serde(default)]
    pub blend_key: Option<String>,
    #[serde(default)]
    pub states: Vec<StateConfig>,
}

impl LayerSetup {
    pub fn layer_config(&self) -> LayerConfig {
        LayerConfig {
            name: self.name.clone(),
            blend_type: self.blend_type,
            blend_weight: self.blend_weight,
            blend_key: self.blend_key.clone(),
        }
    }
}

/// Whole-character setup: base-layer states, extra layers, attachments.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnimationSetup {
    #[serde(default)]
    pub base_states: Vec<StateConfig>,
    #[serde(default)]
    pub layers: Vec<LayerSetup>,
    #[serde(default)]
    pub attachments: Vec<AttachmentConfig>,
}

pub fn parse_setup_json(s: &str) -> Result<AnimationSetup, ConfigurationError> {
    Ok(serde_json::from_str(s)?)
}

fn clip_info(source: &dyn ClipSource, clip: &str) -> Result<ClipInfo, ConfigurationError> {
    source
        .clip_info(clip)
        .ok_or_else(|| ConfigurationError::UnknownClip {
            clip: clip.to_string(),
        })
}

fn clip_leaf(
    source: &dyn ClipSource,
    clip: &str,
    active: bool,
    time_scale: f32,
) -> Result<ClipLeaf, ConfigurationError> {
    let info = clip_info(source, clip)?;
    if !time_scale.is_finite() || time_scale <= 0.0 {
        return Err(ConfigurationError::InvalidClip {
            clip: clip.to_string(),
            reason: format!("timeScale must be > 0, got {time_scale}"),
        });
    }
    Ok(ClipLeaf {
        clip: info.name,
        duration: info.duration,
        looping: info.looping,
        time_scale,
        active,
    })
}

fn filtered(
    cfg: &FilteredClipConfig,
    skeleton: &Skeleton,
    source: &dyn ClipSource,
) -> Result<FilteredClipLeaf, ConfigurationError> {
    let leaf = clip_leaf(source, &cfg.name, cfg.active, cfg.time_scale)?;
    let mut joints = Vec::with_capacity(cfg.joints.len() + cfg.joint_names.len());
    for &index in &cfg.joints {
        joints.push(skeleton.check_index(index)?);
    }
    for name in &cfg.joint_names {
        joints.push(skeleton.require_joint(name)?);
    }
    joints.sort_unstable();
    joints.dedup();
    Ok(FilteredClipLeaf {
        leaf,
        joints,
        channels: cfg.channels.clone(),
    })
}

/// Resolve a tree config against the skeleton and clip source.
pub fn build_tree(
    cfg: &BlendTreeConfig,
    skeleton: &Skeleton,
    source: &dyn ClipSource,
) -> Result<BlendNode, ConfigurationError> {
    Ok(match cfg {
        BlendTreeConfig::Clip(leaf) => {
            BlendNode::Clip(clip_leaf(source, &leaf.name, leaf.active, leaf.time_scale)?)
        }
        BlendTreeConfig::InclusiveClip(f) => {
            BlendNode::InclusiveClip(filtered(f, skeleton, source)?)
        }
        BlendTreeConfig::ExclusiveClip(f) => {
            BlendNode::ExclusiveClip(filtered(f, skeleton, source)?)
        }
        BlendTreeConfig::Managed(m) => {
            let init = match &m.init_from_clip {
                Some(init) => {
                    let info = clip_info(source, &init.clip)?;
                    let joints = init
                        .joint_names
                        .iter()
                        .map(|name| skeleton.require_joint(name))
                        .collect::<Result<Vec<_>, _>>()?;
                    Some(ManagedInit {
                        clip: info.name,
                        joints,
                    })
                }
                None => None,
            };
            BlendNode::Managed(ManagedLeaf::new(skeleton.joint_count(), init))
        }
        BlendTreeConfig::WeightedBlend(w) => {
            if w.children.is_empty() {
                return Err(ConfigurationError::parse("weightedBlend needs at least one child"));
            }
            let children = w
                .children
                .iter()
                .map(|child| {
                    if !child.weight.is_finite() || child.weight < 0.0 {
                        return Err(ConfigurationError::parse(format!(
                            "blend weight must be a finite value >= 0, got {}",
                            child.weight
                        )));
                    }
                    Ok(WeightedChild {
                        weight: child.weight,
                        key: child.blend_key.clone(),
                        node: build_tree(&child.node, skeleton, source)?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            BlendNode::WeightedBlend(children)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_arrays_parse_with_open_edges() {
        let rule: TransitionRuleConfig =
            serde_json::from_str(r#"["-", 0.4, "syncfade", "run_anim", 0.5, "Linear"]"#).unwrap();
        assert_eq!(rule.start, None);
        assert_eq!(rule.end, Some(0.4));
        let resolved = rule.to_rule().unwrap();
        assert_eq!(
            resolved.kind,
            TransitionKind::SyncFade {
                duration: 0.5,
                curve: BlendCurve::Linear
            }
        );

        let short: TransitionRuleConfig =
            serde_json::from_str(r#"["-", "-", "immediate", "walk_anim"]"#).unwrap();
        assert_eq!(short.to_rule().unwrap().kind, TransitionKind::Immediate);
    }

    #[test]
    fn malformed_transition_arrays_are_rejected() {
        assert!(serde_json::from_str::<TransitionRuleConfig>(r#"["-", "-", "immediate"]"#).is_err());
        assert!(serde_json::from_str::<TransitionRuleConfig>(r#"["x", "-", "immediate", "a"]"#).is_err());

        let no_fade: TransitionRuleConfig =
            serde_json::from_str(r#"["-", "-", "fade", "a"]"#).unwrap();
        assert!(matches!(
            no_fade.to_rule(),
            Err(ConfigurationError::InvalidTransition { .. })
        ));
        let bad_kind: TransitionRuleConfig =
            serde_json::from_str(r#"["-", "-", "teleport", "a"]"#).unwrap();
        assert!(bad_kind.to_rule().is_err());
        let bad_curve: TransitionRuleConfig =
            serde_json::from_str(r#"["-", "-", "fade", "a", 0.2, "wobbly"]"#).unwrap();
        assert!(matches!(
            bad_curve.to_rule(),
            Err(ConfigurationError::UnknownCurve { .. })
        ));
    }

    #[test]
    fn rule_config_serializes_back_to_an_array() {
        let rule: TransitionRuleConfig =
            serde_json::from_str(r#"[0.5, "-", "fade", "a", 0.25]"#).unwrap();
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json, serde_json::json!([0.5, "-", "fade", "a", 0.25]));
    }

    #[test]
    fn tree_shapes_parse() {
        let tree: BlendTreeConfig = serde_json::from_str(
            r#"{ "weightedBlend": { "children": [
                { "weight": 0.5, "node": { "clip": { "name": "skeleton.walk" } } },
                { "blendKey": "lean", "node": { "managed": {} } }
            ] } }"#,
        )
        .unwrap();
        let BlendTreeConfig::WeightedBlend(w) = tree else {
            panic!("expected weightedBlend");
        };
        assert_eq!(w.children.len(), 2);
        assert_eq!(w.children[1].weight, 1.0);
    }

    #[test]
    fn unknown_fields_and_shapes_are_rejected() {
        assert!(serde_json::from_str::<BlendTreeConfig>(r#"{ "spline": {} }"#).is_err());
        assert!(serde_json::from_str::<StateConfig>(r#"{ "name": "a", "clip": "c", "speed": 2 }"#).is_err());
        assert!(serde_json::from_str::<LayerConfig>(r#"{ "name": "a", "blendType": "multiply" }"#).is_err());
        assert!(matches!(
            parse_setup_json("{ \"baseStates\": 3 }"),
            Err(ConfigurationError::Parse { .. })
        ));
    }

    #[test]
    fn state_source_requires_exactly_one_of_clip_or_tree() {
        let mut state = StateConfig::clip("walk_anim", "skeleton.walk");
        assert!(state.source().is_ok());
        state.tree = Some(BlendTreeConfig::Managed(ManagedConfig::default()));
        assert!(matches!(
            state.source(),
            Err(ConfigurationError::AmbiguousSource { .. })
        ));
        state.clip = None;
        state.tree = None;
        assert!(matches!(
            state.source(),
            Err(ConfigurationError::MissingSource { .. })
        ));
    }
}
