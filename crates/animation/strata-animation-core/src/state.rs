//! Steady states: a blend tree plus the rules that leave it.

use indexmap::IndexMap;

use crate::blend_tree::BlendNode;
use crate::error::ConfigurationError;
use crate::ids::StateId;
use crate::sampling::fmod;
use crate::transition::TransitionRule;

#[derive(Clone, Debug, PartialEq)]
pub struct SteadyState {
    pub id: StateId,
    pub name: String,
    pub source: BlendNode,
    /// Trigger name to rule, in declaration order (first eligible wins).
    pub transitions: IndexMap<String, TransitionRule>,
    pub end_transition: TransitionRule,
    /// Longest clip pass in the tree; `None` for managed-only states, which never end.
    pub duration: Option<f32>,
}

impl SteadyState {
    /// Build a state and validate every rule window against its duration.
    pub fn new(
        id: StateId,
        name: impl Into<String>,
        source: BlendNode,
        transitions: IndexMap<String, TransitionRule>,
        end_transition: TransitionRule,
    ) -> Result<Self, ConfigurationError> {
        let duration = source.duration();
        for rule in transitions.values() {
            rule.validate(duration)?;
        }
        end_transition.validate(duration)?;
        Ok(Self {
            id,
            name: name.into(),
            source,
            transitions,
            end_transition,
            duration,
        })
    }

    /// State time folded into one clip pass, used for window checks.
    pub fn phase(&self, time: f32) -> f32 {
        match self.duration {
            Some(d) if time >= d => fmod(time, d),
            _ => time.max(0.0),
        }
    }

    /// Phase as a fraction of the duration (0 for states without one).
    pub fn normalized_phase(&self, time: f32) -> f32 {
        match self.duration {
            Some(d) if d > 0.0 => (self.phase(time) / d).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }

    /// First declared rule whose trigger was requested and whose window holds `time`.
    pub fn eligible_rule<'a>(
        &'a self,
        requested: &[String],
        time: f32,
    ) -> Option<(&'a str, &'a TransitionRule)> {
        let phase = self.phase(time);
        self.transitions
            .iter()
            .find(|(trigger, rule)| {
                requested.iter().any(|r| r == *trigger) && rule.window.contains(phase)
            })
            .map(|(trigger, rule)| (trigger.as_str(), rule))
    }

    /// Whether advancing from `prev` to `next` reached the end of a clip pass
    /// inside the end rule's window.
    pub fn end_reached(&self, prev: f32, next: f32) -> bool {
        let Some(d) = self.duration else {
            return false;
        };
        if d <= 0.0 || next <= prev {
            return false;
        }
        let crossed = (next / d).floor() > (prev / d).floor();
        crossed && self.end_transition.window.contains(self.phase(prev))
    }

    /// Whether `time` already sits at or past the end of a pass that no end
    /// check saw, e.g. after a fade longer than this state's clip.
    pub fn end_overdue(&self, time: f32) -> bool {
        match self.duration {
            Some(d) if d > 0.0 && time >= d => {
                self.end_transition.window.contains(self.phase(time))
            }
            _ => false,
        }
    }
}
