//! Animation layers: one state machine each, producing one pose per tick.
//!
//! A layer is either steady in one state or fading between two. Trigger
//! requests are applied before time advances, so a fade started by a request
//! made before `update(dt)` has already progressed by `dt` when it is sampled.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::blend_tree::EvalContext;
use crate::config::{Config, SyncFadePhase};
use crate::error::{ClipSourceError, ConfigurationError};
use crate::ids::{LayerId, StateId};
use crate::interp::functions::lerp_f32;
use crate::interp::BlendCurve;
use crate::outputs::{CoreEvent, IgnoreReason, Outputs};
use crate::pose::PoseBuffer;
use crate::sampling::fmod;
use crate::scratch::Scratch;
use crate::state::SteadyState;
use crate::transition::{TransitionKind, TransitionRule};

/// How a layer's pose is combined with the layers beneath it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    #[default]
    Lerp,
    Additive,
    Override,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayerBlend {
    pub mode: BlendMode,
    pub weight: f32,
    /// Runtime scalar multiplied into `weight` (e.g. "head_blend").
    pub key: Option<String>,
}

impl Default for LayerBlend {
    fn default() -> Self {
        Self {
            mode: BlendMode::Lerp,
            weight: 1.0,
            key: None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LayerMachine {
    Steady {
        state: StateId,
        time: f32,
    },
    Transitioning {
        from: StateId,
        from_time: f32,
        to: StateId,
        to_time: f32,
        elapsed: f32,
        total: f32,
        curve: BlendCurve,
    },
}

#[derive(Debug)]
pub struct AnimationLayer {
    id: LayerId,
    name: String,
    blend: LayerBlend,
    states: Vec<SteadyState>,
    by_name: HashMap<String, StateId>,
    machine: Option<LayerMachine>,
    has_explicit_default: bool,
    pose: PoseBuffer,
}

impl AnimationLayer {
    pub fn new(id: LayerId, name: impl Into<String>, blend: LayerBlend, joint_count: usize) -> Self {
        Self {
            id,
            name: name.into(),
            blend,
            states: Vec::new(),
            by_name: HashMap::new(),
            machine: None,
            has_explicit_default: false,
            pose: PoseBuffer::with_joint_count(joint_count),
        }
    }

    #[inline]
    pub fn id(&self) -> LayerId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn blend(&self) -> &LayerBlend {
        &self.blend
    }

    /// Id the next added state will receive.
    pub fn next_state_id(&self) -> StateId {
        StateId(self.states.len() as u32)
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Append a state. The first state added becomes the initial state unless
    /// a later one is flagged `default`; the first flagged state wins.
    pub fn push_state(
        &mut self,
        mut state: SteadyState,
        default: bool,
    ) -> Result<StateId, ConfigurationError> {
        if self.by_name.contains_key(&state.name) {
            return Err(ConfigurationError::DuplicateState {
                layer: self.name.clone(),
                state: state.name.clone(),
            });
        }
        let id = self.next_state_id();
        state.id = id;
        self.by_name.insert(state.name.clone(), id);
        self.states.push(state);
        if self.machine.is_none() || (default && !self.has_explicit_default) {
            self.machine = Some(LayerMachine::Steady {
                state: id,
                time: 0.0,
            });
        }
        self.has_explicit_default |= default;
        Ok(id)
    }

    pub fn states(&self) -> &[SteadyState] {
        &self.states
    }

    pub fn state(&self, id: StateId) -> Option<&SteadyState> {
        self.states.get(id.index())
    }

    pub fn find_state(&self, name: &str) -> Option<StateId> {
        self.by_name.get(name).copied()
    }

    pub fn state_mut_by_name(&mut self, name: &str) -> Option<&mut SteadyState> {
        let id = self.find_state(name)?;
        self.states.get_mut(id.index())
    }

    pub fn states_mut(&mut self) -> impl Iterator<Item = &mut SteadyState> {
        self.states.iter_mut()
    }

    pub fn machine(&self) -> Option<&LayerMachine> {
        self.machine.as_ref()
    }

    /// The steady state, or the fade target while transitioning.
    pub fn current_state(&self) -> Option<&SteadyState> {
        match self.machine? {
            LayerMachine::Steady { state, .. } => self.state(state),
            LayerMachine::Transitioning { to, .. } => self.state(to),
        }
    }

    /// Weight given to the target state while fading.
    pub fn transition_weight(&self) -> Option<f32> {
        match self.machine? {
            LayerMachine::Steady { .. } => None,
            LayerMachine::Transitioning {
                elapsed,
                total,
                curve,
                ..
            } => Some(curve.apply(elapsed / total)),
        }
    }

    pub fn pose(&self) -> &PoseBuffer {
        &self.pose
    }

    pub(crate) fn pose_mut(&mut self) -> &mut PoseBuffer {
        &mut self.pose
    }

    /// Every rule target must name a state of this layer.
    pub fn validate_targets(&self) -> Result<(), ConfigurationError> {
        for state in &self.states {
            let targets = state
                .transitions
                .values()
                .chain(std::iter::once(&state.end_transition));
            for rule in targets {
                if !self.by_name.contains_key(&rule.target) {
                    return Err(ConfigurationError::UnknownState {
                        layer: self.name.clone(),
                        state: rule.target.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Apply this tick's trigger requests, then advance time by `dt`.
    pub fn advance(&mut self, dt: f32, requests: &[String], cfg: &Config, out: &mut Outputs) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        match self.machine {
            None => {
                for trigger in requests {
                    warn!(layer = %self.name, trigger = %trigger, "trigger on a layer without states");
                    self.ignore(trigger, IgnoreReason::UnknownTrigger, out);
                }
                return;
            }
            Some(LayerMachine::Steady { state, time }) if !requests.is_empty() => {
                self.apply_requests(state, time, requests, cfg, out);
            }
            Some(LayerMachine::Transitioning { .. }) => {
                for trigger in requests {
                    debug!(layer = %self.name, trigger = %trigger, "trigger dropped during fade");
                    self.ignore(trigger, IgnoreReason::Transitioning, out);
                }
            }
            Some(LayerMachine::Steady { .. }) => {}
        }
        self.step(dt, cfg, out);
    }

    fn ignore(&self, trigger: &str, reason: IgnoreReason, out: &mut Outputs) {
        out.push_event(CoreEvent::TriggerIgnored {
            layer: self.id,
            trigger: trigger.to_string(),
            reason,
        });
    }

    fn apply_requests(
        &mut self,
        state: StateId,
        time: f32,
        requests: &[String],
        cfg: &Config,
        out: &mut Outputs,
    ) {
        let Some(current) = self.states.get(state.index()) else {
            return;
        };
        let phase = current.phase(time);
        let winner = current
            .eligible_rule(requests, time)
            .map(|(trigger, rule)| (trigger.to_string(), rule.clone()));

        let mut reported: Vec<(&str, IgnoreReason)> = Vec::new();
        for trigger in requests {
            if winner.as_ref().is_some_and(|(w, _)| w == trigger) {
                continue;
            }
            let reason = match current.transitions.get(trigger) {
                None => {
                    warn!(layer = %self.name, state = %current.name, trigger = %trigger, "unknown trigger");
                    IgnoreReason::UnknownTrigger
                }
                Some(rule) if !rule.window.contains(phase) => {
                    debug!(layer = %self.name, trigger = %trigger, phase, "trigger outside its window");
                    IgnoreReason::OutsideWindow
                }
                Some(_) => IgnoreReason::Superseded,
            };
            reported.push((trigger, reason));
        }
        for (trigger, reason) in reported {
            self.ignore(trigger, reason, out);
        }

        let Some((trigger, rule)) = winner else {
            return;
        };
        if rule.target == current.name {
            debug!(layer = %self.name, trigger = %trigger, "already in target state");
            self.ignore(&trigger, IgnoreReason::AlreadyInState, out);
            return;
        }
        self.fire(state, time, &rule, Some(&trigger), cfg, out);
    }

    /// Switch from `from` according to `rule`. Returns false if the target is unknown.
    fn fire(
        &mut self,
        from: StateId,
        from_time: f32,
        rule: &TransitionRule,
        trigger: Option<&str>,
        cfg: &Config,
        out: &mut Outputs,
    ) -> bool {
        let Some(to) = self.find_state(&rule.target) else {
            warn!(layer = %self.name, target = %rule.target, "transition to unknown state ignored");
            if let Some(trigger) = trigger {
                self.ignore(trigger, IgnoreReason::UnknownTarget, out);
            }
            return false;
        };
        let (Some(from_state), Some(to_state)) = (self.state(from), self.state(to)) else {
            return false;
        };
        let from_name = from_state.name.clone();
        let to_name = to_state.name.clone();

        let fade = rule.kind.fade();
        out.push_event(CoreEvent::TransitionStarted {
            layer: self.id,
            from: from_name.clone(),
            to: to_name.clone(),
            trigger: trigger.map(str::to_string),
            kind: rule.kind.name().to_string(),
            fade: fade.map_or(0.0, |(d, _)| d),
        });
        match fade {
            None => {
                debug!(layer = %self.name, from = %from_name, to = %to_name, "immediate transition");
                self.machine = Some(LayerMachine::Steady {
                    state: to,
                    time: 0.0,
                });
                out.push_event(CoreEvent::StateEntered {
                    layer: self.id,
                    state: to_name,
                    previous: from_name,
                });
            }
            Some((total, curve)) => {
                let to_time = match (rule.kind, cfg.sync_fade_phase) {
                    (TransitionKind::SyncFade { .. }, SyncFadePhase::MatchPhase) => {
                        from_state.normalized_phase(from_time) * to_state.duration.unwrap_or(0.0)
                    }
                    _ => 0.0,
                };
                debug!(
                    layer = %self.name,
                    from = %from_name,
                    to = %to_name,
                    fade = total,
                    curve = curve.name(),
                    "fade started"
                );
                self.machine = Some(LayerMachine::Transitioning {
                    from,
                    from_time,
                    to,
                    to_time,
                    elapsed: 0.0,
                    total,
                    curve,
                });
            }
        }
        true
    }

    /// Advance a state's clock. Immediate self-loops fold back into `[0, d)`
    /// whether or not their end window let the rule fire.
    fn advance_clock(&self, state: StateId, time: f32, dt: f32) -> f32 {
        let next = time + dt;
        match self.state(state) {
            Some(st) => fold_self_loop(st, next),
            None => next,
        }
    }

    /// Run `state`'s end rule at `time`: wrap a self-loop, otherwise fire it.
    fn finish_pass(&mut self, state: StateId, time: f32, cfg: &Config, out: &mut Outputs) {
        let Some(st) = self.state(state) else {
            return;
        };
        out.push_event(CoreEvent::EndReached {
            layer: self.id,
            state: st.name.clone(),
        });
        let duration = st.duration.unwrap_or(0.0);
        if is_self_loop(st) {
            self.machine = Some(LayerMachine::Steady {
                state,
                time: fmod(time, duration),
            });
            return;
        }
        let rule = st.end_transition.clone();
        if !self.fire(state, time, &rule, None, cfg, out) {
            // Unknown target: try again at the end of the next pass.
            self.machine = Some(LayerMachine::Steady {
                state,
                time: fmod(time, duration),
            });
        }
    }

    fn step(&mut self, dt: f32, cfg: &Config, out: &mut Outputs) {
        match self.machine {
            None => {}
            Some(LayerMachine::Steady { state, time }) => {
                let next = time + dt;
                let Some(st) = self.state(state) else {
                    return;
                };
                if st.end_overdue(time) || st.end_reached(time, next) {
                    self.finish_pass(state, next, cfg, out);
                } else {
                    let time = fold_self_loop(st, next);
                    self.machine = Some(LayerMachine::Steady { state, time });
                }
            }
            Some(LayerMachine::Transitioning {
                from,
                from_time,
                to,
                to_time,
                elapsed,
                total,
                curve,
            }) => {
                let from_time = self.advance_clock(from, from_time, dt);
                let to_time = self.advance_clock(to, to_time, dt);
                let elapsed = elapsed + dt;
                if elapsed >= total {
                    let previous = self.state(from).map(|s| s.name.clone()).unwrap_or_default();
                    let entered = self.state(to).map(|s| s.name.clone()).unwrap_or_default();
                    debug!(layer = %self.name, state = %entered, "fade complete");
                    self.machine = Some(LayerMachine::Steady {
                        state: to,
                        time: to_time,
                    });
                    out.push_event(CoreEvent::StateEntered {
                        layer: self.id,
                        state: entered,
                        previous,
                    });
                    // The target may have run past its end while fading in.
                    if self.state(to).is_some_and(|st| st.end_overdue(to_time)) {
                        self.finish_pass(to, to_time, cfg, out);
                    }
                } else {
                    self.machine = Some(LayerMachine::Transitioning {
                        from,
                        from_time,
                        to,
                        to_time,
                        elapsed,
                        total,
                        curve,
                    });
                }
            }
        }
    }

    /// Evaluate the active state(s) into the layer pose.
    pub fn evaluate(
        &mut self,
        ctx: &EvalContext<'_>,
        scratch: &mut Scratch,
    ) -> Result<bool, ClipSourceError> {
        match self.machine {
            None => {
                self.pose.clear();
                Ok(false)
            }
            Some(LayerMachine::Steady { state, time }) => match self.states.get_mut(state.index()) {
                Some(st) => st.source.evaluate(ctx, time, &mut self.pose, scratch),
                None => {
                    self.pose.clear();
                    Ok(false)
                }
            },
            Some(LayerMachine::Transitioning {
                from,
                from_time,
                to,
                to_time,
                elapsed,
                total,
                curve,
            }) => {
                let weight = curve.apply(elapsed / total);
                let mut a = scratch.acquire_pose();
                let mut b = scratch.acquire_pose();
                let mut result = Ok(());
                if let Some(st) = self.states.get_mut(from.index()) {
                    result = st.source.evaluate(ctx, from_time, &mut a, scratch).map(|_| ());
                }
                if result.is_ok() {
                    if let Some(st) = self.states.get_mut(to.index()) {
                        result = st.source.evaluate(ctx, to_time, &mut b, scratch).map(|_| ());
                    }
                }
                if result.is_ok() {
                    crossfade(&a, &b, weight, &mut self.pose);
                }
                scratch.release_pose(a);
                scratch.release_pose(b);
                result?;
                Ok(!self.pose.is_empty())
            }
        }
    }
}

fn is_self_loop(state: &SteadyState) -> bool {
    state.end_transition.target == state.name
        && matches!(state.end_transition.kind, TransitionKind::Immediate)
}

fn fold_self_loop(state: &SteadyState, time: f32) -> f32 {
    match state.duration {
        Some(d) if d > 0.0 && time >= d && is_self_loop(state) => fmod(time, d),
        _ => time,
    }
}

/// Per-joint blend of `a` toward `b`; a joint or channel present on one side only keeps that side.
fn crossfade(a: &PoseBuffer, b: &PoseBuffer, weight: f32, out: &mut PoseBuffer) {
    out.clear();
    for index in 0..out.joint_count() {
        match (a.joint(index), b.joint(index)) {
            (Some(ta), Some(tb)) => out.set_joint(index, ta.lerp(tb, weight)),
            (Some(t), None) | (None, Some(t)) => out.set_joint(index, *t),
            (None, None) => {}
        }
    }
    for (name, va) in a.channels() {
        let value = match b.channel(name) {
            Some(vb) => lerp_f32(va, vb, weight),
            None => va,
        };
        out.set_channel(name, value);
    }
    for (name, vb) in b.channels() {
        if a.channel(name).is_none() {
            out.set_channel(name, vb);
        }
    }
}
