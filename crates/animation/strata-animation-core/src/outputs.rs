//! Output contracts from the animation manager.
//!
//! Poses are read through the manager's query methods; `Outputs` carries only
//! the discrete events raised during one `update`.

use serde::{Deserialize, Serialize};

use crate::ids::LayerId;

/// Why a requested trigger did not fire.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// The current state declares no rule with that trigger name.
    UnknownTrigger,
    /// A rule exists but its window does not contain the current time.
    OutsideWindow,
    /// The rule targets the state that is already playing.
    AlreadyInState,
    /// The layer is mid-fade; requests are not queued across fades.
    Transitioning,
    /// Another trigger requested in the same tick won by declaration order.
    Superseded,
    /// The rule names a state the layer does not have.
    UnknownTarget,
}

/// Discrete semantic signals emitted during stepping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CoreEvent {
    TransitionStarted {
        layer: LayerId,
        from: String,
        to: String,
        /// `None` for end-of-clip transitions.
        trigger: Option<String>,
        kind: String,
        fade: f32,
    },
    StateEntered {
        layer: LayerId,
        state: String,
        previous: String,
    },
    EndReached {
        layer: LayerId,
        state: String,
    },
    TriggerIgnored {
        layer: LayerId,
        trigger: String,
        reason: IgnoreReason,
    },
    /// A composited channel rose through the arm threshold.
    ChannelArmed {
        channel: String,
        value: f32,
    },
    /// The clip source failed; the layer fell back to the bind pose this tick.
    ClipSourceFallback {
        layer: LayerId,
        message: String,
    },
}

/// Outputs returned by `AnimationManager::update()`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Outputs {
    #[serde(default)]
    pub events: Vec<CoreEvent>,
    /// Events discarded this tick because the cap was reached.
    #[serde(default)]
    pub dropped_events: usize,
    #[serde(skip)]
    cap: usize,
}

impl Outputs {
    /// Reset for a new tick, retaining at most `cap` events.
    #[inline]
    pub fn begin_tick(&mut self, cap: usize) {
        self.events.clear();
        self.dropped_events = 0;
        self.cap = cap;
    }

    #[inline]
    pub fn push_event(&mut self, event: CoreEvent) {
        if self.events.len() < self.cap {
            self.events.push(event);
        } else {
            if self.dropped_events == 0 {
                tracing::warn!(cap = self.cap, "event cap reached; dropping further events this tick");
            }
            self.dropped_events += 1;
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
