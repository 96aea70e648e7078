//! Driver commands queued between ticks.
//!
//! Trigger requests made from anywhere during a tick are queued here and
//! drained in call order at the start of the next `update`.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LayerCommand {
    RequestTransition { layer: String, trigger: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Inputs {
    #[serde(default)]
    pub commands: Vec<LayerCommand>,
}

impl Inputs {
    pub fn push(&mut self, command: LayerCommand) {
        self.commands.push(command);
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Take every queued command in call order, leaving the queue empty.
    pub fn drain(&mut self) -> std::vec::Drain<'_, LayerCommand> {
        self.commands.drain(..)
    }
}
