use super::{real_step, Environment};
use crate::simulation::Stimulus;
use crate::synapse::Step;

const SECOND_INPUT_DELAY: u64 = 10;
const INPUT_CURRENT: f64 = 0.1;

/// Pulses `(0,0)` at the start of every epoch and `(1,0)` ten steps later.
/// Never rewards and ignores outputs.
#[derive(Debug, Clone)]
pub struct StdpEnvironment {
    epoch_length: u64,
    input_delay: u64,
}

impl StdpEnvironment {
    pub fn new(epoch_length: u64, input_delay: u64) -> Self {
        Self {
            epoch_length: epoch_length.max(1),
            input_delay,
        }
    }

    fn phase(&self, step: Step) -> Option<u64> {
        let real = real_step(step, self.input_delay);
        (real >= 0).then(|| real as u64 % self.epoch_length)
    }
}

impl Default for StdpEnvironment {
    fn default() -> Self {
        Self::new(400, 50)
    }
}

impl Environment for StdpEnvironment {
    fn active(&self, step: Step) -> bool {
        matches!(self.phase(step), Some(0) | Some(SECOND_INPUT_DELAY))
    }

    fn stimuli(&self, step: Step) -> Vec<Stimulus> {
        match self.phase(step) {
            Some(0) => vec![Stimulus::new(0, 0, INPUT_CURRENT)],
            Some(SECOND_INPUT_DELAY) => vec![Stimulus::new(1, 0, INPUT_CURRENT)],
            _ => Vec::new(),
        }
    }

    fn has_reward(&mut self) -> bool {
        false
    }
}
