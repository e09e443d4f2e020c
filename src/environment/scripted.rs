use hashbrown::HashMap;

use super::{Environment, EpochChallenge, ResultTracker};
use crate::simulation::Stimulus;
use crate::synapse::Step;
use crate::topology::OutputId;

/// Fixed input script with an optional rewarded output per epoch.
#[derive(Debug, Clone)]
pub struct ScriptedEnvironment {
    challenge: EpochChallenge,
    stimuli: HashMap<Step, Vec<Stimulus>>,
    reward_ids: Vec<Option<OutputId>>,
    reward_id: Option<OutputId>,
}

impl ScriptedEnvironment {
    /// `points` are `(step, x, y, current)`; `reward_ids[k]` is the output
    /// that earns a reward in epoch `k`.
    pub fn new(
        points: &[(Step, i32, i32, f64)],
        reward_ids: Vec<Option<OutputId>>,
        epoch_length: u64,
        input_delay: u64,
    ) -> Self {
        let mut stimuli: HashMap<Step, Vec<Stimulus>> = HashMap::new();
        for &(step, x, y, current) in points {
            stimuli.entry(step).or_default().push(Stimulus::new(x, y, current));
        }
        let reward_id = reward_ids.first().copied().flatten();
        Self {
            challenge: EpochChallenge::new(epoch_length, input_delay),
            stimuli,
            reward_ids,
            reward_id,
        }
    }
}

impl Environment for ScriptedEnvironment {
    fn advance(&mut self, step: Step) {
        self.challenge.advance(step);
        if self.challenge.is_epoch_start(step) {
            self.reward_id = self
                .challenge
                .epoch_index(step)
                .and_then(|k| self.reward_ids.get(k as usize).copied().flatten());
        }
    }

    fn active(&self, step: Step) -> bool {
        self.stimuli.contains_key(&step)
    }

    fn stimuli(&self, step: Step) -> Vec<Stimulus> {
        self.stimuli.get(&step).cloned().unwrap_or_default()
    }

    fn has_reward(&mut self) -> bool {
        self.challenge.has_reward()
    }

    fn accept_fire(&mut self, _step: Step, output_id: OutputId) {
        if self.reward_id == Some(output_id) {
            self.challenge.record_fire(true);
        }
    }

    fn desired_output_id(&self, _step: Step) -> Option<OutputId> {
        self.reward_id
    }

    fn results(&self) -> Option<&ResultTracker> {
        Some(self.challenge.results())
    }
}
