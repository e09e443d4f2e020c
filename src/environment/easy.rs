use super::{Environment, EpochChallenge, ResultTracker};
use crate::prng::Prng;
use crate::simulation::Stimulus;
use crate::synapse::Step;
use crate::topology::OutputId;

const INPUT_CURRENT: f64 = 0.3;
const DISTRACTOR_CHANCE: f64 = 0.5;

/// Two-choice task: each epoch one of two inputs is pulsed and the matching
/// output has to fire. A third, unrelated input is pulsed half the time.
#[derive(Debug, Clone)]
pub struct EasyEnvironment {
    challenge: EpochChallenge,
    rng: Prng,
    first_stage: bool,
    distractor: bool,
}

impl EasyEnvironment {
    pub fn new(epoch_length: u64, input_delay: u64, seed: u64) -> Self {
        Self {
            challenge: EpochChallenge::new(epoch_length, input_delay),
            rng: Prng::new(seed),
            first_stage: true,
            distractor: false,
        }
    }
}

impl Environment for EasyEnvironment {
    fn advance(&mut self, step: Step) {
        self.challenge.advance(step);
        if self.challenge.is_epoch_start(step) {
            self.distractor = self.rng.chance(DISTRACTOR_CHANCE);
            self.first_stage = self.rng.chance(0.5);
        }
    }

    fn active(&self, step: Step) -> bool {
        self.challenge.is_epoch_start(step)
    }

    fn stimuli(&self, step: Step) -> Vec<Stimulus> {
        if !self.challenge.is_epoch_start(step) {
            return Vec::new();
        }
        let mut stimuli = vec![if self.first_stage {
            Stimulus::new(0, 0, INPUT_CURRENT)
        } else {
            Stimulus::new(0, 1, INPUT_CURRENT)
        }];
        if self.distractor {
            stimuli.push(Stimulus::new(0, 2, INPUT_CURRENT));
        }
        stimuli
    }

    fn has_reward(&mut self) -> bool {
        self.challenge.has_reward()
    }

    fn accept_fire(&mut self, step: Step, output_id: OutputId) {
        if let Some(desired) = self.desired_output_id(step) {
            self.challenge.record_fire(output_id == desired);
        }
    }

    fn desired_output_id(&self, step: Step) -> Option<OutputId> {
        self.challenge.phase(step)?;
        Some(if self.first_stage { 0 } else { 1 })
    }

    fn results(&self) -> Option<&ResultTracker> {
        Some(self.challenge.results())
    }
}
