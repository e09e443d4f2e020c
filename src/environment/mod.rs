//! Environments drive a [`Simulation`] from the outside: they inject
//! stimuli, judge which output cells fired and decide when to reward.

use core::ops::Range;

use crate::simulation::{Simulation, Stimulus};
use crate::synapse::Step;
use crate::topology::OutputId;

mod challenge;
mod easy;
mod image;
mod scripted;
mod stdp;

pub use challenge::{EpochChallenge, ResultTracker};
pub use easy::EasyEnvironment;
pub use image::ImageEnvironment;
pub use scripted::ScriptedEnvironment;
pub use stdp::StdpEnvironment;

/// The outside world of a simulation.
///
/// Per step the driver calls [`advance`](Self::advance) first, then
/// queries stimuli, reward and activity, steps the simulation, and reports
/// every fired output back through [`accept_fire`](Self::accept_fire).
pub trait Environment {
    fn advance(&mut self, _step: Step) {}

    /// Whether the environment is doing something this step. Keeps the
    /// simulation out of warp.
    fn active(&self, step: Step) -> bool;

    fn stimuli(&self, step: Step) -> Vec<Stimulus>;

    /// Edge-triggered: true at most once per earned reward.
    fn has_reward(&mut self) -> bool;

    fn accept_fire(&mut self, _step: Step, _output_id: OutputId) {}

    fn desired_output_id(&self, _step: Step) -> Option<OutputId> {
        None
    }

    /// Win/loss bookkeeping, for environments that keep score.
    fn results(&self) -> Option<&ResultTracker> {
        None
    }
}

/// Drive `sim` through `steps` inside `env`. Returns how many output fires
/// were reported.
pub fn run_steps<E: Environment + ?Sized>(sim: &mut Simulation, env: &mut E, steps: Range<Step>) -> usize {
    let mut fired = 0;
    for step in steps {
        env.advance(step);
        let stimuli = env.stimuli(step);
        let reward = env.has_reward();
        let active = env.active(step);
        for output_id in sim.step(step, &stimuli, reward, active) {
            env.accept_fire(step, output_id);
            fired += 1;
        }
    }
    fired
}

/// `step - input_delay`, signed so that pre-delay steps are negative.
#[inline]
pub(crate) fn real_step(step: Step, input_delay: u64) -> i64 {
    step as i64 - input_delay as i64
}
