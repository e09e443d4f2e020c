use core::fmt;

use serde::Serialize;

use super::real_step;
use crate::synapse::Step;

/// Per-epoch outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResultTracker {
    pub win: u64,
    pub loss: u64,
    pub none_fired: u64,
    pub all_fired: u64,
    pub indeterminate: u64,
    pub epochs: u64,
}

impl ResultTracker {
    pub fn update(&mut self, correct_fired: bool, incorrect_fired: bool) {
        self.epochs += 1;
        match (correct_fired, incorrect_fired) {
            (true, false) => self.win += 1,
            (false, true) => self.loss += 1,
            (false, false) => {
                self.none_fired += 1;
                self.indeterminate += 1;
            }
            (true, true) => {
                self.all_fired += 1;
                self.indeterminate += 1;
            }
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.epochs == 0 {
            0.0
        } else {
            self.win as f64 / self.epochs as f64
        }
    }
}

impl fmt::Display for ResultTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "epochs={} win={} loss={} none_fired={} all_fired={} indeterminate={}",
            self.epochs, self.win, self.loss, self.none_fired, self.all_fired, self.indeterminate
        )
    }
}

/// Shared epoch bookkeeping for reward-driven tasks.
///
/// The correct output (and only it) must fire within the first half of an
/// epoch. At the half-way point the epoch is scored, and a win is turned
/// into exactly one reward.
#[derive(Debug, Clone)]
pub struct EpochChallenge {
    epoch_length: u64,
    input_delay: u64,
    success: bool,
    reward_provided: bool,
    correct_fired: bool,
    incorrect_fired: bool,
    results: ResultTracker,
}

impl EpochChallenge {
    pub fn new(epoch_length: u64, input_delay: u64) -> Self {
        Self {
            epoch_length: epoch_length.max(1),
            input_delay,
            success: false,
            reward_provided: false,
            correct_fired: false,
            incorrect_fired: false,
            results: ResultTracker::default(),
        }
    }

    pub fn epoch_length(&self) -> u64 {
        self.epoch_length
    }

    pub fn input_delay(&self) -> u64 {
        self.input_delay
    }

    pub fn results(&self) -> &ResultTracker {
        &self.results
    }

    /// Position within the current epoch, or `None` before the input delay.
    pub fn phase(&self, step: Step) -> Option<u64> {
        let real = real_step(step, self.input_delay);
        (real >= 0).then(|| real as u64 % self.epoch_length)
    }

    /// Index of the current epoch, or `None` before the input delay.
    pub fn epoch_index(&self, step: Step) -> Option<u64> {
        let real = real_step(step, self.input_delay);
        (real >= 0).then(|| real as u64 / self.epoch_length)
    }

    pub fn is_epoch_start(&self, step: Step) -> bool {
        self.phase(step) == Some(0)
    }

    pub fn advance(&mut self, step: Step) {
        match self.phase(step) {
            Some(0) => {
                self.correct_fired = false;
                self.incorrect_fired = false;
                self.reward_provided = false;
                self.success = false;
            }
            Some(p) if p == self.epoch_length / 2 => {
                self.results.update(self.correct_fired, self.incorrect_fired);
                self.success = self.correct_fired && !self.incorrect_fired;
            }
            _ => {}
        }
    }

    pub fn record_fire(&mut self, correct: bool) {
        if correct {
            self.correct_fired = true;
        } else {
            self.incorrect_fired = true;
        }
    }

    pub fn has_reward(&mut self) -> bool {
        if self.success && !self.reward_provided {
            self.reward_provided = true;
            return true;
        }
        false
    }
}
