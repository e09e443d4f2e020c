use serde::{Deserialize, Serialize};

use crate::membrane::Membrane;
use crate::params::SynapseTypeParameters;
use crate::prng::Prng;
use crate::topology::SynapseDefinition;

/// Arena index of a cell inside a [`Simulation`](crate::simulation::Simulation).
pub type CellId = usize;

/// Arena index of a synapse inside a [`Simulation`](crate::simulation::Simulation).
pub type SynapseId = usize;

/// Simulation step counter.
pub type Step = u64;

/// Which weight(s) a pre-synaptic cell transmits through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellType {
    #[default]
    Excitatory,
    Inhibitory,
    Mixed,
}

impl CellType {
    #[inline]
    pub fn excites(self) -> bool {
        matches!(self, CellType::Excitatory | CellType::Mixed)
    }

    #[inline]
    pub fn inhibits(self) -> bool {
        matches!(self, CellType::Inhibitory | CellType::Mixed)
    }
}

/// Plastic connection between two cells of the arena.
///
/// `s_tag` is the eligibility trace: pre-then-post firing pushes it up,
/// post-then-pre pushes it down. It only becomes a weight change through
/// [`update`](Self::update), scaled by dopamine unless the synapse is
/// unsupervised.
#[derive(Debug, Clone)]
pub struct Synapse {
    pub(crate) pre: CellId,
    pub(crate) post: CellId,
    label: String,
    pre_cell_type: CellType,

    strength: f64,
    inhibitory_strength: f64,
    s_tag: f64,
    last_s_tag_decay: Step,

    stdp_scalar: f64,
    max_strength: f64,
    min_strength: f64,
    noise_factor: f64,
    s_tag_decay_rate: f64,
    reward_scalar: f64,
    unsupervised: bool,
}

impl Synapse {
    pub fn new(
        pre: CellId,
        post: CellId,
        pre_cell_type: CellType,
        definition: &SynapseDefinition,
        params: &SynapseTypeParameters,
    ) -> Self {
        Self {
            pre,
            post,
            label: definition.label.clone(),
            pre_cell_type,
            strength: definition.starting_strength,
            inhibitory_strength: definition.starting_inhibitory_strength,
            s_tag: params.starting_s_tag,
            last_s_tag_decay: 0,
            stdp_scalar: params.stdp_scalar,
            max_strength: params.max_strength,
            min_strength: params.min_strength,
            noise_factor: params.noise_factor,
            s_tag_decay_rate: definition.s_tag_decay_rate,
            reward_scalar: definition.reward_scalar,
            unsupervised: definition.unsupervised_stdp,
        }
    }

    pub fn pre(&self) -> CellId {
        self.pre
    }

    pub fn post(&self) -> CellId {
        self.post
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pre_cell_type(&self) -> CellType {
        self.pre_cell_type
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn inhibitory_strength(&self) -> f64 {
        self.inhibitory_strength
    }

    pub fn s_tag(&self) -> f64 {
        self.s_tag
    }

    pub fn reward_scalar(&self) -> f64 {
        self.reward_scalar
    }

    pub fn s_tag_decay_rate(&self) -> f64 {
        self.s_tag_decay_rate
    }

    pub fn unsupervised(&self) -> bool {
        self.unsupervised
    }

    pub(crate) fn set_strength(&mut self, strength: f64) {
        self.strength = strength;
    }

    pub(crate) fn set_inhibitory_strength(&mut self, strength: f64) {
        self.inhibitory_strength = strength;
    }

    /// Clamp both weights into `[min_strength, max_strength]`.
    pub fn cap(&mut self) {
        self.strength = self.clamp_weight(self.strength);
        self.inhibitory_strength = self.clamp_weight(self.inhibitory_strength);
    }

    #[inline]
    fn clamp_weight(&self, w: f64) -> f64 {
        if w >= self.max_strength {
            self.max_strength
        } else if w < self.min_strength {
            self.min_strength
        } else {
            w
        }
    }

    /// Epoch boundary: drop the trace whether or not it was ever applied.
    pub(crate) fn reset_s_tag(&mut self) {
        self.s_tag = 0.0;
    }

    // Lazy decay: catch up on every step since the last touch.
    fn decay_s_tag(&mut self, step: Step) {
        let elapsed = step.saturating_sub(self.last_s_tag_decay);
        self.last_s_tag_decay = step;
        if elapsed > 0 && self.s_tag != 0.0 {
            self.s_tag *= (1.0 - self.s_tag_decay_rate).powf(elapsed as f64);
        }
    }

    /// Convert the trace into a weight change, gated by dopamine.
    pub fn update(&mut self, step: Step, dopamine: f64) {
        self.decay_s_tag(step);
        let gate = if self.unsupervised { 1.0 } else { dopamine };
        self.strength += self.s_tag * gate * self.reward_scalar;
        self.cap();
    }

    /// The pre-synaptic cell fired: transmit into `post` and record
    /// post-before-pre depression from its calcium trace.
    pub fn pre_fire(&mut self, step: Step, post: &mut Membrane, rng: &mut Prng) {
        if self.pre_cell_type.inhibits() {
            post.receive_input(-self.inhibitory_strength);
        }

        if self.pre_cell_type.excites() {
            self.decay_s_tag(step);
            self.s_tag -= self.stdp_scalar * post.calcium();

            if self.noise_factor > 0.0 {
                let noise = self.noise_factor * rng.uniform(-1.0, 1.0) * self.strength;
                post.receive_input(self.strength + noise);
            } else {
                post.receive_input(self.strength);
            }
        }
    }

    /// The post-synaptic cell fired: record pre-before-post potentiation
    /// from the pre-synaptic calcium trace.
    pub fn post_fire(&mut self, step: Step, pre_calcium: f64) {
        if self.pre_cell_type == CellType::Inhibitory {
            return;
        }
        self.decay_s_tag(step);
        self.s_tag += self.stdp_scalar * pre_calcium;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::CellTypeParameters;

    fn definition(strength: f64, inhibitory: f64) -> SynapseDefinition {
        SynapseDefinition::new("a", "b", strength).with_inhibitory_strength(inhibitory)
    }

    fn synapse(kind: CellType, strength: f64, inhibitory: f64) -> Synapse {
        let params = SynapseTypeParameters {
            stdp_scalar: 0.01,
            max_strength: 0.4,
            ..Default::default()
        };
        Synapse::new(0, 1, kind, &definition(strength, inhibitory), &params)
    }

    fn membrane_with_calcium(calcium: f64) -> Membrane {
        let p = CellTypeParameters {
            starting_calcium: calcium,
            ..Default::default()
        };
        Membrane::new(&p, 1.0)
    }

    #[test]
    fn cap_clamps_both_weights() {
        let mut s = synapse(CellType::Mixed, 0.0, 0.0);
        s.set_strength(1.0);
        s.set_inhibitory_strength(-0.5);
        s.cap();
        assert_eq!(s.strength(), 0.4);
        assert_eq!(s.inhibitory_strength(), 0.0);
    }

    #[test]
    fn excitatory_pre_fire_transmits_and_depresses() {
        let mut s = synapse(CellType::Excitatory, 0.1, 0.3);
        let mut post = membrane_with_calcium(0.5);
        let mut rng = Prng::new(1);
        s.pre_fire(0, &mut post, &mut rng);
        assert_eq!(post.input_current(), 0.1);
        assert!((s.s_tag() - (-0.005)).abs() < 1e-15);
    }

    #[test]
    fn inhibitory_pre_fire_only_transmits_negative_weight() {
        let mut s = synapse(CellType::Inhibitory, 0.1, 0.3);
        let mut post = membrane_with_calcium(0.5);
        let mut rng = Prng::new(1);
        s.pre_fire(0, &mut post, &mut rng);
        assert_eq!(post.input_current(), -0.3);
        assert_eq!(s.s_tag(), 0.0);

        s.post_fire(1, 1.0);
        assert_eq!(s.s_tag(), 0.0);
    }

    #[test]
    fn mixed_pre_fire_transmits_both_weights() {
        let mut s = synapse(CellType::Mixed, 0.1, 0.3);
        let mut post = membrane_with_calcium(0.0);
        let mut rng = Prng::new(1);
        s.pre_fire(0, &mut post, &mut rng);
        assert!((post.input_current() - (-0.2)).abs() < 1e-15);
    }

    #[test]
    fn post_fire_potentiates_from_pre_calcium() {
        let mut s = synapse(CellType::Excitatory, 0.1, 0.0);
        s.post_fire(0, 0.8);
        assert!((s.s_tag() - 0.008).abs() < 1e-15);
    }

    #[test]
    fn noise_stays_within_relative_band() {
        let params = SynapseTypeParameters {
            noise_factor: 0.5,
            max_strength: 0.4,
            ..Default::default()
        };
        let mut rng = Prng::new(11);
        for _ in 0..100 {
            let mut s = Synapse::new(0, 1, CellType::Excitatory, &definition(0.2, 0.0), &params);
            let mut post = membrane_with_calcium(0.0);
            s.pre_fire(0, &mut post, &mut rng);
            let delivered = post.input_current();
            assert!((0.1..=0.3).contains(&delivered));
        }
    }

    #[test]
    fn update_is_gated_by_dopamine() {
        let mut s = synapse(CellType::Excitatory, 0.1, 0.0);
        s.post_fire(0, 1.0);
        s.update(0, 0.0);
        assert_eq!(s.strength(), 0.1);
        s.update(0, 1.0);
        assert!(s.strength() > 0.1);
    }

    #[test]
    fn unsupervised_update_ignores_dopamine() {
        let params = SynapseTypeParameters {
            max_strength: 0.4,
            ..Default::default()
        };
        let def = definition(0.1, 0.0).with_unsupervised_stdp(true);
        let mut s = Synapse::new(0, 1, CellType::Excitatory, &def, &params);
        s.post_fire(0, 1.0);
        s.update(0, 0.0);
        assert!(s.strength() > 0.1);
    }

    #[test]
    fn trace_decays_lazily_between_touches() {
        let mut s = synapse(CellType::Excitatory, 0.1, 0.0);
        s.post_fire(0, 1.0);
        let fresh = s.s_tag();
        s.update(100, 0.0);
        let expected = fresh * (1.0 - 0.002f64).powf(100.0);
        assert!((s.s_tag() - expected).abs() < 1e-15);
    }

    #[test]
    fn update_respects_bounds() {
        let mut s = synapse(CellType::Excitatory, 0.39, 0.0);
        s.post_fire(0, 1000.0);
        s.update(0, 1.0);
        assert_eq!(s.strength(), 0.4);
    }
}
