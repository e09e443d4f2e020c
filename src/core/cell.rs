use hashbrown::HashSet;

use crate::membrane::Membrane;
use crate::params::CellTypeParameters;
use crate::prng::Prng;
use crate::synapse::{CellId, CellType, Step, Synapse, SynapseId};
use crate::topology::{CellDefinition, OutputId};

/// Running fire rate is measured over this many epochs.
pub const FIRE_HISTORY_EPOCHS: u64 = 20;
/// Fraction of the way `target_input` moves toward its new value per epoch.
pub const FIRE_RATE_BALANCE_SCALAR: f64 = 0.01;
/// Blend between the renormalized and the current weight (1 = full renormalize).
pub const INPUT_BALANCE_SCALAR: f64 = 1.0;
/// Visual trace held after a spike, in steps.
pub const FIRE_TRACE_STEPS: u32 = 100;

/// Summed weights around one cell.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightTotals {
    pub positive_in: f64,
    pub negative_in: f64,
    pub positive_out: f64,
    pub negative_out: f64,
    pub target_input: f64,
}

#[derive(Debug, Clone)]
pub struct Cell {
    id: String,
    label: String,
    layer_id: Option<String>,
    cell_type: CellType,
    display_position: (i32, i32),
    layer_position: (i32, i32),
    input_position: Option<(i32, i32)>,
    output_id: Option<OutputId>,

    pub(crate) membrane: Membrane,
    pub(crate) input_synapses: Vec<SynapseId>,
    pub(crate) output_synapses: Vec<SynapseId>,
    /// Synapses whose trace is in flight; updated every step until the epoch ends.
    pub(crate) pending_updates: HashSet<SynapseId>,

    fire_history: Vec<Step>,
    target_input: f64,
    target_fire_rate_per_epoch: f64,
    input_balance: bool,
    output_balance: bool,
    lock_inhibition_strength: bool,
    fire_trace: u32,
}

impl Cell {
    pub fn new(def: &CellDefinition, params: &CellTypeParameters, step_size: f64) -> Self {
        Self {
            id: def.id.clone(),
            label: def.label.clone(),
            layer_id: def.layer_id.clone(),
            cell_type: def.cell_type,
            display_position: (def.x_display_position, def.y_display_position),
            layer_position: (def.x_layer_position, def.y_layer_position),
            input_position: def.input_position,
            output_id: def.output_id,
            membrane: Membrane::new(params, step_size),
            input_synapses: Vec::new(),
            output_synapses: Vec::new(),
            pending_updates: HashSet::new(),
            fire_history: Vec::new(),
            target_input: 0.0,
            target_fire_rate_per_epoch: def.target_fire_rate_per_epoch,
            input_balance: def.input_balance,
            output_balance: def.output_balance,
            lock_inhibition_strength: def.lock_inhibition_strength,
            fire_trace: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn layer_id(&self) -> Option<&str> {
        self.layer_id.as_deref()
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn display_position(&self) -> (i32, i32) {
        self.display_position
    }

    pub fn layer_position(&self) -> (i32, i32) {
        self.layer_position
    }

    pub fn input_position(&self) -> Option<(i32, i32)> {
        self.input_position
    }

    pub fn output_id(&self) -> Option<OutputId> {
        self.output_id
    }

    pub fn membrane(&self) -> &Membrane {
        &self.membrane
    }

    pub fn input_synapses(&self) -> &[SynapseId] {
        &self.input_synapses
    }

    pub fn output_synapses(&self) -> &[SynapseId] {
        &self.output_synapses
    }

    pub fn pending_updates(&self) -> &HashSet<SynapseId> {
        &self.pending_updates
    }

    pub fn fire_history(&self) -> &[Step] {
        &self.fire_history
    }

    pub fn target_input(&self) -> f64 {
        self.target_input
    }

    pub fn fire_trace(&self) -> u32 {
        self.fire_trace
    }

    pub fn target_fire_rate_per_epoch(&self) -> f64 {
        self.target_fire_rate_per_epoch
    }

    pub fn input_balance(&self) -> bool {
        self.input_balance
    }

    /// Snapshot the current positive input total as the balancing target.
    pub(crate) fn init_target_input(&mut self, synapses: &[Synapse]) {
        self.target_input = self.positive_input(synapses);
    }

    pub(crate) fn mark_fired(&mut self) {
        self.fire_trace = FIRE_TRACE_STEPS;
    }

    pub(crate) fn fade_trace(&mut self, steps: u64) {
        let steps = u32::try_from(steps).unwrap_or(u32::MAX);
        self.fire_trace = self.fire_trace.saturating_sub(steps);
    }

    pub fn positive_input(&self, synapses: &[Synapse]) -> f64 {
        self.input_synapses.iter().map(|&s| synapses[s].strength()).sum()
    }

    pub fn negative_input(&self, synapses: &[Synapse]) -> f64 {
        self.input_synapses
            .iter()
            .map(|&s| synapses[s].inhibitory_strength())
            .sum()
    }

    pub fn positive_output(&self, synapses: &[Synapse]) -> f64 {
        self.output_synapses.iter().map(|&s| synapses[s].strength()).sum()
    }

    pub fn negative_output(&self, synapses: &[Synapse]) -> f64 {
        self.output_synapses
            .iter()
            .map(|&s| synapses[s].inhibitory_strength())
            .sum()
    }

    pub fn weight_totals(&self, synapses: &[Synapse]) -> WeightTotals {
        WeightTotals {
            positive_in: self.positive_input(synapses),
            negative_in: self.negative_input(synapses),
            positive_out: self.positive_output(synapses),
            negative_out: self.negative_output(synapses),
            target_input: self.target_input,
        }
    }

    /// Fires within the trailing history window, divided by its length.
    pub fn running_fire_rate(&self, step: Step, epoch_length: u64) -> f64 {
        let window = epoch_length.saturating_mul(FIRE_HISTORY_EPOCHS);
        let recent = self
            .fire_history
            .iter()
            .filter(|&&t| step < window || t > step - window)
            .count() as f64;
        if step > window {
            recent / window as f64
        } else if step > 0 {
            recent / step as f64
        } else {
            0.0
        }
    }

    /// Drop fires older than the trailing history window.
    fn prune_fire_history(&mut self, step: Step, epoch_length: u64) {
        let window = epoch_length.saturating_mul(FIRE_HISTORY_EPOCHS);
        if step >= window {
            let cutoff = step - window;
            self.fire_history.retain(|&t| t > cutoff);
        }
    }

    /// Scale excitatory inputs so they sum to `target`. Returns the new sum.
    fn apply_positive_input_balance(&self, synapses: &mut [Synapse], target: f64) -> f64 {
        let total = self.positive_input(synapses);
        let scale = if total > 0.0 { target / total } else { 1.0 };
        let mut new_total = 0.0;
        for &s in &self.input_synapses {
            let syn = &mut synapses[s];
            let w = syn.strength();
            syn.set_strength(w * scale * INPUT_BALANCE_SCALAR + w * (1.0 - INPUT_BALANCE_SCALAR));
            syn.cap();
            new_total += syn.strength();
        }
        new_total
    }

    fn apply_negative_input_balance(&self, synapses: &mut [Synapse], target: f64) -> f64 {
        let total = self.negative_input(synapses);
        let scale = if total > 0.0 { target / total } else { 1.0 };
        let mut new_total = 0.0;
        for &s in &self.input_synapses {
            let syn = &mut synapses[s];
            let w = syn.inhibitory_strength();
            syn.set_inhibitory_strength(w * scale * INPUT_BALANCE_SCALAR + w * (1.0 - INPUT_BALANCE_SCALAR));
            syn.cap();
            new_total += syn.inhibitory_strength();
        }
        new_total
    }

    /// Homeostasis on the input side: nudge `target_input` toward the value
    /// that would bring the running fire rate onto target, then renormalize
    /// incoming weights to it.
    pub fn fire_rate_balance(&mut self, synapses: &mut [Synapse], step: Step, epoch_length: u64) {
        if step == 0 {
            return;
        }
        self.prune_fire_history(step, epoch_length);
        if !self.input_balance {
            return;
        }
        let target_rate = self.target_fire_rate_per_epoch / epoch_length as f64;
        if target_rate <= 0.0 {
            return;
        }

        let running = self.running_fire_rate(step, epoch_length);
        let ratio = if running > 0.0 { target_rate / running } else { 2.0 };
        let new_target = self.target_input * ratio;
        self.target_input += (new_target - self.target_input) * FIRE_RATE_BALANCE_SCALAR;

        let positive = self.apply_positive_input_balance(synapses, self.target_input);
        // Locked inhibition opts out of the excitation/inhibition equalization.
        let negative = if self.lock_inhibition_strength {
            0.0
        } else {
            self.apply_negative_input_balance(synapses, self.target_input)
        };

        if negative == 0.0 {
            return;
        }
        if positive < negative {
            self.apply_positive_input_balance(synapses, positive);
            self.apply_negative_input_balance(synapses, positive);
        } else {
            self.apply_positive_input_balance(synapses, negative);
            self.apply_negative_input_balance(synapses, negative);
        }
    }

    /// Homeostasis on the output side: scale outgoing weights toward the
    /// mean `target_input` of the downstream cells.
    ///
    /// `target_inputs` is indexed by [`CellId`] and must be captured before any
    /// cell runs [`fire_rate_balance`](Self::fire_rate_balance) this epoch.
    pub fn output_balance(&self, synapses: &mut [Synapse], target_inputs: &[f64]) {
        if !self.output_balance || self.output_synapses.is_empty() {
            return;
        }

        let (sum, counted) = self
            .output_synapses
            .iter()
            .map(|&s| target_inputs[synapses[s].post()])
            .fold((0.0, 0usize), |(sum, n), t| (sum + t, n + usize::from(t > 0.0)));
        if counted == 0 {
            return;
        }
        let average = sum / counted as f64;
        let fan_out = self.output_synapses.len() as f64;

        if self.cell_type.excites() {
            let total = self.positive_output(synapses);
            for &s in &self.output_synapses {
                let syn = &mut synapses[s];
                if total == 0.0 {
                    syn.set_strength(average / fan_out);
                } else {
                    let w = syn.strength();
                    syn.set_strength(w * average / total);
                }
                syn.cap();
            }
        }

        if self.cell_type.inhibits() && !self.lock_inhibition_strength {
            let total = self.negative_output(synapses);
            let scale = if total > 0.0 { average / total } else { 1.0 };
            for &s in &self.output_synapses {
                let syn = &mut synapses[s];
                let w = syn.inhibitory_strength();
                syn.set_inhibitory_strength(w * scale);
                syn.cap();
            }
        }
    }
}

/// Propagate a spike of cell `id` through its synapses.
///
/// Outgoing synapses deliver current and take their depression term;
/// incoming synapses take their potentiation term. Every touched synapse
/// with a nonzero trace is queued on `id` for per-step updates.
pub(crate) fn apply_fire(
    cells: &mut [Cell],
    synapses: &mut [Synapse],
    id: CellId,
    step: Step,
    rng: &mut Prng,
) -> Option<OutputId> {
    cells[id].fire_history.push(step);

    for k in 0..cells[id].output_synapses.len() {
        let sid = cells[id].output_synapses[k];
        let post = synapses[sid].post;
        synapses[sid].pre_fire(step, &mut cells[post].membrane, rng);
        if synapses[sid].s_tag() != 0.0 {
            cells[id].pending_updates.insert(sid);
        }
    }

    for k in 0..cells[id].input_synapses.len() {
        let sid = cells[id].input_synapses[k];
        let pre_calcium = cells[synapses[sid].pre].membrane.calcium();
        synapses[sid].post_fire(step, pre_calcium);
        if synapses[sid].s_tag() != 0.0 {
            cells[id].pending_updates.insert(sid);
        }
    }

    cells[id].output_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SynapseTypeParameters;
    use crate::topology::SynapseDefinition;

    struct Net {
        cells: Vec<Cell>,
        synapses: Vec<Synapse>,
    }

    fn net(defs: &[CellDefinition], edges: &[(usize, usize, f64, f64)]) -> Net {
        let params = CellTypeParameters::default();
        let syn_params = SynapseTypeParameters {
            max_strength: 1.0,
            ..Default::default()
        };
        let mut cells: Vec<Cell> = defs.iter().map(|d| Cell::new(d, &params, 1.0)).collect();
        let mut synapses = Vec::new();
        for (sid, &(pre, post, w, inhib)) in edges.iter().enumerate() {
            let def = SynapseDefinition::new(defs[pre].id.clone(), defs[post].id.clone(), w)
                .with_inhibitory_strength(inhib);
            synapses.push(Synapse::new(pre, post, defs[pre].cell_type, &def, &syn_params));
            cells[pre].output_synapses.push(sid);
            cells[post].input_synapses.push(sid);
        }
        for c in &mut cells {
            c.init_target_input(&synapses);
        }
        Net { cells, synapses }
    }

    #[test]
    fn target_input_starts_at_positive_input_total() {
        let defs = [CellDefinition::new("a"), CellDefinition::new("b"), CellDefinition::new("c")];
        let n = net(&defs, &[(0, 2, 0.1, 0.0), (1, 2, 0.2, 0.5)]);
        assert!((n.cells[2].target_input() - 0.3).abs() < 1e-12);
        let totals = n.cells[2].weight_totals(&n.synapses);
        assert!((totals.negative_in - 0.5).abs() < 1e-12);
        assert_eq!(n.cells[0].weight_totals(&n.synapses).positive_out, 0.1);
    }

    #[test]
    fn apply_fire_transmits_and_queues_traced_synapses() {
        let defs = [CellDefinition::new("a"), CellDefinition::new("b").output(4)];
        let mut n = net(&defs, &[(0, 1, 0.25, 0.0)]);
        let mut rng = Prng::new(1);

        // b has no calcium yet, so the depression term is zero.
        assert_eq!(apply_fire(&mut n.cells, &mut n.synapses, 0, 3, &mut rng), None);
        assert_eq!(n.cells[1].membrane().input_current(), 0.25);
        assert!(n.cells[0].pending_updates().is_empty());
        assert_eq!(n.cells[0].fire_history(), &[3]);

        n.cells[0].membrane = Membrane::new(
            &CellTypeParameters {
                starting_calcium: 0.5,
                ..Default::default()
            },
            1.0,
        );
        assert_eq!(apply_fire(&mut n.cells, &mut n.synapses, 1, 4, &mut rng), Some(4));
        assert!(n.synapses[0].s_tag() > 0.0);
        assert!(n.cells[1].pending_updates().contains(&0));
    }

    #[test]
    fn running_rate_uses_elapsed_steps_before_window_fills() {
        let mut c = Cell::new(&CellDefinition::new("a"), &CellTypeParameters::default(), 1.0);
        c.fire_history = vec![10, 20, 30, 40];
        assert!((c.running_fire_rate(100, 10) - 0.04).abs() < 1e-12);
        // Window is 200 steps; only fires after step 200 count.
        c.fire_history = vec![5, 150, 250, 399];
        assert!((c.running_fire_rate(400, 10) - 2.0 / 200.0).abs() < 1e-12);
    }

    #[test]
    fn fire_rate_balance_raises_input_of_a_silent_cell() {
        let defs = [
            CellDefinition::new("a"),
            CellDefinition::new("b").with_target_fire_rate(1.0),
        ];
        let mut n = net(&defs, &[(0, 1, 0.1, 0.0)]);
        n.cells[1].fire_rate_balance(&mut n.synapses, 100, 10);
        // Silent cell doubles its target, smoothed by 1%.
        assert!((n.cells[1].target_input() - 0.101).abs() < 1e-12);
        assert!((n.synapses[0].strength() - 0.101).abs() < 1e-12);
    }

    #[test]
    fn fire_rate_balance_lowers_input_of_an_overactive_cell() {
        let defs = [
            CellDefinition::new("a"),
            CellDefinition::new("b").with_target_fire_rate(1.0),
        ];
        let mut n = net(&defs, &[(0, 1, 0.1, 0.0), (0, 1, 0.1, 0.0)]);
        n.cells[1].fire_history = (0..50).map(|k| k * 2).collect();
        n.cells[1].fire_rate_balance(&mut n.synapses, 100, 10);
        assert!(n.cells[1].target_input() < 0.2);
        let total = n.cells[1].positive_input(&n.synapses);
        assert!((total - n.cells[1].target_input()).abs() < 1e-12);
    }

    #[test]
    fn fire_rate_balance_is_a_no_op_at_step_zero_or_when_disabled() {
        let defs = [
            CellDefinition::new("a"),
            CellDefinition::new("b").with_target_fire_rate(1.0),
            CellDefinition::new("c"),
        ];
        let mut n = net(&defs, &[(0, 1, 0.1, 0.0), (0, 2, 0.1, 0.0)]);
        n.cells[1].fire_rate_balance(&mut n.synapses, 0, 10);
        n.cells[2].fire_rate_balance(&mut n.synapses, 100, 10);
        assert_eq!(n.synapses[0].strength(), 0.1);
        assert_eq!(n.synapses[1].strength(), 0.1);
    }

    #[test]
    fn fire_rate_balance_equalizes_excitation_and_inhibition() {
        let defs = [
            CellDefinition::new("e"),
            CellDefinition::new("i").with_type(CellType::Inhibitory),
            CellDefinition::new("b").with_target_fire_rate(1.0),
        ];
        let mut n = net(&defs, &[(0, 2, 0.2, 0.0), (1, 2, 0.0, 0.05)]);
        n.cells[2].fire_rate_balance(&mut n.synapses, 100, 10);
        let t = n.cells[2].weight_totals(&n.synapses);
        assert!((t.positive_in - t.negative_in).abs() < 1e-12);
        assert!(t.positive_in > 0.0);
    }

    #[test]
    fn locked_inhibition_is_left_alone() {
        let defs = [
            CellDefinition::new("e"),
            CellDefinition::new("i").with_type(CellType::Inhibitory),
            CellDefinition::new("b")
                .with_target_fire_rate(1.0)
                .with_locked_inhibition(true),
        ];
        let mut n = net(&defs, &[(0, 2, 0.2, 0.0), (1, 2, 0.0, 0.05)]);
        n.cells[2].fire_rate_balance(&mut n.synapses, 100, 10);
        assert_eq!(n.synapses[1].inhibitory_strength(), 0.05);
        assert!((n.cells[2].target_input() - 0.202).abs() < 1e-12);
        assert!((n.synapses[0].strength() - 0.202).abs() < 1e-12);
    }

    #[test]
    fn locked_inhibition_survives_weak_excitation() {
        let defs = [
            CellDefinition::new("e"),
            CellDefinition::new("i").with_type(CellType::Inhibitory),
            CellDefinition::new("b")
                .with_target_fire_rate(1.0)
                .with_locked_inhibition(true),
        ];
        let mut n = net(&defs, &[(0, 2, 0.02, 0.0), (1, 2, 0.0, 0.5)]);
        n.cells[2].fire_rate_balance(&mut n.synapses, 100, 10);
        assert_eq!(n.synapses[1].inhibitory_strength(), 0.5);
        assert!((n.synapses[0].strength() - 0.0202).abs() < 1e-12);
    }

    #[test]
    fn fire_history_is_pruned_to_the_trailing_window() {
        let defs = [
            CellDefinition::new("a"),
            CellDefinition::new("b").with_target_fire_rate(1.0),
            CellDefinition::new("c"),
        ];
        let mut n = net(&defs, &[(0, 1, 0.1, 0.0), (0, 2, 0.1, 0.0)]);
        n.cells[1].fire_history = (0..1000).collect();
        n.cells[1].fire_rate_balance(&mut n.synapses, 5000, 10);
        assert!(n.cells[1].fire_history().is_empty());

        // Window is 200 steps: only fires after step 800 survive at step 1000.
        n.cells[1].fire_history = (0..1000).collect();
        n.cells[1].fire_rate_balance(&mut n.synapses, 1000, 10);
        assert_eq!(n.cells[1].fire_history().len(), 199);
        assert_eq!(n.cells[1].fire_history().first(), Some(&801));

        // Cells without input balancing are pruned too, but keep their weights.
        n.cells[2].fire_history = vec![10, 900, 950];
        n.cells[2].fire_rate_balance(&mut n.synapses, 1000, 10);
        assert_eq!(n.cells[2].fire_history(), &[900, 950]);
        assert_eq!(n.synapses[1].strength(), 0.1);

        // Step zero touches nothing.
        n.cells[2].fire_history = vec![0];
        n.cells[2].fire_rate_balance(&mut n.synapses, 0, 10);
        assert_eq!(n.cells[2].fire_history(), &[0]);
    }

    #[test]
    fn output_balance_without_downstream_demand_keeps_weights() {
        let defs = [
            CellDefinition::new("i")
                .with_type(CellType::Inhibitory)
                .with_output_balance(true),
            CellDefinition::new("b"),
        ];
        let mut n = net(&defs, &[(0, 1, 0.0, 0.05)]);
        // b only has inhibitory inputs, so its target input is zero.
        let targets: Vec<f64> = n.cells.iter().map(Cell::target_input).collect();
        assert_eq!(targets, vec![0.0, 0.0]);
        n.cells[0].output_balance(&mut n.synapses, &targets);
        assert_eq!(n.synapses[0].inhibitory_strength(), 0.05);

        let defs = [
            CellDefinition::new("a").with_output_balance(true),
            CellDefinition::new("b"),
        ];
        let mut n = net(&defs, &[(0, 1, 0.03, 0.0)]);
        n.cells[0].output_balance(&mut n.synapses, &[0.0, 0.0]);
        assert_eq!(n.synapses[0].strength(), 0.03);
    }

    #[test]
    fn input_balance_ignores_a_negative_weight_total() {
        let params = CellTypeParameters::default();
        let syn_params = SynapseTypeParameters {
            min_strength: -1.0,
            max_strength: 1.0,
            ..Default::default()
        };
        let defs = [
            CellDefinition::new("a"),
            CellDefinition::new("b").with_target_fire_rate(1.0),
        ];
        let mut cells: Vec<Cell> = defs.iter().map(|d| Cell::new(d, &params, 1.0)).collect();
        let def = SynapseDefinition::new("a", "b", -0.1);
        let mut synapses = vec![Synapse::new(0, 1, CellType::Excitatory, &def, &syn_params)];
        cells[0].output_synapses.push(0);
        cells[1].input_synapses.push(0);

        let total = cells[1].apply_positive_input_balance(&mut synapses, 0.2);
        assert_eq!(total, -0.1);
        assert_eq!(synapses[0].strength(), -0.1);
    }

    #[test]
    fn output_balance_scales_toward_downstream_targets() {
        let defs = [
            CellDefinition::new("a").with_output_balance(true),
            CellDefinition::new("b"),
            CellDefinition::new("c"),
            CellDefinition::new("d"),
        ];
        let mut n = net(&defs, &[(0, 1, 0.01, 0.0), (0, 2, 0.03, 0.0), (3, 1, 0.03, 0.0)]);
        let targets: Vec<f64> = n.cells.iter().map(Cell::target_input).collect();
        n.cells[0].output_balance(&mut n.synapses, &targets);
        let out = n.cells[0].positive_output(&n.synapses);
        assert!((out - 0.035).abs() < 1e-12);
        assert!((n.synapses[0].strength() - 0.00875).abs() < 1e-12);
    }

    #[test]
    fn output_balance_spreads_evenly_from_zero() {
        let defs = [
            CellDefinition::new("a").with_output_balance(true),
            CellDefinition::new("b"),
            CellDefinition::new("c"),
        ];
        let mut n = net(&defs, &[(0, 1, 0.0, 0.0), (0, 2, 0.0, 0.0)]);
        let targets = [0.0, 0.04, 0.02];
        n.cells[0].output_balance(&mut n.synapses, &targets);
        assert!((n.synapses[0].strength() - 0.015).abs() < 1e-12);
        assert!((n.synapses[1].strength() - 0.015).abs() < 1e-12);
    }

    #[test]
    fn output_balance_with_no_inhibitory_output_keeps_weights_finite() {
        let defs = [
            CellDefinition::new("a")
                .with_type(CellType::Inhibitory)
                .with_output_balance(true),
            CellDefinition::new("b"),
        ];
        let mut n = net(&defs, &[(0, 1, 0.0, 0.0)]);
        n.cells[0].output_balance(&mut n.synapses, &[0.0, 0.0]);
        assert_eq!(n.synapses[0].inhibitory_strength(), 0.0);
        assert!(n.synapses[0].strength().is_finite());
    }
}
