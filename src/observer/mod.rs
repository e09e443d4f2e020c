use serde::Serialize;

use crate::cell::WeightTotals;
use crate::simulation::Simulation;
use crate::synapse::{CellId, Step};

/// A read-only snapshot of what the simulation is doing.
///
/// Design intent:
/// - Observers cannot mutate or steer the simulation.
/// - Snapshotting is *on-demand* and can allocate; the step loop stays unchanged.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSnapshot {
    pub step: Option<Step>,
    pub dopamine: f64,
    pub warping: bool,
    pub cells: Vec<CellView>,
    pub synapses: Vec<SynapseView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellView {
    pub label: String,
    pub layer_id: Option<String>,
    pub x: i32,
    pub y: i32,
    pub voltage: f64,
    /// Fired within the last few steps.
    pub spike: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynapseView {
    pub label: String,
    pub pre: String,
    pub post: String,
    pub strength: f64,
    pub inhibitory_strength: f64,
}

pub struct SimulationAdapter<'a> {
    sim: &'a Simulation,
}

impl<'a> SimulationAdapter<'a> {
    pub fn new(sim: &'a Simulation) -> Self {
        Self { sim }
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            step: self.sim.current_step(),
            dopamine: self.sim.dopamine(),
            warping: self.sim.warping(),
            cells: self.cell_views(),
            synapses: self.synapse_views(),
        }
    }

    pub fn cell_views(&self) -> Vec<CellView> {
        self.sim
            .cells()
            .iter()
            .map(|c| {
                let (x, y) = c.display_position();
                CellView {
                    label: c.label().to_string(),
                    layer_id: c.layer_id().map(str::to_string),
                    x,
                    y,
                    voltage: c.membrane().voltage(),
                    spike: c.fire_trace() > 0,
                }
            })
            .collect()
    }

    pub fn synapse_views(&self) -> Vec<SynapseView> {
        let cells = self.sim.cells();
        self.sim
            .synapses()
            .iter()
            .map(|s| SynapseView {
                label: s.label().to_string(),
                pre: cells[s.pre()].label().to_string(),
                post: cells[s.post()].label().to_string(),
                strength: s.strength(),
                inhibitory_strength: s.inhibitory_strength(),
            })
            .collect()
    }

    pub fn weight_totals(&self, id: CellId) -> WeightTotals {
        self.sim.cell(id).weight_totals(self.sim.synapses())
    }

    /// One line per layer (or unlayered cell) for the first cell with
    /// input balancing: running rate, target rate, fires, target input.
    pub fn text_lines(&self) -> Vec<String> {
        let step = self.sim.current_step().unwrap_or(0);
        let epoch_length = self.sim.params().epoch_length;
        let mut seen_layers: Vec<&str> = Vec::new();
        let mut lines = Vec::new();

        for cell in self.sim.cells().iter().filter(|c| c.input_balance()) {
            if let Some(layer) = cell.layer_id() {
                if seen_layers.contains(&layer) {
                    continue;
                }
                seen_layers.push(layer);
            }
            let per_epoch = cell.running_fire_rate(step, epoch_length) * epoch_length as f64;
            lines.push(format!(
                "{} layer_id {} running_rate {:.3} target_rate {} fires {} target_input {:.5}",
                cell.label(),
                cell.layer_id().unwrap_or("-"),
                per_epoch,
                cell.target_fire_rate_per_epoch(),
                cell.fire_history().len(),
                cell.target_input()
            ));
        }
        lines
    }
}
