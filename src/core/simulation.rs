use std::io::{self, Read, Write};

use hashbrown::HashMap;
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::cell::{apply_fire, Cell};
use crate::error::{Result, SimError};
use crate::params::{ExecutionTier, ModelParameters};
use crate::prng::Prng;
use crate::storage;
use crate::synapse::{CellId, Step, Synapse, SynapseId};
use crate::topology::{
    CellDefinition, ModelExport, NetworkDefinition, OutputId, SynapseDefinition, EXPORT_VERSION,
};

const DEFAULT_SEED: u64 = 0x5EED_CE11;

/// External current injected at an input position for one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stimulus {
    pub x: i32,
    pub y: i32,
    pub current: f64,
}

impl Stimulus {
    pub fn new(x: i32, y: i32, current: f64) -> Self {
        Self { x, y, current }
    }
}

/// A network of cells and synapses plus the global reward state.
///
/// Cells and synapses live in flat arenas and refer to each other by index.
/// One call to [`step`](Self::step) advances everything by one tick.
#[derive(Debug, Clone)]
pub struct Simulation {
    params: ModelParameters,
    cell_definitions: Vec<CellDefinition>,
    cells: Vec<Cell>,
    synapses: Vec<Synapse>,
    cell_index: HashMap<String, CellId>,
    cells_by_input_position: HashMap<(i32, i32), Vec<CellId>>,
    dopamine: f64,
    rng: Prng,

    warping: bool,
    idle_steps: u32,
    last_integrated: Option<Step>,
    current_step: Option<Step>,
}

impl Simulation {
    pub fn new(params: ModelParameters, network: NetworkDefinition) -> Result<Self> {
        params.validate().map_err(SimError::InvalidParameters)?;

        let NetworkDefinition {
            cell_definitions,
            synapse_definitions,
            ..
        } = network;

        let mut cell_index = HashMap::with_capacity(cell_definitions.len());
        let mut cells = Vec::with_capacity(cell_definitions.len());
        let mut cells_by_input_position: HashMap<(i32, i32), Vec<CellId>> = HashMap::new();

        for (id, def) in cell_definitions.iter().enumerate() {
            if cell_index.insert(def.id.clone(), id).is_some() {
                return Err(SimError::DuplicateCell(def.id.clone()));
            }
            if def.input_balance && def.target_fire_rate_per_epoch <= 0.0 {
                return Err(SimError::ZeroTargetFireRate {
                    cell: def.id.clone(),
                });
            }
            if let Some(pos) = def.input_position {
                cells_by_input_position.entry(pos).or_default().push(id);
            }
            cells.push(Cell::new(def, &params.cell_type_parameters, params.step_size));
        }

        let mut synapses = Vec::with_capacity(synapse_definitions.len());
        for def in &synapse_definitions {
            let lookup = |cell_id: &String| {
                cell_index
                    .get(cell_id)
                    .copied()
                    .ok_or_else(|| SimError::UnknownCell {
                        synapse: def.label.clone(),
                        cell_id: cell_id.clone(),
                    })
            };
            let pre = lookup(&def.pre_cell_id)?;
            let post = lookup(&def.post_cell_id)?;

            let sid: SynapseId = synapses.len();
            synapses.push(Synapse::new(
                pre,
                post,
                cells[pre].cell_type(),
                def,
                &params.synapse_type_parameters,
            ));
            cells[pre].output_synapses.push(sid);
            cells[post].input_synapses.push(sid);
        }

        for cell in &mut cells {
            cell.init_target_input(&synapses);
        }

        info!(
            "Simulation built: {} cells, {} synapses, tier {:?}",
            cells.len(),
            synapses.len(),
            params.execution_tier.effective()
        );

        Ok(Self {
            dopamine: params.starting_dopamine,
            rng: Prng::new(params.seed.unwrap_or(DEFAULT_SEED)),
            params,
            cell_definitions,
            cells,
            synapses,
            cell_index,
            cells_by_input_position,
            warping: false,
            idle_steps: 0,
            last_integrated: None,
            current_step: None,
        })
    }

    /// Rebuild from an export. Only version `"1"` is understood.
    pub fn from_export(export: ModelExport) -> Result<Self> {
        if export.version != EXPORT_VERSION {
            return Err(SimError::UnsupportedVersion(export.version));
        }
        Self::new(export.model_parameters, export.network_definition)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_export(ModelExport::from_json(text)?)
    }

    /// Current weights as a self-contained blob. Runtime state (voltages,
    /// traces, fire history, dopamine) is not included.
    pub fn export(&self) -> ModelExport {
        let synapse_definitions = self
            .synapses
            .iter()
            .map(|s| SynapseDefinition {
                label: s.label().to_string(),
                pre_cell_id: self.cells[s.pre()].id().to_string(),
                post_cell_id: self.cells[s.post()].id().to_string(),
                starting_strength: s.strength(),
                starting_inhibitory_strength: s.inhibitory_strength(),
                unsupervised_stdp: s.unsupervised(),
                reward_scalar: s.reward_scalar(),
                s_tag_decay_rate: s.s_tag_decay_rate(),
            })
            .collect();

        ModelExport {
            version: EXPORT_VERSION.to_string(),
            model_parameters: self.params.clone(),
            network_definition: NetworkDefinition::new(self.cell_definitions.clone(), synapse_definitions),
        }
    }

    pub fn export_json(&self) -> Result<String> {
        self.export().to_json_pretty()
    }

    pub fn params(&self) -> &ModelParameters {
        &self.params
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn synapses(&self) -> &[Synapse] {
        &self.synapses
    }

    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id]
    }

    pub fn synapse(&self, id: SynapseId) -> &Synapse {
        &self.synapses[id]
    }

    pub fn cell_id(&self, name: &str) -> Option<CellId> {
        self.cell_index.get(name).copied()
    }

    /// First synapse from `pre` to `post`, by cell id string.
    pub fn synapse_between(&self, pre: &str, post: &str) -> Option<&Synapse> {
        let pre = self.cell_id(pre)?;
        let post = self.cell_id(post)?;
        self.cells[pre]
            .output_synapses()
            .iter()
            .map(|&s| &self.synapses[s])
            .find(|s| s.post() == post)
    }

    pub fn dopamine(&self) -> f64 {
        self.dopamine
    }

    pub fn warping(&self) -> bool {
        self.warping
    }

    /// Last step passed to [`step`](Self::step), integrated or not.
    pub fn current_step(&self) -> Option<Step> {
        self.current_step
    }

    pub fn is_epoch_boundary(&self, step: Step) -> bool {
        let offset = i128::from(step) - i128::from(self.params.epoch_delay);
        offset.rem_euclid(i128::from(self.params.epoch_length)) == 0
    }

    /// Advance one tick. Returns the output ids of output cells that fired.
    ///
    /// Steps are expected to be consecutive. `has_reward` sets dopamine to
    /// 1 for this step; `active_environment` keeps the simulation out of warp.
    pub fn step(
        &mut self,
        step: Step,
        stimuli: &[Stimulus],
        has_reward: bool,
        active_environment: bool,
    ) -> Vec<OutputId> {
        self.current_step = Some(step);
        self.update_dopamine(has_reward);

        if self.is_epoch_boundary(step) {
            self.epoch_updates(step);
        }

        if self.params.warp_allowed {
            if self.warping {
                if !active_environment && self.dopamine <= self.params.dopamine_epsilon {
                    return Vec::new();
                }
                self.exit_warp(step);
            } else if self.enter_warp_if_idle(step, active_environment) {
                return Vec::new();
            }
        }

        self.update_synapses(step);
        self.apply_stimuli(stimuli);

        match self.params.execution_tier.effective() {
            ExecutionTier::Scalar => self.update_membranes_scalar(),
            ExecutionTier::Parallel => self.update_membranes_parallel(),
        }

        let outputs = self.collect_fires(step);
        self.last_integrated = Some(step);
        outputs
    }

    fn update_dopamine(&mut self, has_reward: bool) {
        self.dopamine *= (1.0 - self.params.dopamine_decay).powf(self.params.step_size);
        if has_reward {
            self.dopamine = 1.0;
        }
    }

    /// Reset every trace, rebalance outputs then inputs, drop pending updates.
    fn epoch_updates(&mut self, step: Step) {
        for s in &mut self.synapses {
            s.reset_s_tag();
        }

        let target_inputs: Vec<f64> = self.cells.iter().map(Cell::target_input).collect();
        for cell in &self.cells {
            cell.output_balance(&mut self.synapses, &target_inputs);
        }

        let epoch_length = self.params.epoch_length;
        for cell in &mut self.cells {
            cell.fire_rate_balance(&mut self.synapses, step, epoch_length);
        }

        for cell in &mut self.cells {
            cell.pending_updates.clear();
        }
        debug!("Epoch boundary at step {}", step);
    }

    fn enter_warp_if_idle(&mut self, step: Step, active_environment: bool) -> bool {
        let busy = active_environment
            || self.dopamine > self.params.dopamine_epsilon
            || self
                .cells
                .iter()
                .any(|c| c.membrane.active() || !c.pending_updates.is_empty());

        if busy {
            self.idle_steps = 0;
            return false;
        }

        self.idle_steps += 1;
        if self.idle_steps < self.params.warp_idle_steps {
            return false;
        }
        self.idle_steps = 0;
        self.warping = true;
        debug!("Entering warp at step {}", step);
        true
    }

    fn exit_warp(&mut self, step: Step) {
        let skipped = self
            .last_integrated
            .map_or(0, |last| step.saturating_sub(last + 1));
        for cell in &mut self.cells {
            cell.membrane.warp(skipped);
            cell.fade_trace(skipped);
        }
        self.warping = false;
        debug!("Leaving warp at step {} after {} skipped steps", step, skipped);
    }

    fn update_synapses(&mut self, step: Step) {
        let dopamine = self.dopamine;
        let Self { cells, synapses, .. } = self;
        for cell in cells.iter() {
            for &sid in &cell.pending_updates {
                synapses[sid].update(step, dopamine);
            }
        }
    }

    fn apply_stimuli(&mut self, stimuli: &[Stimulus]) {
        for s in stimuli {
            if let Some(ids) = self.cells_by_input_position.get(&(s.x, s.y)) {
                for &id in ids {
                    self.cells[id].membrane.receive_input(s.current);
                }
            }
        }
    }

    fn update_membranes_scalar(&mut self) {
        for cell in &mut self.cells {
            cell.membrane.update();
        }
    }

    #[cfg(feature = "parallel")]
    fn update_membranes_parallel(&mut self) {
        // Membranes are independent within a step.
        self.cells.par_iter_mut().for_each(|cell| {
            cell.membrane.update();
        });
    }

    #[cfg(not(feature = "parallel"))]
    fn update_membranes_parallel(&mut self) {
        self.update_membranes_scalar();
    }

    fn collect_fires(&mut self, step: Step) -> Vec<OutputId> {
        let mut outputs = Vec::new();
        for id in 0..self.cells.len() {
            if self.cells[id].membrane.fired() {
                self.cells[id].mark_fired();
                if let Some(out) = apply_fire(&mut self.cells, &mut self.synapses, id, step, &mut self.rng) {
                    outputs.push(out);
                }
            } else {
                self.cells[id].fade_trace(1);
            }
        }
        outputs
    }

    /// Serialize a versioned, chunked image of the current export.
    pub fn save_image_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let json = serde_json::to_vec(&self.export())?;
        w.write_all(storage::MAGIC)?;
        storage::write_u32_le(w, storage::VERSION_CURRENT)?;
        storage::write_chunk_lz4(w, storage::EXPORT_TAG, &json)?;
        Ok(())
    }

    /// Load an image written by [`save_image_to`](Self::save_image_to).
    ///
    /// Unknown chunks are skipped for forward-compatibility.
    pub fn load_image_from<R: Read>(r: &mut R) -> Result<Self> {
        let magic = storage::read_exact::<8, _>(r)?;
        if &magic != storage::MAGIC {
            return Err(SimError::InvalidImage("bad magic".to_string()));
        }
        let version = storage::read_u32_le(r)?;
        if version != storage::VERSION_V1 {
            return Err(SimError::InvalidImage(format!("unsupported image version {version}")));
        }

        loop {
            let (tag, len) = match storage::read_chunk_header(r) {
                Ok(header) => header,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            if tag == storage::EXPORT_TAG {
                let json = storage::read_chunk_lz4_body(r, len)?;
                let export: ModelExport = serde_json::from_slice(&json)?;
                return Self::from_export(export);
            }
            storage::skip_chunk(r, len)?;
        }

        Err(SimError::InvalidImage("missing EXPT chunk".to_string()))
    }

    /// Exact serialized size in bytes of the current image.
    pub fn image_size_bytes(&self) -> Result<usize> {
        let mut cw = storage::CountingWriter::new();
        self.save_image_to(&mut cw)?;
        Ok(cw.written())
    }
}
