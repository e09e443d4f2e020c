//! Network definitions: the declarative, serializable description of cells
//! and synapses that a [`Simulation`](crate::simulation::Simulation) is built
//! from and exported back into.

use serde::{Deserialize, Serialize};

use crate::params::ModelParameters;
use crate::prng::Prng;
use crate::synapse::CellType;

/// Version tag written into every network definition and model export.
pub const EXPORT_VERSION: &str = "1";

/// Identifier of an output cell, reported when it fires.
pub type OutputId = u32;

fn default_version() -> String {
    EXPORT_VERSION.to_string()
}

fn default_reward_scalar() -> f64 {
    0.1
}

fn default_s_tag_decay_rate() -> f64 {
    0.002
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellDefinition {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub layer_id: Option<String>,
    #[serde(default)]
    pub cell_type: CellType,

    #[serde(default)]
    pub x_display_position: i32,
    #[serde(default)]
    pub y_display_position: i32,
    #[serde(default)]
    pub x_layer_position: i32,
    #[serde(default)]
    pub y_layer_position: i32,

    /// External `(x, y)` position this cell listens on, if it is an input.
    #[serde(default)]
    pub input_position: Option<(i32, i32)>,
    /// Reported in the step result when this cell fires.
    #[serde(default)]
    pub output_id: Option<OutputId>,

    #[serde(default)]
    pub target_fire_rate_per_epoch: f64,
    #[serde(default)]
    pub input_balance: bool,
    #[serde(default)]
    pub output_balance: bool,
    #[serde(default)]
    pub lock_inhibition_strength: bool,
}

impl CellDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            layer_id: None,
            cell_type: CellType::Excitatory,
            x_display_position: 0,
            y_display_position: 0,
            x_layer_position: 0,
            y_layer_position: 0,
            input_position: None,
            output_id: None,
            target_fire_rate_per_epoch: 0.0,
            input_balance: false,
            output_balance: false,
            lock_inhibition_strength: false,
        }
    }

    pub fn with_type(mut self, cell_type: CellType) -> Self {
        self.cell_type = cell_type;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.x_display_position = x;
        self.y_display_position = y;
        self
    }

    pub fn input(mut self, x: i32, y: i32) -> Self {
        self.input_position = Some((x, y));
        self
    }

    pub fn output(mut self, id: OutputId) -> Self {
        self.output_id = Some(id);
        self
    }

    /// Enable input balancing toward `rate` fires per epoch.
    pub fn with_target_fire_rate(mut self, rate: f64) -> Self {
        self.target_fire_rate_per_epoch = rate;
        self.input_balance = true;
        self
    }

    pub fn with_output_balance(mut self, enabled: bool) -> Self {
        self.output_balance = enabled;
        self
    }

    pub fn with_locked_inhibition(mut self, locked: bool) -> Self {
        self.lock_inhibition_strength = locked;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynapseDefinition {
    pub label: String,
    pub pre_cell_id: String,
    pub post_cell_id: String,
    #[serde(default)]
    pub starting_strength: f64,
    #[serde(default)]
    pub starting_inhibitory_strength: f64,
    #[serde(default)]
    pub unsupervised_stdp: bool,
    #[serde(default = "default_reward_scalar")]
    pub reward_scalar: f64,
    #[serde(default = "default_s_tag_decay_rate")]
    pub s_tag_decay_rate: f64,
}

impl SynapseDefinition {
    pub fn new(pre: impl Into<String>, post: impl Into<String>, strength: f64) -> Self {
        let pre = pre.into();
        let post = post.into();
        Self {
            label: format!("{pre}_to_{post}"),
            pre_cell_id: pre,
            post_cell_id: post,
            starting_strength: strength,
            starting_inhibitory_strength: 0.0,
            unsupervised_stdp: false,
            reward_scalar: default_reward_scalar(),
            s_tag_decay_rate: default_s_tag_decay_rate(),
        }
    }

    pub fn with_inhibitory_strength(mut self, strength: f64) -> Self {
        self.starting_inhibitory_strength = strength;
        self
    }

    pub fn with_unsupervised_stdp(mut self, unsupervised: bool) -> Self {
        self.unsupervised_stdp = unsupervised;
        self
    }

    pub fn with_reward_scalar(mut self, scalar: f64) -> Self {
        self.reward_scalar = scalar;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDefinition {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub cell_definitions: Vec<CellDefinition>,
    #[serde(default)]
    pub synapse_definitions: Vec<SynapseDefinition>,
}

impl Default for NetworkDefinition {
    fn default() -> Self {
        Self {
            version: default_version(),
            cell_definitions: Vec::new(),
            synapse_definitions: Vec::new(),
        }
    }
}

impl NetworkDefinition {
    pub fn new(cells: Vec<CellDefinition>, synapses: Vec<SynapseDefinition>) -> Self {
        Self {
            version: default_version(),
            cell_definitions: cells,
            synapse_definitions: synapses,
        }
    }

    /// Excitatory `pre -> post` synapses of the given strength.
    pub fn from_cells(cells: Vec<CellDefinition>, edges: &[(&str, &str, f64)]) -> Self {
        let synapses = edges
            .iter()
            .map(|&(pre, post, w)| SynapseDefinition::new(pre, post, w))
            .collect();
        Self::new(cells, synapses)
    }

    /// Grid layers wired by probability.
    pub fn from_layers(layers: &[LayerDefinition], connections: &[LayerConnection], seed: u64) -> Self {
        let mut rng = Prng::new(seed);
        let mut cells = Vec::new();
        let mut ranges: Vec<(String, CellType, core::ops::Range<usize>)> = Vec::new();
        let mut starting_x = 0;

        for layer in layers {
            let start = cells.len();
            let width = layer.width();
            for n in 0..layer.cell_count {
                let (lx, ly) = layer.position(n, width);
                let mut cell = CellDefinition::new(format!("{}_{}", layer.id, n))
                    .with_type(layer.cell_type)
                    .at(starting_x + lx, ly);
                cell.layer_id = Some(layer.id.clone());
                cell.x_layer_position = lx;
                cell.y_layer_position = ly;
                if layer.input {
                    cell.input_position = Some((lx, ly));
                }
                if layer.output {
                    cell.output_id = OutputId::try_from(n).ok();
                }
                if let Some(rate) = layer.target_fire_rate_per_epoch {
                    cell = cell.with_target_fire_rate(rate);
                }
                cell.output_balance = layer.output_balance;
                cell.lock_inhibition_strength = layer.lock_inhibition_strength;
                cells.push(cell);
            }
            ranges.push((layer.id.clone(), layer.cell_type, start..cells.len()));
            starting_x += width as i32 + 2;
        }

        let mut synapses = Vec::new();
        for conn in connections {
            let Some((_, pre_type, pre_range)) = ranges.iter().find(|(id, _, _)| *id == conn.pre_layer) else {
                continue;
            };
            let Some((_, _, post_range)) = ranges.iter().find(|(id, _, _)| *id == conn.post_layer) else {
                continue;
            };
            for pre in pre_range.clone() {
                for post in post_range.clone() {
                    if pre == post || !rng.chance(conn.probability) {
                        continue;
                    }
                    let (excit, inhib) = match pre_type {
                        CellType::Excitatory => (conn.strength, 0.0),
                        CellType::Inhibitory => (0.0, conn.strength),
                        CellType::Mixed => (conn.strength, conn.strength),
                    };
                    synapses.push(
                        SynapseDefinition::new(cells[pre].id.clone(), cells[post].id.clone(), excit)
                            .with_inhibitory_strength(inhib)
                            .with_unsupervised_stdp(conn.unsupervised_stdp),
                    );
                }
            }
        }

        Self::new(cells, synapses)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    Square,
    Line,
}

/// A uniform block of cells for [`NetworkDefinition::from_layers`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDefinition {
    pub id: String,
    pub cell_count: usize,
    pub cell_type: CellType,
    pub layout: Layout,
    /// Cells listen on their in-layer position.
    pub input: bool,
    /// Cells report their index as output id.
    pub output: bool,
    pub target_fire_rate_per_epoch: Option<f64>,
    pub output_balance: bool,
    pub lock_inhibition_strength: bool,
}

impl LayerDefinition {
    pub fn new(id: impl Into<String>, cell_count: usize, cell_type: CellType) -> Self {
        Self {
            id: id.into(),
            cell_count,
            cell_type,
            layout: Layout::Square,
            input: false,
            output: false,
            target_fire_rate_per_epoch: None,
            output_balance: false,
            lock_inhibition_strength: false,
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn as_input(mut self) -> Self {
        self.input = true;
        self
    }

    pub fn as_output(mut self) -> Self {
        self.output = true;
        self
    }

    pub fn with_target_fire_rate(mut self, rate: f64) -> Self {
        self.target_fire_rate_per_epoch = Some(rate);
        self
    }

    pub fn with_output_balance(mut self, enabled: bool) -> Self {
        self.output_balance = enabled;
        self
    }

    fn width(&self) -> usize {
        match self.layout {
            Layout::Line => 1,
            Layout::Square => {
                let mut edge = 1;
                while edge * edge < self.cell_count {
                    edge += 1;
                }
                edge
            }
        }
    }

    fn position(&self, n: usize, width: usize) -> (i32, i32) {
        match self.layout {
            Layout::Line => (0, n as i32),
            Layout::Square => ((n % width) as i32, (n / width) as i32),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConnection {
    pub pre_layer: String,
    pub post_layer: String,
    pub probability: f64,
    pub strength: f64,
    #[serde(default)]
    pub unsupervised_stdp: bool,
}

impl LayerConnection {
    pub fn new(pre: impl Into<String>, post: impl Into<String>, probability: f64, strength: f64) -> Self {
        Self {
            pre_layer: pre.into(),
            post_layer: post.into(),
            probability,
            strength,
            unsupervised_stdp: false,
        }
    }

    pub fn unsupervised(mut self) -> Self {
        self.unsupervised_stdp = true;
        self
    }
}

/// Self-contained, versioned model blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelExport {
    pub version: String,
    pub model_parameters: ModelParameters,
    pub network_definition: NetworkDefinition,
}

impl ModelExport {
    pub fn to_json_pretty(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
