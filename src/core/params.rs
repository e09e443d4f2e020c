use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Execution tier for membrane integration.
///
/// - `Scalar`: single-threaded (default, works everywhere)
/// - `Parallel`: membranes integrated on the rayon pool (requires `parallel` feature)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionTier {
    #[default]
    Scalar,
    Parallel,
}

impl ExecutionTier {
    /// The tier that will actually run, given compile-time features.
    pub fn effective(self) -> ExecutionTier {
        match self {
            ExecutionTier::Scalar => ExecutionTier::Scalar,
            ExecutionTier::Parallel => {
                #[cfg(feature = "parallel")]
                {
                    ExecutionTier::Parallel
                }
                #[cfg(not(feature = "parallel"))]
                {
                    ExecutionTier::Scalar
                }
            }
        }
    }
}

/// Membrane parameters shared by every cell of a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellTypeParameters {
    pub voltage_decay: f64,
    pub current_decay: f64,
    pub calcium_decay: f64,
    pub starting_membrane_voltage: f64,
    pub max_voltage: f64,
    pub voltage_reset: f64,
    pub calcium_increment: f64,
    pub input_current_reset: f64,
    pub starting_calcium: f64,
    pub starting_input_current: f64,
    pub reset_input_current: bool,
}

impl Default for CellTypeParameters {
    fn default() -> Self {
        Self {
            voltage_decay: 0.01,
            current_decay: 0.03,
            calcium_decay: 0.1,
            starting_membrane_voltage: 0.0,
            max_voltage: 1.0,
            voltage_reset: -1.0,
            calcium_increment: 1.0,
            input_current_reset: 0.0,
            starting_calcium: 0.0,
            starting_input_current: 0.0,
            reset_input_current: true,
        }
    }
}

impl CellTypeParameters {
    pub fn validate(&self) -> core::result::Result<(), &'static str> {
        for d in [self.voltage_decay, self.current_decay, self.calcium_decay] {
            if !d.is_finite() || !(0.0..=1.0).contains(&d) {
                return Err("membrane decay rates must be in [0, 1]");
            }
        }
        if !self.max_voltage.is_finite() || !self.voltage_reset.is_finite() {
            return Err("max_voltage and voltage_reset must be finite");
        }
        if self.voltage_reset >= self.max_voltage {
            return Err("voltage_reset must be below max_voltage");
        }
        if !self.calcium_increment.is_finite() || self.calcium_increment < 0.0 {
            return Err("calcium_increment must be finite and >= 0");
        }
        Ok(())
    }
}

/// Synapse parameters shared by every synapse of a model.
///
/// Per-synapse learning knobs (`reward_scalar`, `s_tag_decay_rate`,
/// `unsupervised_stdp`) live on the synapse definition instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynapseTypeParameters {
    pub stdp_scalar: f64,
    pub max_strength: f64,
    pub min_strength: f64,
    pub starting_s_tag: f64,
    /// Relative transmission noise; 0 disables it.
    pub noise_factor: f64,
}

impl Default for SynapseTypeParameters {
    fn default() -> Self {
        Self {
            stdp_scalar: 0.01,
            max_strength: 0.06,
            min_strength: 0.0,
            starting_s_tag: 0.0,
            noise_factor: 0.0,
        }
    }
}

impl SynapseTypeParameters {
    pub fn validate(&self) -> core::result::Result<(), &'static str> {
        if !self.min_strength.is_finite() || !self.max_strength.is_finite() {
            return Err("strength bounds must be finite");
        }
        if self.min_strength > self.max_strength {
            return Err("min_strength must be <= max_strength");
        }
        if !self.noise_factor.is_finite() || self.noise_factor < 0.0 {
            return Err("noise_factor must be finite and >= 0");
        }
        if !self.stdp_scalar.is_finite() {
            return Err("stdp_scalar must be finite");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParameters {
    pub step_size: f64,
    pub starting_dopamine: f64,
    /// Per-step exponential dopamine decay rate in [0,1].
    pub dopamine_decay: f64,
    pub cell_type_parameters: CellTypeParameters,
    pub synapse_type_parameters: SynapseTypeParameters,
    pub epoch_length: u64,
    pub epoch_delay: u64,

    // ---------------------------------------------------------------------
    // Idle-interval warp
    // ---------------------------------------------------------------------
    /// Allow skipping quiescent steps. Off by default.
    pub warp_allowed: bool,
    /// Consecutive idle steps required before warping.
    pub warp_idle_steps: u32,
    /// Dopamine at or below this level counts as "no reward in flight".
    pub dopamine_epsilon: f64,

    /// Seed for transmission noise. `None` uses a fixed default seed.
    pub seed: Option<u64>,
    pub execution_tier: ExecutionTier,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            step_size: 1.0,
            starting_dopamine: 1.0,
            dopamine_decay: 0.0,
            cell_type_parameters: CellTypeParameters::default(),
            synapse_type_parameters: SynapseTypeParameters::default(),
            epoch_length: 400,
            epoch_delay: 50,
            warp_allowed: false,
            warp_idle_steps: 10,
            dopamine_epsilon: 1e-4,
            seed: None,
            execution_tier: ExecutionTier::Scalar,
        }
    }
}

impl ModelParameters {
    /// Unsupervised STDP setup: full dopamine that never decays, so every
    /// eligibility trace turns into a weight change.
    pub fn stdp() -> Self {
        Self {
            synapse_type_parameters: SynapseTypeParameters {
                stdp_scalar: 0.001,
                max_strength: 0.4,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Reward-driven setup: dopamine starts at zero and only a reward pulse
    /// lets traces through.
    pub fn handwriting(epoch_length: u64, epoch_delay: u64) -> Self {
        Self {
            starting_dopamine: 0.0,
            dopamine_decay: 0.1,
            synapse_type_parameters: SynapseTypeParameters {
                noise_factor: 0.5,
                ..Default::default()
            },
            epoch_length,
            epoch_delay,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_warp(mut self, allowed: bool) -> Self {
        self.warp_allowed = allowed;
        self
    }

    pub fn validate(&self) -> core::result::Result<(), &'static str> {
        if !self.step_size.is_finite() || self.step_size <= 0.0 {
            return Err("step_size must be finite and > 0");
        }
        if !self.dopamine_decay.is_finite() || !(0.0..=1.0).contains(&self.dopamine_decay) {
            return Err("dopamine_decay must be in [0, 1]");
        }
        if !self.starting_dopamine.is_finite() {
            return Err("starting_dopamine must be finite");
        }
        if self.epoch_length == 0 {
            return Err("epoch_length must be >= 1");
        }
        if self.warp_idle_steps == 0 {
            return Err("warp_idle_steps must be >= 1");
        }
        if !self.dopamine_epsilon.is_finite() || self.dopamine_epsilon < 0.0 {
            return Err("dopamine_epsilon must be finite and >= 0");
        }
        self.cell_type_parameters.validate()?;
        self.synapse_type_parameters.validate()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let params: ModelParameters = serde_json::from_str(text)?;
        params.validate().map_err(SimError::InvalidParameters)?;
        Ok(params)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
