//! Spiking cell networks with dopamine-gated STDP, homeostatic weight
//! balancing and idle-interval warp.
//!
//! A [`simulation::Simulation`] is built from a [`topology::NetworkDefinition`]
//! and [`params::ModelParameters`], then driven one step at a time, usually
//! through an [`environment::Environment`].

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/params.rs"]
pub mod params;

#[path = "core/membrane.rs"]
pub mod membrane;

#[path = "core/synapse.rs"]
pub mod synapse;

#[path = "core/cell.rs"]
pub mod cell;

#[path = "core/topology.rs"]
pub mod topology;

#[path = "core/simulation.rs"]
pub mod simulation;

#[path = "core/storage.rs"]
pub mod storage;

pub mod environment;
pub mod observer;

pub mod prelude {
    pub use crate::environment::{
        run_steps, EasyEnvironment, Environment, EpochChallenge, ImageEnvironment, ResultTracker,
        ScriptedEnvironment, StdpEnvironment,
    };
    pub use crate::error::SimError;
    pub use crate::observer::{SimulationAdapter, SimulationSnapshot};
    pub use crate::params::{CellTypeParameters, ExecutionTier, ModelParameters, SynapseTypeParameters};
    pub use crate::simulation::{Simulation, Stimulus};
    pub use crate::synapse::{CellId, CellType, Step, SynapseId};
    pub use crate::topology::{
        CellDefinition, LayerConnection, LayerDefinition, Layout, ModelExport, NetworkDefinition, OutputId,
        SynapseDefinition,
    };
}
