use thiserror::Error;

/// Errors raised while building, importing or exporting a simulation.
///
/// Numeric edge cases during stepping are never errors; they resolve to
/// neutral values inside the homeostasis passes.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("synapse {synapse:?} references unknown cell {cell_id:?}")]
    UnknownCell { synapse: String, cell_id: String },

    #[error("duplicate cell id {0:?}")]
    DuplicateCell(String),

    #[error("cell {cell:?} has input balancing enabled but a target fire rate of zero")]
    ZeroTargetFireRate { cell: String },

    #[error("invalid parameters: {0}")]
    InvalidParameters(&'static str),

    #[error("unsupported export version {0:?}")]
    UnsupportedVersion(String),

    #[error("invalid image data: {0}")]
    InvalidImage(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, SimError>;
