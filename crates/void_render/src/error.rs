//! Error types for the batching engine
//!
//! Configuration errors (state table, flow registry, stage ordering) are
//! returned to the caller and are expected to abort startup. Errors raised by
//! a single instance are wrapped in [`InstanceError`] and never escalate past
//! the instance that produced them.

use thiserror::Error;
use void_core::{Identifier, IdentifierError, InstanceId};

use crate::flow::FlowType;
use crate::state::StateKind;

/// Render batching errors
#[derive(Debug, Error)]
pub enum RenderError {
    /// A setting or diff referenced a slot the table does not know
    #[error("State slot not registered: {0}")]
    UnregisteredSlot(Identifier),

    /// A slot id was registered twice
    #[error("State slot already registered: {0}")]
    DuplicateSlot(Identifier),

    /// Override value does not match the registered component kind
    #[error("State slot {slot} holds {expected:?} values, got {found:?}")]
    SlotKindMismatch {
        slot: Identifier,
        expected: StateKind,
        found: StateKind,
    },

    /// Two settings built from different state tables were compared
    #[error("Render settings were built against different state tables")]
    TableMismatch,

    /// A flow type already has a strategy
    #[error("Flow strategy already registered for {0}")]
    DuplicateFlow(FlowType),

    /// A uniform name was registered twice for the same target
    #[error("Uniform hook {name} already registered for {target}")]
    DuplicateUniform { target: String, name: String },

    /// A stage id was registered twice
    #[error("Stage already registered: {0}")]
    DuplicateStage(Identifier),

    /// Stage ordering references a stage that does not exist
    #[error("Stage {stage} is ordered after unknown stage {dependency}")]
    UnknownStageDependency {
        stage: Identifier,
        dependency: Identifier,
    },

    /// Stage ordering cannot be satisfied
    #[error("Stage ordering contains a cycle through {0}")]
    StageCycle(Identifier),

    /// Transient buffer could not hold this frame's data
    #[error("Transient {buffer} buffer overflow: requested {requested} bytes, {available} available")]
    TransientOverflow {
        buffer: &'static str,
        requested: usize,
        available: usize,
    },

    /// Vertex data does not fit the declared layout
    #[error("Invalid vertex data: {0}")]
    InvalidGeometry(String),

    /// Invalid engine configuration
    #[error("Invalid render configuration: {0}")]
    InvalidConfig(String),

    /// Failure raised by a single instance
    #[error("Instance {id} failed: {source}")]
    Instance {
        id: InstanceId,
        #[source]
        source: InstanceError,
    },

    /// Identifier parse failure
    #[error("Identifier error: {0}")]
    Identifier(#[from] IdentifierError),

    /// Configuration (de)serialization failure
    #[error("Configuration format error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for render batching operations
pub type Result<T> = std::result::Result<T, RenderError>;

/// Failure reported by instance code (tick, mesh or dispatch preparation)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct InstanceError(pub String);

impl From<&str> for InstanceError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for InstanceError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl RenderError {
    /// Whether this error is local to one instance
    pub fn is_instance_local(&self) -> bool {
        matches!(self, RenderError::Instance { .. })
    }
}

/// Message of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
