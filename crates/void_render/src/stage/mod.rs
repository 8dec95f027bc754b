//! Render stages
//!
//! A stage owns the instances registered to it and renders them once per
//! frame. Stages declare which stages they follow; the [`StagePipeline`]
//! resolves that ordering and carries the bound render state from one stage
//! to the next so unchanged state is never re-applied.

pub mod container;
pub mod pipeline;
pub mod report;

pub use container::{BvhContainer, InstanceContainer, OrderedContainer, Registered};
pub use pipeline::{Stage, StagePipeline, VisibilityPredicate};
pub use report::{FrameReport, StageReport};
