//! GPU state model
//!
//! - [`table`]: the sealed set of state slots
//! - [`value`]: per-slot component values
//! - [`setting`]: complete value-equal configurations and interning
//! - [`differ`]: minimal transitions between settings

pub mod differ;
pub mod setting;
pub mod table;
pub mod value;

pub use differ::{diff, DifferStats, StateDiff, StateDiffer};
pub use setting::{RenderSetting, RenderTargetBinding, SettingInterner, ShaderBinding};
pub use table::{SlotEntry, StandardSlot, StateComponentTable, StateTableBuilder};
pub use value::*;
