//! Uniform delta tracking
//!
//! Hooks read per-instance uniform values; a hook group remembers the last
//! value pushed per hook and captures only what changed into a
//! [`UniformValueSnapshot`]. Instances with equal snapshots share one upload.

pub mod hook;
pub mod registry;
pub mod snapshot;
pub mod value;

pub use hook::{BaselinePolicy, UniformGetter, UniformHook, UniformHookGroup};
pub use registry::{HookTarget, UniformHookRegistry};
pub use snapshot::{UniformChange, UniformValueSnapshot};
pub use value::UniformValue;
