//! # void_core - Void Engine Core
//!
//! Zero-dependency core primitives shared by the render batching crates:
//! - **Identifier**: namespaced, value-equal keys for stages, slots, uniforms
//! - **InstanceId**: ids for registered drawable instances

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std as alloc;

pub mod id;

pub use id::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::id::{Identifier, IdentifierError, InstanceId, InstanceIdGenerator};
}
