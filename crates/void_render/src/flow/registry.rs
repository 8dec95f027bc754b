//! Flow strategy registry
//!
//! Maps each flow type to its strategy. Lookups for unknown flow types are
//! logged once per type and skipped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use parking_lot::Mutex;

use super::{ComputeFlow, FlowStrategy, FlowType, RasterFlow};
use crate::error::{RenderError, Result};

/// One strategy per flow type
#[derive(Default)]
pub struct FlowRegistry {
    strategies: HashMap<FlowType, Arc<dyn FlowStrategy>>,
    warned: Mutex<HashSet<FlowType>>,
}

impl FlowRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the raster and compute flows
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.strategies.insert(FlowType::raster(), Arc::new(RasterFlow::new()));
        registry.strategies.insert(FlowType::compute(), Arc::new(ComputeFlow::new()));
        registry
    }

    pub fn register(&mut self, strategy: Arc<dyn FlowStrategy>) -> Result<()> {
        let flow = strategy.flow_type();
        if self.strategies.contains_key(&flow) {
            return Err(RenderError::DuplicateFlow(flow));
        }
        log::debug!("Registered flow strategy {}", flow);
        self.strategies.insert(flow, strategy);
        Ok(())
    }

    /// Strategy for a flow type; warns the first time an unknown type is seen
    pub fn resolve(&self, flow: &FlowType) -> Option<Arc<dyn FlowStrategy>> {
        if let Some(strategy) = self.strategies.get(flow) {
            return Some(Arc::clone(strategy));
        }
        if self.warned.lock().insert(flow.clone()) {
            log::warn!("No flow strategy registered for {}; skipping its instances", flow);
        }
        None
    }

    pub fn get(&self, flow: &FlowType) -> Option<&Arc<dyn FlowStrategy>> {
        self.strategies.get(flow)
    }

    pub fn contains(&self, flow: &FlowType) -> bool {
        self.strategies.contains_key(flow)
    }

    /// Unknown flow types reported so far
    pub fn unknown_flows(&self) -> usize {
        self.warned.lock().len()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl std::fmt::Debug for FlowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut flows: Vec<_> = self.strategies.keys().collect();
        flows.sort();
        f.debug_struct("FlowRegistry").field("flows", &flows).finish()
    }
}
