//! Uniform hook registry
//!
//! Hooks are registered against a target (every program, every program in a
//! namespace, or one program). Lookups per program are served from a keyed
//! cache that is dropped whenever a registration changes the hook set; the
//! generation counter lets holders of built [`UniformHookGroup`]s notice.
//!
//! Lookups hold the entry read lock while they fill the cache, and
//! registrations bump the generation and clear the cache under the write
//! lock, so a cached hook list always matches the generation it was read at.

use core::fmt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use void_core::Identifier;

use super::hook::{UniformHook, UniformHookGroup};
use crate::error::{RenderError, Result};

/// Which programs a hook applies to
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HookTarget {
    /// Every program
    All,
    /// Programs in a namespace
    Namespace(String),
    /// One program
    Program(Identifier),
}

impl HookTarget {
    pub fn matches(&self, program: &Identifier) -> bool {
        match self {
            HookTarget::All => true,
            HookTarget::Namespace(ns) => program.namespace() == ns,
            HookTarget::Program(id) => id == program,
        }
    }
}

impl fmt::Display for HookTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookTarget::All => write!(f, "*"),
            HookTarget::Namespace(ns) => write!(f, "{}:*", ns),
            HookTarget::Program(id) => write!(f, "{}", id),
        }
    }
}

/// Registered uniform hooks
#[derive(Debug, Default)]
pub struct UniformHookRegistry {
    entries: RwLock<Vec<(HookTarget, UniformHook)>>,
    cache: Mutex<HashMap<Identifier, Arc<[UniformHook]>>>,
    generation: AtomicU64,
}

impl UniformHookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook. A target may hold each uniform name once.
    pub fn register(&self, target: HookTarget, hook: UniformHook) -> Result<()> {
        {
            let mut entries = self.entries.write();
            if entries
                .iter()
                .any(|(t, h)| *t == target && h.name() == hook.name())
            {
                return Err(RenderError::DuplicateUniform {
                    target: target.to_string(),
                    name: hook.name().to_string(),
                });
            }
            log::debug!("Registered uniform hook '{}' for {}", hook.name(), target);
            entries.push((target, hook));
            self.generation.fetch_add(1, Ordering::AcqRel);
            self.invalidate();
        }
        Ok(())
    }

    /// Drop every cached lookup
    pub fn invalidate(&self) {
        self.cache.lock().clear();
    }

    /// Hooks applying to a program, in registration order
    pub fn hooks_for(&self, program: &Identifier) -> Arc<[UniformHook]> {
        self.lookup(program).0
    }

    /// A new hook group for a program, with empty caches
    pub fn group_for(&self, program: &Identifier) -> UniformHookGroup {
        let (hooks, generation) = self.lookup(program);
        let hooks = hooks.iter().map(UniformHook::fresh).collect();
        UniformHookGroup::new(program.clone(), hooks, generation)
    }

    /// Hooks of a program and the generation they belong to
    fn lookup(&self, program: &Identifier) -> (Arc<[UniformHook]>, u64) {
        let entries = self.entries.read();
        let generation = self.generation();
        let mut cache = self.cache.lock();
        if let Some(hooks) = cache.get(program) {
            return (Arc::clone(hooks), generation);
        }

        let hooks: Arc<[UniformHook]> = entries
            .iter()
            .filter(|(target, _)| target.matches(program))
            .map(|(_, hook)| hook.fresh())
            .collect();
        cache.insert(program.clone(), Arc::clone(&hooks));
        (hooks, generation)
    }

    /// Bumped on every registration
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Number of cached program lookups
    pub fn cached_programs(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;
    use crate::runtime::FrameContext;
    use crate::uniform::UniformValue;

    fn hook(name: &str) -> UniformHook {
        UniformHook::new(name, 0, |_: &dyn Instance, _: &FrameContext| {
            Some(UniformValue::Float(1.0))
        })
    }

    #[test]
    fn test_target_matching() {
        let registry = UniformHookRegistry::new();
        registry.register(HookTarget::All, hook("time")).unwrap();
        registry
            .register(HookTarget::Namespace("mymod".into()), hook("glow"))
            .unwrap();
        registry
            .register(
                HookTarget::Program(Identifier::parse("mymod:shader/water").unwrap()),
                hook("wave"),
            )
            .unwrap();

        let water = registry.hooks_for(&Identifier::parse("mymod:shader/water").unwrap());
        assert_eq!(water.len(), 3);

        let other = registry.hooks_for(&Identifier::parse("void:shader/solid").unwrap());
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].name(), "time");
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = UniformHookRegistry::new();
        registry.register(HookTarget::All, hook("time")).unwrap();
        let err = registry.register(HookTarget::All, hook("time")).unwrap_err();
        assert!(matches!(err, RenderError::DuplicateUniform { .. }));
        assert_eq!(registry.generation(), 1);
    }

    #[test]
    fn test_registration_invalidates_cache() {
        let registry = UniformHookRegistry::new();
        let program = Identifier::parse("void:shader/solid").unwrap();
        registry.register(HookTarget::All, hook("time")).unwrap();

        let first = registry.hooks_for(&program);
        assert!(Arc::ptr_eq(&first, &registry.hooks_for(&program)));
        assert_eq!(registry.cached_programs(), 1);

        registry.register(HookTarget::All, hook("alpha")).unwrap();
        assert_eq!(registry.cached_programs(), 0);
        assert_eq!(registry.hooks_for(&program).len(), 2);
        assert_eq!(registry.group_for(&program).generation(), 2);
    }

    #[test]
    fn test_lookups_during_registration_stay_consistent() {
        let registry = UniformHookRegistry::new();
        let program = Identifier::parse("void:shader/solid").unwrap();

        crossbeam_utils::thread::scope(|s| {
            s.spawn(|_| {
                for i in 0..200 {
                    registry.register(HookTarget::All, hook(&format!("u{}", i))).unwrap();
                }
            });
            s.spawn(|_| {
                for _ in 0..2000 {
                    // One hook per registration: the hook count is the generation
                    let group = registry.group_for(&program);
                    assert_eq!(group.len() as u64, group.generation());
                }
            });
        })
        .unwrap();

        assert_eq!(registry.hooks_for(&program).len(), 200);
        assert_eq!(registry.group_for(&program).generation(), 200);
    }
}
