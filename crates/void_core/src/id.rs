//! Namespaced identifiers and instance ids
//!
//! [`Identifier`] is the stable name used for stages, uniforms, state slots,
//! flow types and resources. It is value-equal and hashes through a
//! precomputed FNV-1a digest, so it is cheap to use as a map key and cheap to
//! clone (the strings are shared).

use core::cmp::Ordering as CmpOrdering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::sync::atomic::{AtomicU64, Ordering};
use alloc::string::String;
use alloc::sync::Arc;

/// Namespace used when a bare path is parsed
pub const DEFAULT_NAMESPACE: &str = "void";

/// A namespaced key (`namespace:path`)
#[derive(Clone)]
pub struct Identifier {
    namespace: Arc<str>,
    path: Arc<str>,
    hash: u64,
}

impl Identifier {
    /// Create an identifier, validating both parts
    pub fn new(namespace: &str, path: &str) -> Result<Self, IdentifierError> {
        validate(namespace, false)
            .map_err(|c| IdentifierError::InvalidNamespace { namespace: namespace.into(), found: c })?;
        validate(path, true)
            .map_err(|c| IdentifierError::InvalidPath { path: path.into(), found: c })?;
        Ok(Self::new_unchecked(namespace, path))
    }

    /// Create an identifier in the default namespace
    pub fn void(path: &str) -> Result<Self, IdentifierError> {
        Self::new(DEFAULT_NAMESPACE, path)
    }

    /// Parse `namespace:path`, or a bare `path` in the default namespace
    pub fn parse(text: &str) -> Result<Self, IdentifierError> {
        match text.split_once(':') {
            Some((namespace, path)) => Self::new(namespace, path),
            None => Self::void(text),
        }
    }

    /// Build without validation. Intended for compile-time constant names.
    pub fn new_unchecked(namespace: &str, path: &str) -> Self {
        let mut hash = 0xcbf29ce484222325u64;
        for byte in namespace.bytes().chain(core::iter::once(b':')).chain(path.bytes()) {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }

        Self {
            namespace: namespace.into(),
            path: path.into(),
            hash,
        }
    }

    /// Namespace part
    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Path part
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Precomputed FNV-1a hash of `namespace:path`
    #[inline]
    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    /// Derive a child identifier by appending a path segment
    pub fn child(&self, segment: &str) -> Result<Self, IdentifierError> {
        let mut path = String::with_capacity(self.path.len() + 1 + segment.len());
        path.push_str(&self.path);
        path.push('/');
        path.push_str(segment);
        Self::new(&self.namespace, &path)
    }
}

fn validate(part: &str, allow_slash: bool) -> Result<(), char> {
    if part.is_empty() {
        return Err(' ');
    }
    for c in part.chars() {
        let ok = matches!(c, 'a'..='z' | '0'..='9' | '_' | '.' | '-') || (allow_slash && c == '/');
        if !ok {
            return Err(c);
        }
    }
    Ok(())
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.namespace == other.namespace && self.path == other.path
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.namespace
            .cmp(&other.namespace)
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({}:{})", self.namespace, self.path)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

/// Identifier parse/validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// Namespace is empty or has an illegal character
    InvalidNamespace { namespace: String, found: char },
    /// Path is empty or has an illegal character
    InvalidPath { path: String, found: char },
}

impl fmt::Display for IdentifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierError::InvalidNamespace { namespace, found } => {
                write!(f, "Invalid namespace '{}' (offending character {:?})", namespace, found)
            }
            IdentifierError::InvalidPath { path, found } => {
                write!(f, "Invalid path '{}' (offending character {:?})", path, found)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for IdentifierError {}

/// Id of a registered drawable instance
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Wrap a raw value
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value
    #[inline]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Thread-safe instance id generator
pub struct InstanceIdGenerator {
    next: AtomicU64,
}

impl InstanceIdGenerator {
    /// Create a new generator starting at zero
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    /// Generate the next unique id
    pub fn next(&self) -> InstanceId {
        InstanceId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Reserve a contiguous run of ids
    pub fn next_batch(&self, count: u32) -> impl Iterator<Item = InstanceId> {
        let start = self.next.fetch_add(count as u64, Ordering::Relaxed);
        (0..count as u64).map(move |i| InstanceId(start + i))
    }
}

impl Default for InstanceIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
