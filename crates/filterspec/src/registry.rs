//! Kind registry
//!
//! Maps a kind name to a prototype filter. The registry is read-many,
//! write-rare: kinds are registered at startup and looked up on every
//! spec creation.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::filter::Filter;

static GLOBAL: Lazy<FilterRegistry> = Lazy::new(FilterRegistry::new);

/// Registry capability consumed by the spec factory
pub trait KindRegistry: Send + Sync {
    /// Prototype filter registered for `kind`
    fn lookup(&self, kind: &str) -> Option<Arc<dyn Filter>>;
}

struct KindEntry {
    root: Arc<dyn Filter>,
    construct: fn() -> Box<dyn Filter>,
}

/// Concrete registry of filter kinds
#[derive(Default)]
pub struct FilterRegistry {
    kinds: RwLock<BTreeMap<String, KindEntry>>,
}

fn construct<F: Filter + Default>() -> Box<dyn Filter> {
    Box::new(F::default())
}

impl FilterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    pub fn global() -> &'static FilterRegistry {
        &GLOBAL
    }

    /// Register a filter kind.
    ///
    /// The kind must be non-empty and unique, and every declared result must
    /// be a non-empty label declared only once.
    pub fn register<F: Filter + Default>(&self) -> Result<()> {
        let root = F::default();
        let kind = root.kind().to_string();
        if kind.is_empty() {
            return Err(Error::EmptyKind);
        }

        let mut seen = HashSet::new();
        for result in root.results() {
            if result.is_empty() {
                return Err(Error::InvalidResults {
                    kind,
                    message: "empty result".to_string(),
                });
            }
            if !seen.insert(*result) {
                return Err(Error::InvalidResults {
                    kind,
                    message: format!("repeated result {}", result),
                });
            }
        }

        let mut kinds = self.kinds.write();
        if kinds.contains_key(&kind) {
            return Err(Error::DuplicateKind { kind });
        }
        tracing::debug!(kind = %kind, results = ?root.results(), "registered filter kind");
        kinds.insert(
            kind,
            KindEntry {
                root: Arc::new(root),
                construct: construct::<F>,
            },
        );
        Ok(())
    }

    /// Remove a kind, returning whether it was registered
    pub fn unregister(&self, kind: &str) -> bool {
        let removed = self.kinds.write().remove(kind).is_some();
        if removed {
            tracing::debug!(kind, "unregistered filter kind");
        }
        removed
    }

    /// Fresh, unconstructed filter of `kind`
    pub fn create(&self, kind: &str) -> Option<Box<dyn Filter>> {
        self.kinds.read().get(kind).map(|entry| (entry.construct)())
    }

    /// Registered kinds in lexical order
    pub fn kinds(&self) -> Vec<String> {
        self.kinds.read().keys().cloned().collect()
    }

    /// Whether `kind` is registered
    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.read().contains_key(kind)
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.kinds.read().len()
    }

    /// Whether no kind is registered
    pub fn is_empty(&self) -> bool {
        self.kinds.read().is_empty()
    }
}

impl KindRegistry for FilterRegistry {
    fn lookup(&self, kind: &str) -> Option<Arc<dyn Filter>> {
        self.kinds.read().get(kind).map(|entry| Arc::clone(&entry.root))
    }
}

impl<R: KindRegistry + ?Sized> KindRegistry for Arc<R> {
    fn lookup(&self, kind: &str) -> Option<Arc<dyn Filter>> {
        (**self).lookup(kind)
    }
}
