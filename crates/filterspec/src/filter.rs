//! Filter contract and lifecycle guard
//!
//! A filter instance moves through
//! `Unconstructed → Initialized → Closed`. [`FilterInstance`] owns one
//! filter and refuses calls that do not fit its current state.

use std::any::Any;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::registry::FilterRegistry;
use crate::spec::Spec;

/// Borrow a value as `Any`
pub trait AsAny: Any {
    /// `self` as `Any`
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Protocol context of one unit of traffic
pub trait Context: Send {
    /// Attach a tag for logging and tracing
    fn add_tag(&mut self, tag: String);

    /// Concrete context, for protocol-specific access
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Pluggable traffic-processing unit
pub trait Filter: AsAny + Send + Sync {
    /// Name of the filter, taken from its spec
    fn name(&self) -> &str;

    /// Unique kind of the filter
    fn kind(&self) -> &'static str;

    /// A spec with default values.
    ///
    /// Must return a new spec on every call: the caller mutates it.
    fn default_spec(&self) -> Box<dyn Spec>;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// Every result `handle` may return, apart from the normal empty result
    fn results(&self) -> &'static [&'static str];

    /// Build the filter from a validated spec
    fn init(&mut self, spec: Arc<dyn Spec>) -> Result<()>;

    /// Build the filter, carrying state over from `previous_generation`.
    ///
    /// The previous generation is borrowed: closing it stays with the caller.
    fn inherit(&mut self, spec: Arc<dyn Spec>, previous_generation: &dyn Filter) -> Result<()>;

    /// Process one unit of traffic, returning `""` or a declared result
    fn handle(&self, ctx: &mut dyn Context) -> &'static str;

    /// Point-in-time runtime status
    fn status(&self) -> Option<serde_json::Value>;

    /// Release all resources
    fn close(&mut self);
}

/// Lifecycle state of a [`FilterInstance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// Created, not yet built from a spec
    Unconstructed,
    /// Built and able to handle traffic
    Initialized,
    /// Resources released
    Closed,
}

/// A filter bound to its spec, guarding the lifecycle
pub struct FilterInstance {
    filter: Box<dyn Filter>,
    spec: Arc<dyn Spec>,
    state: FilterState,
}

impl FilterInstance {
    /// Create and initialize a filter of the spec's kind
    pub fn init(registry: &FilterRegistry, spec: Arc<dyn Spec>) -> Result<Self> {
        let mut instance = Self::unconstructed(registry, spec)?;
        instance.filter.init(Arc::clone(&instance.spec))?;
        instance.state = FilterState::Initialized;
        tracing::debug!(name = instance.name(), kind = instance.kind(), "initialized filter");
        Ok(instance)
    }

    /// Create a filter of the spec's kind inheriting from `previous`.
    ///
    /// `previous` must be a live filter of the same kind. It is left open.
    pub fn inherit(
        registry: &FilterRegistry,
        spec: Arc<dyn Spec>,
        previous: &FilterInstance,
    ) -> Result<Self> {
        if previous.kind() != spec.kind() {
            return Err(Error::KindMismatch {
                kind: spec.kind().to_string(),
                previous: previous.kind().to_string(),
            });
        }
        if previous.state != FilterState::Initialized {
            return Err(Error::FilterClosed {
                name: previous.name().to_string(),
            });
        }

        let mut instance = Self::unconstructed(registry, spec)?;
        instance
            .filter
            .inherit(Arc::clone(&instance.spec), &*previous.filter)?;
        instance.state = FilterState::Initialized;
        tracing::debug!(
            name = instance.name(),
            kind = instance.kind(),
            "initialized filter from previous generation"
        );
        Ok(instance)
    }

    fn unconstructed(registry: &FilterRegistry, spec: Arc<dyn Spec>) -> Result<Self> {
        let filter = registry
            .create(spec.kind())
            .ok_or_else(|| Error::UnknownKind {
                kind: spec.kind().to_string(),
            })?;
        Ok(Self {
            filter,
            spec,
            state: FilterState::Unconstructed,
        })
    }

    /// Run the filter on one unit of traffic
    pub fn handle(&self, ctx: &mut dyn Context) -> Result<&'static str> {
        if self.state != FilterState::Initialized {
            return Err(Error::FilterClosed {
                name: self.name().to_string(),
            });
        }

        let result = self.filter.handle(ctx);
        if !result.is_empty() && !self.filter.results().contains(&result) {
            return Err(Error::UndeclaredResult {
                name: self.name().to_string(),
                kind: self.kind().to_string(),
                result: result.to_string(),
            });
        }
        Ok(result)
    }

    /// Runtime status, `None` once closed
    pub fn status(&self) -> Option<serde_json::Value> {
        match self.state {
            FilterState::Initialized => self.filter.status(),
            _ => None,
        }
    }

    /// Close the filter. Later calls are no-ops.
    pub fn close(&mut self) {
        if self.state == FilterState::Closed {
            tracing::warn!(name = self.name(), "filter already closed");
            return;
        }
        self.filter.close();
        self.state = FilterState::Closed;
        tracing::debug!(name = self.name(), kind = self.kind(), "closed filter");
    }

    /// Name from the spec
    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// Kind from the spec
    pub fn kind(&self) -> &str {
        self.spec.kind()
    }

    /// Spec the filter was built from
    pub fn spec(&self) -> &Arc<dyn Spec> {
        &self.spec
    }

    /// The wrapped filter
    pub fn filter(&self) -> &dyn Filter {
        &*self.filter
    }

    /// Current lifecycle state
    pub fn state(&self) -> FilterState {
        self.state
    }
}
