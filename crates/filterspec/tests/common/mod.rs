//! Shared fixtures: a handful of filter kinds and a registry that counts lookups.

#![allow(dead_code)]

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use filterspec::filter::AsAny;
use filterspec::{
    BaseSpec, Context, FactoryToken, Filter, FilterRegistry, KindRegistry, KindSpec, Result,
    Spec, downcast_spec,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// RateLimiter
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterSpec {
    #[serde(flatten)]
    base: BaseSpec,

    #[serde(default)]
    #[schemars(length(min = 1))]
    pub policies: Vec<Policy>,

    #[serde(default = "default_timeout")]
    pub default_timeout: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default)]
    #[schemars(length(min = 1))]
    pub name: String,

    #[serde(default = "default_limit_for_period")]
    #[schemars(range(min = 1))]
    pub limit_for_period: u32,
}

fn default_timeout() -> String {
    "100ms".to_string()
}

fn default_limit_for_period() -> u32 {
    50
}

impl KindSpec for RateLimiterSpec {
    fn base(&self) -> &BaseSpec {
        &self.base
    }

    fn base_mut(&mut self, _: FactoryToken) -> &mut BaseSpec {
        &mut self.base
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let mut names = std::collections::HashSet::new();
        for policy in &self.policies {
            if !names.insert(policy.name.as_str()) {
                return Err(format!("policy {} is repeated", policy.name));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RateLimiter {
    spec: Option<Arc<RateLimiterSpec>>,
    handled: Arc<AtomicU64>,
    closed: bool,
}

impl RateLimiter {
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed
    }
}

impl Filter for RateLimiter {
    fn name(&self) -> &str {
        self.spec.as_ref().map_or("", |spec| spec.name())
    }

    fn kind(&self) -> &'static str {
        "RateLimiter"
    }

    fn default_spec(&self) -> Box<dyn Spec> {
        Box::new(RateLimiterSpec {
            default_timeout: default_timeout(),
            ..Default::default()
        })
    }

    fn description(&self) -> &'static str {
        "Limits the rate of requests"
    }

    fn results(&self) -> &'static [&'static str] {
        &["throttled"]
    }

    fn init(&mut self, spec: Arc<dyn Spec>) -> Result<()> {
        self.spec = Some(downcast_spec::<RateLimiterSpec>(spec)?);
        Ok(())
    }

    fn inherit(&mut self, spec: Arc<dyn Spec>, previous_generation: &dyn Filter) -> Result<()> {
        self.init(spec)?;
        if let Some(previous) = previous_generation.as_any().downcast_ref::<RateLimiter>() {
            self.handled = Arc::clone(&previous.handled);
        }
        Ok(())
    }

    fn handle(&self, ctx: &mut dyn Context) -> &'static str {
        let limit = self
            .spec
            .as_ref()
            .and_then(|spec| spec.policies.first())
            .map_or(u64::MAX, |policy| u64::from(policy.limit_for_period));

        let handled = self.handled.fetch_add(1, Ordering::SeqCst) + 1;
        if handled > limit {
            ctx.add_tag(format!("{}: throttled", self.name()));
            return "throttled";
        }
        ""
    }

    fn status(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "handled": self.handled() }))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

// =============================================================================
// Retryer: a required numeric field with no usable default
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryerSpec {
    #[serde(flatten)]
    base: BaseSpec,

    #[serde(default)]
    #[schemars(range(min = 1))]
    pub max_attempts: u32,
}

impl KindSpec for RetryerSpec {
    fn base(&self) -> &BaseSpec {
        &self.base
    }

    fn base_mut(&mut self, _: FactoryToken) -> &mut BaseSpec {
        &mut self.base
    }
}

#[derive(Default)]
pub struct Retryer {
    spec: Option<Arc<RetryerSpec>>,
}

impl Filter for Retryer {
    fn name(&self) -> &str {
        self.spec.as_ref().map_or("", |spec| spec.name())
    }

    fn kind(&self) -> &'static str {
        "Retryer"
    }

    fn default_spec(&self) -> Box<dyn Spec> {
        Box::new(RetryerSpec::default())
    }

    fn description(&self) -> &'static str {
        "Retries failed requests"
    }

    fn results(&self) -> &'static [&'static str] {
        &[]
    }

    fn init(&mut self, spec: Arc<dyn Spec>) -> Result<()> {
        self.spec = Some(downcast_spec::<RetryerSpec>(spec)?);
        Ok(())
    }

    fn inherit(&mut self, spec: Arc<dyn Spec>, _previous_generation: &dyn Filter) -> Result<()> {
        self.init(spec)
    }

    fn handle(&self, _ctx: &mut dyn Context) -> &'static str {
        ""
    }

    fn status(&self) -> Option<serde_json::Value> {
        None
    }

    fn close(&mut self) {}
}

// =============================================================================
// Explosive: faults while producing its default spec
// =============================================================================

#[derive(Default)]
pub struct Explosive;

impl Filter for Explosive {
    fn name(&self) -> &str {
        ""
    }

    fn kind(&self) -> &'static str {
        "Explosive"
    }

    fn default_spec(&self) -> Box<dyn Spec> {
        panic!("default spec blew up")
    }

    fn description(&self) -> &'static str {
        "Panics on demand"
    }

    fn results(&self) -> &'static [&'static str] {
        &[]
    }

    fn init(&mut self, _spec: Arc<dyn Spec>) -> Result<()> {
        Ok(())
    }

    fn inherit(&mut self, _spec: Arc<dyn Spec>, _previous_generation: &dyn Filter) -> Result<()> {
        Ok(())
    }

    fn handle(&self, _ctx: &mut dyn Context) -> &'static str {
        ""
    }

    fn status(&self) -> Option<serde_json::Value> {
        None
    }

    fn close(&mut self) {}
}

// =============================================================================
// Muffled: faults with a payload that carries no message
// =============================================================================

#[derive(Default)]
pub struct Muffled;

impl Filter for Muffled {
    fn name(&self) -> &str {
        ""
    }

    fn kind(&self) -> &'static str {
        "Muffled"
    }

    fn default_spec(&self) -> Box<dyn Spec> {
        std::panic::panic_any(42u8)
    }

    fn description(&self) -> &'static str {
        "Panics without a message"
    }

    fn results(&self) -> &'static [&'static str] {
        &[]
    }

    fn init(&mut self, _spec: Arc<dyn Spec>) -> Result<()> {
        Ok(())
    }

    fn inherit(&mut self, _spec: Arc<dyn Spec>, _previous_generation: &dyn Filter) -> Result<()> {
        Ok(())
    }

    fn handle(&self, _ctx: &mut dyn Context) -> &'static str {
        ""
    }

    fn status(&self) -> Option<serde_json::Value> {
        None
    }

    fn close(&mut self) {}
}

// =============================================================================
// Rogue: returns a result it never declared
// =============================================================================

#[derive(Default)]
pub struct Rogue;

impl Filter for Rogue {
    fn name(&self) -> &str {
        "rogue"
    }

    fn kind(&self) -> &'static str {
        "Rogue"
    }

    fn default_spec(&self) -> Box<dyn Spec> {
        Box::new(RetryerSpec {
            max_attempts: 1,
            ..Default::default()
        })
    }

    fn description(&self) -> &'static str {
        "Misbehaves"
    }

    fn results(&self) -> &'static [&'static str] {
        &["declared"]
    }

    fn init(&mut self, _spec: Arc<dyn Spec>) -> Result<()> {
        Ok(())
    }

    fn inherit(&mut self, _spec: Arc<dyn Spec>, _previous_generation: &dyn Filter) -> Result<()> {
        Ok(())
    }

    fn handle(&self, _ctx: &mut dyn Context) -> &'static str {
        "surprise"
    }

    fn status(&self) -> Option<serde_json::Value> {
        None
    }

    fn close(&mut self) {}
}

// =============================================================================
// Helpers
// =============================================================================

/// Registry with every fixture kind registered
pub fn registry() -> FilterRegistry {
    let registry = FilterRegistry::new();
    registry.register::<RateLimiter>().unwrap();
    registry.register::<Retryer>().unwrap();
    registry.register::<Explosive>().unwrap();
    registry.register::<Muffled>().unwrap();
    registry.register::<Rogue>().unwrap();
    registry
}

/// Wraps a registry and counts lookups
pub struct CountingRegistry {
    inner: FilterRegistry,
    lookups: AtomicUsize,
}

impl CountingRegistry {
    pub fn new(inner: FilterRegistry) -> Self {
        Self {
            inner,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl KindRegistry for CountingRegistry {
    fn lookup(&self, kind: &str) -> Option<Arc<dyn Filter>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup(kind)
    }
}

/// Context recording tags
#[derive(Debug, Default)]
pub struct TestContext {
    pub tags: Vec<String>,
}

impl Context for TestContext {
    fn add_tag(&mut self, tag: String) {
        self.tags.push(tag);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Parse a raw spec from YAML text
pub fn raw(yaml: &str) -> serde_yaml::Value {
    serde_yaml::from_str(yaml).unwrap()
}
