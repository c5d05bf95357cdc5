//! Pipeline spec assembly
//!
//! Builds every filter spec of a pipeline through the spec factory and checks
//! the flow wiring against the results each kind declares. Nothing is
//! executed here.
//!
//! # Example
//!
//! ```yaml
//! name: api-gateway
//! flow:
//!   - filter: limiter
//!     jumpIf:
//!       throttled: END
//!   - filter: retry
//! filters:
//!   - name: limiter
//!     kind: RateLimiter
//!     policies:
//!       - name: default
//!   - name: retry
//!     kind: Retryer
//!     maxAttempts: 3
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::registry::KindRegistry;
use crate::spec::{Spec, new_spec};
use crate::supervisor::Supervisor;

/// Jump target ending the flow
pub const END: &str = "END";

/// One step of the flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    /// Filter name
    pub filter: String,

    /// Result label -> filter to jump to (or `END`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub jump_if: BTreeMap<String, String>,
}

impl FlowNode {
    fn sequential(filter: &str) -> Self {
        Self {
            filter: filter.to_string(),
            jump_if: BTreeMap::new(),
        }
    }
}

/// Pipeline definition as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Pipeline name
    pub name: String,

    /// Execution order, defaults to the declaration order of `filters`
    #[serde(default)]
    pub flow: Vec<FlowNode>,

    /// Raw filter specs
    #[serde(default)]
    pub filters: Vec<serde_yaml::Value>,
}

/// Validated filter specs of one pipeline
#[derive(Debug)]
pub struct PipelineSpecs {
    name: String,
    flow: Vec<FlowNode>,
    specs: Vec<Arc<dyn Spec>>,
}

impl PipelineSpecs {
    /// Pipeline name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved flow
    pub fn flow(&self) -> &[FlowNode] {
        &self.flow
    }

    /// Specs in declaration order
    pub fn specs(&self) -> &[Arc<dyn Spec>] {
        &self.specs
    }

    /// Spec of the filter called `name`
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Spec>> {
        self.specs.iter().find(|spec| spec.name() == name)
    }
}

impl PipelineSpec {
    /// Parse a pipeline from YAML text
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load a pipeline from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Create every filter spec and validate the flow wiring.
    pub fn build<R>(&self, registry: &R, supervisor: &Arc<Supervisor>) -> Result<PipelineSpecs>
    where
        R: KindRegistry + ?Sized,
    {
        let mut specs: Vec<Arc<dyn Spec>> = Vec::with_capacity(self.filters.len());
        let mut results: HashMap<String, (String, &'static [&'static str])> = HashMap::new();

        for raw in &self.filters {
            let spec: Arc<dyn Spec> = Arc::from(new_spec(registry, supervisor, &self.name, raw)?);
            let name = spec.name().to_string();
            if name == END {
                return Err(self.invalid(format!("filter name {} is reserved", END)));
            }
            if results.contains_key(&name) {
                return Err(self.invalid(format!("filter name {} is repeated", name)));
            }

            let kind = spec.kind().to_string();
            let declared = registry
                .lookup(&kind)
                .map(|root| root.results())
                .ok_or_else(|| Error::UnknownKind { kind: kind.clone() })?;
            results.insert(name, (kind, declared));
            specs.push(spec);
        }

        let flow = if self.flow.is_empty() {
            specs
                .iter()
                .map(|spec| FlowNode::sequential(spec.name()))
                .collect()
        } else {
            self.flow.clone()
        };
        self.check_flow(&flow, &results)?;

        tracing::info!(
            pipeline = %self.name,
            filters = specs.len(),
            "built pipeline specs"
        );
        Ok(PipelineSpecs {
            name: self.name.clone(),
            flow,
            specs,
        })
    }

    fn check_flow(
        &self,
        flow: &[FlowNode],
        results: &HashMap<String, (String, &'static [&'static str])>,
    ) -> Result<()> {
        let mut positions = HashMap::new();
        for (index, node) in flow.iter().enumerate() {
            if !results.contains_key(&node.filter) {
                return Err(self.invalid(format!("filter {} in flow not found", node.filter)));
            }
            if positions.insert(node.filter.as_str(), index).is_some() {
                return Err(self.invalid(format!(
                    "filter {} appears more than once in flow",
                    node.filter
                )));
            }
        }

        for (index, node) in flow.iter().enumerate() {
            let (kind, declared) = &results[&node.filter];
            for (result, target) in &node.jump_if {
                if !declared.iter().any(|r| *r == result.as_str()) {
                    return Err(self.invalid(format!(
                        "filter {}: result {} is not declared by kind {}",
                        node.filter, result, kind
                    )));
                }
                let later = positions.get(target.as_str()).is_some_and(|&p| p > index);
                if target != END && !later {
                    return Err(self.invalid(format!(
                        "filter {}: jump target {} must be {} or a later filter",
                        node.filter, target, END
                    )));
                }
            }
        }
        Ok(())
    }

    fn invalid(&self, message: String) -> Error {
        Error::InvalidPipeline {
            pipeline: self.name.clone(),
            message,
        }
    }
}
