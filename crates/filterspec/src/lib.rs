//! Filterspec
//!
//! Declarative spec factory and validator for the pluggable filters of a
//! traffic-handling pipeline:
//! - Filter contract and lifecycle guard
//! - Kind registry
//! - Spec factory with two-phase schema validation
//! - Pipeline spec assembly and wiring checks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Raw spec   │────▶│    Spec     │────▶│   Filter    │
//! │   (YAML)    │     │   Factory   │     │  Instance   │
//! └─────────────┘     └──────┬──────┘     └─────────────┘
//!                            │ lookup
//!                     ┌──────▼──────┐
//!                     │  Registry   │
//!                     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use filterspec::{FilterRegistry, Supervisor, new_spec};
//!
//! let registry = FilterRegistry::new();
//! registry.register::<RateLimiter>()?;
//!
//! let supervisor = Arc::new(Supervisor::default());
//! let raw: serde_yaml::Value = serde_yaml::from_str("name: r1\nkind: RateLimiter\n")?;
//! let spec = new_spec(&registry, &supervisor, "pipeline-demo", &raw)?;
//! assert_eq!(spec.kind(), "RateLimiter");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod filter;
pub mod pipeline;
pub mod registry;
pub mod spec;
pub mod supervisor;
pub mod validation;

pub use error::{Error, Result};
pub use filter::{Context, Filter, FilterInstance, FilterState};
pub use pipeline::{FlowNode, PipelineSpec, PipelineSpecs};
pub use registry::{FilterRegistry, KindRegistry};
pub use spec::{BaseSpec, FactoryToken, KindSpec, Spec, downcast_spec, new_spec};
pub use supervisor::{MetaSpec, Supervisor, SupervisorOptions};
pub use validation::ValidateResult;
