//! Process-wide supervisor and the identity every spec carries
//!
//! The supervisor outlives every spec created under it. Specs only keep a
//! weak reference to it.
//!
//! # Configuration File
//!
//! ```yaml
//! name: member-1
//! cluster-name: primary
//! labels:
//!   zone: eu-west
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Identity fields shared by every spec
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct MetaSpec {
    /// Spec name, unique within its pipeline
    #[serde(default)]
    #[schemars(regex(pattern = r"^[A-Za-z0-9\-_\.~]{1,253}$"))]
    pub name: String,

    /// Kind selecting the filter implementation
    #[serde(default)]
    #[schemars(length(min = 1))]
    pub kind: String,
}

/// Supervisor options loaded from `supervisor.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SupervisorOptions {
    /// Member name
    #[serde(default = "default_member_name")]
    pub name: String,

    /// Cluster the member belongs to
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Free-form member labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            name: default_member_name(),
            cluster_name: default_cluster_name(),
            labels: BTreeMap::new(),
        }
    }
}

fn default_member_name() -> String {
    "member-1".to_string()
}

fn default_cluster_name() -> String {
    "default".to_string()
}

/// Process-wide supervisor handed to every spec
#[derive(Debug)]
pub struct Supervisor {
    options: SupervisorOptions,
}

impl Supervisor {
    /// Create a supervisor from options
    pub fn new(options: SupervisorOptions) -> Self {
        Self { options }
    }

    /// Load options from a directory (reading `supervisor.yaml`) or a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_path = if path.is_dir() {
            path.join("supervisor.yaml")
        } else {
            path.to_path_buf()
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let options: SupervisorOptions = serde_yaml::from_str(&contents)?;
        tracing::info!(
            member = %options.name,
            cluster = %options.cluster_name,
            "loaded supervisor options"
        );

        Ok(Self::new(options))
    }

    /// Options the supervisor was created with
    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// Member name
    pub fn member_name(&self) -> &str {
        &self.options.name
    }

    /// Cluster name
    pub fn cluster_name(&self) -> &str {
        &self.options.cluster_name
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(SupervisorOptions::default())
    }
}
