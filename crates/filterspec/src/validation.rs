//! Schema validation for specs
//!
//! Every spec type derives a JSON Schema with `schemars`. Values are rendered
//! to JSON and evaluated with `jsonschema`, collecting every violation instead
//! of stopping at the first one. Compiled validators are cached per type.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use jsonschema::Validator;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static VALIDATORS: Lazy<RwLock<HashMap<TypeId, Arc<Validator>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Outcome of validating one value
///
/// Renders as YAML, e.g.
///
/// ```text
/// jsonschemaErrs:
/// - 'policies.0.name: "" is shorter than 1 character'
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateResult {
    /// Violations reported by the JSON Schema
    #[serde(
        rename = "jsonschemaErrs",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub schema_errors: Vec<String>,

    /// Violations reported by the type's own checks
    #[serde(rename = "generalErrs", default, skip_serializing_if = "Vec::is_empty")]
    pub general_errors: Vec<String>,
}

impl ValidateResult {
    /// Whether no violation was found
    pub fn valid(&self) -> bool {
        self.schema_errors.is_empty() && self.general_errors.is_empty()
    }

    /// All violations, schema ones first
    pub fn violations(&self) -> impl Iterator<Item = &str> {
        self.schema_errors
            .iter()
            .chain(self.general_errors.iter())
            .map(String::as_str)
    }

    /// Record a violation that the schema cannot express
    pub fn add_general_error(&mut self, message: impl Into<String>) {
        self.general_errors.push(message.into());
    }
}

impl fmt::Display for ValidateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_yaml::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(text.trim_end())
    }
}

/// Validate a value against the JSON Schema derived from its type.
pub fn validate<T>(value: &T) -> Result<ValidateResult>
where
    T: Serialize + JsonSchema + 'static,
{
    let validator = validator_for::<T>()?;
    let instance = serde_json::to_value(value)?;

    let schema_errors = validator
        .iter_errors(&instance)
        .map(|err| format!("{}: {}", field_path(err.instance_path.as_str()), err))
        .collect();

    Ok(ValidateResult {
        schema_errors,
        general_errors: Vec::new(),
    })
}

/// JSON Schema derived for a spec type
pub fn schema_of<T: JsonSchema>() -> serde_json::Value {
    schemars::schema_for!(T).as_value().clone()
}

fn validator_for<T: JsonSchema + 'static>() -> Result<Arc<Validator>> {
    let id = TypeId::of::<T>();
    if let Some(validator) = VALIDATORS.read().get(&id) {
        return Ok(Arc::clone(validator));
    }

    let schema = schema_of::<T>();
    let validator = jsonschema::validator_for(&schema).map_err(|e| Error::Schema {
        type_name: type_name::<T>(),
        message: e.to_string(),
    })?;
    tracing::debug!(type_name = type_name::<T>(), "compiled spec schema");

    let mut validators = VALIDATORS.write();
    Ok(Arc::clone(
        validators.entry(id).or_insert_with(|| Arc::new(validator)),
    ))
}

/// Turn a JSON pointer into a dotted field path, `(root)` for the document itself.
fn field_path(pointer: &str) -> String {
    let path = pointer.trim_start_matches('/');
    if path.is_empty() {
        "(root)".to_string()
    } else {
        path.replace('/', ".")
    }
}
