//! Error types for filterspec

use thiserror::Error;

use crate::validation::ValidateResult;

/// Result type alias for filterspec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building and driving filter specs
#[derive(Error, Debug)]
pub enum Error {
    /// Raw spec could not be rendered to YAML
    #[error("failed to encode spec: {0}")]
    Encoding(#[source] serde_yaml::Error),

    /// Rendered spec could not populate the target structure
    #[error("failed to decode spec: {0}")]
    Decoding(#[source] serde_yaml::Error),

    /// Name or kind failed schema validation
    #[error("invalid meta spec:\n{0}")]
    MetaValidation(ValidateResult),

    /// Kind is not present in the registry
    #[error("kind {kind} not found")]
    UnknownKind {
        /// Offending kind
        kind: String,
    },

    /// Kind-specific fields failed schema validation
    #[error("invalid {kind} spec:\n{result}")]
    KindValidation {
        /// Kind of the rejected spec
        kind: String,
        /// Every violation found
        result: ValidateResult,
    },

    /// A fault was raised while building a spec and recovered at the factory boundary
    #[error("internal fault: {message}")]
    InternalFault {
        /// Panic payload or fault description
        message: String,
    },

    /// JSON Schema for a spec type could not be compiled
    #[error("invalid schema for {type_name}: {message}")]
    Schema {
        /// Rust type the schema was generated from
        type_name: &'static str,
        /// Compiler message
        message: String,
    },

    /// Filter registered with an empty kind
    #[error("filter kind is empty")]
    EmptyKind,

    /// Kind registered twice
    #[error("filter kind {kind} is already registered")]
    DuplicateKind {
        /// Duplicated kind
        kind: String,
    },

    /// Declared results are empty or repeated
    #[error("filter kind {kind}: {message}")]
    InvalidResults {
        /// Kind declaring the results
        kind: String,
        /// Description of the problem
        message: String,
    },

    /// Spec is not of the requested concrete type
    #[error("spec {name} of kind {kind} is not a {expected}")]
    SpecMismatch {
        /// Spec name
        name: String,
        /// Spec kind
        kind: String,
        /// Requested Rust type
        expected: &'static str,
    },

    /// Previous generation belongs to another kind
    #[error("cannot inherit {kind} from previous generation of kind {previous}")]
    KindMismatch {
        /// Kind of the new spec
        kind: String,
        /// Kind of the previous generation
        previous: String,
    },

    /// Filter was used outside the initialized state
    #[error("filter {name} is not initialized or already closed")]
    FilterClosed {
        /// Filter name
        name: String,
    },

    /// Filter returned a result it never declared
    #[error("filter {name} of kind {kind} returned undeclared result {result}")]
    UndeclaredResult {
        /// Filter name
        name: String,
        /// Filter kind
        kind: String,
        /// Returned label
        result: String,
    },

    /// Pipeline wiring is invalid
    #[error("invalid pipeline '{pipeline}': {message}")]
    InvalidPipeline {
        /// Pipeline name
        pipeline: String,
        /// Description of the problem
        message: String,
    },

    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
