//! Filter specs and the spec factory
//!
//! A spec is created exactly once per configuration instantiation by
//! [`new_spec`] and is immutable afterwards. The factory runs two validation
//! gates in order:
//!
//! ```text
//! raw ──▶ YAML ──▶ MetaSpec ──▶ meta schema ──▶ registry lookup
//!                                                    │
//!   Spec ◀── stamp ◀── kind schema ◀── decode over DefaultSpec
//! ```
//!
//! Concrete spec types implement [`KindSpec`] and embed a [`BaseSpec`]; the
//! [`Spec`] capability is provided for them by a blanket impl.

use std::any::{Any, type_name};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::registry::KindRegistry;
use crate::supervisor::{MetaSpec, Supervisor};
use crate::validation::{self, ValidateResult};

use self::sealed::SpecInternal;

/// Envelope embedded in every concrete spec
///
/// Only the identity fields are part of the YAML form. Placement, the
/// supervisor reference and the snapshot are stamped once by the factory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BaseSpec {
    #[serde(flatten)]
    meta: MetaSpec,

    #[serde(skip)]
    supervisor: Weak<Supervisor>,

    #[serde(skip)]
    pipeline: String,

    #[serde(skip)]
    yaml_config: String,
}

impl BaseSpec {
    /// Identity fields
    pub fn meta(&self) -> &MetaSpec {
        &self.meta
    }

    fn stamp(&mut self, supervisor: &Arc<Supervisor>, pipeline: &str, yaml_config: String) {
        self.supervisor = Arc::downgrade(supervisor);
        self.pipeline = pipeline.to_string();
        self.yaml_config = yaml_config;
    }
}

/// Implemented by every concrete spec type
///
/// ```rust,ignore
/// #[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
/// pub struct RetryerSpec {
///     #[serde(flatten)]
///     pub base: BaseSpec,
///     #[schemars(range(min = 1))]
///     pub max_attempts: u32,
/// }
///
/// impl KindSpec for RetryerSpec {
///     fn base(&self) -> &BaseSpec { &self.base }
///     fn base_mut(&mut self, _: FactoryToken) -> &mut BaseSpec { &mut self.base }
/// }
/// ```
pub trait KindSpec:
    Serialize + DeserializeOwned + JsonSchema + Clone + fmt::Debug + Send + Sync + 'static
{
    /// Embedded envelope
    fn base(&self) -> &BaseSpec;

    /// Embedded envelope, for the factory to stamp
    fn base_mut(&mut self, token: FactoryToken) -> &mut BaseSpec;

    /// Cross-field checks the schema cannot express
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Grants mutable access to a spec's [`BaseSpec`].
///
/// Only the factory can create one, so code outside this crate cannot call
/// [`KindSpec::base_mut`]:
///
/// ```compile_fail
/// use filterspec::FactoryToken;
///
/// let _token = FactoryToken(());
/// ```
pub struct FactoryToken(());

mod sealed {
    use std::any::Any;
    use std::sync::Arc;

    use super::BaseSpec;
    use crate::error::Result;
    use crate::validation::ValidateResult;

    pub trait SpecInternal {
        fn base_spec_mut(&mut self) -> &mut BaseSpec;
        fn decode_layered(
            &mut self,
            doc: &serde_yaml::Value,
        ) -> std::result::Result<(), serde_yaml::Error>;
        fn validate_kind(&self) -> Result<ValidateResult>;
        fn render_yaml(&self) -> std::result::Result<String, serde_yaml::Error>;
        fn into_any_box(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
        fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    }
}

/// Read-only capability shared by all specs
pub trait Spec: sealed::SpecInternal + fmt::Debug + Send + Sync + 'static {
    /// Supervisor the spec was created under, if it is still alive
    fn supervisor(&self) -> Option<Arc<Supervisor>>;

    /// Spec name
    fn name(&self) -> &str;

    /// Spec kind
    fn kind(&self) -> &str;

    /// Name of the pipeline the spec belongs to
    fn pipeline(&self) -> &str;

    /// Canonical YAML snapshot of the validated spec
    fn yaml_config(&self) -> &str;

    /// Concrete spec as `Any`
    fn as_any(&self) -> &dyn Any;
}

impl<T: KindSpec> sealed::SpecInternal for T {
    fn base_spec_mut(&mut self) -> &mut BaseSpec {
        self.base_mut(FactoryToken(()))
    }

    fn decode_layered(
        &mut self,
        doc: &serde_yaml::Value,
    ) -> std::result::Result<(), serde_yaml::Error> {
        let mut merged = serde_yaml::to_value(&*self)?;
        merge_yaml(&mut merged, doc.clone());
        *self = serde_yaml::from_value(merged)?;
        Ok(())
    }

    fn validate_kind(&self) -> Result<ValidateResult> {
        let mut result = validation::validate(self)?;
        if let Err(message) = KindSpec::validate(self) {
            result.add_general_error(message);
        }
        Ok(result)
    }

    fn render_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    fn into_any_box(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T: KindSpec> Spec for T {
    fn supervisor(&self) -> Option<Arc<Supervisor>> {
        self.base().supervisor.upgrade()
    }

    fn name(&self) -> &str {
        &self.base().meta.name
    }

    fn kind(&self) -> &str {
        &self.base().meta.kind
    }

    fn pipeline(&self) -> &str {
        &self.base().pipeline
    }

    fn yaml_config(&self) -> &str {
        &self.base().yaml_config
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn Spec {
    /// Borrow the concrete spec
    pub fn downcast_ref<T: KindSpec>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Take ownership of the concrete spec
    pub fn downcast<T: KindSpec>(self: Box<Self>) -> Result<Box<T>> {
        let name = self.name().to_string();
        let kind = self.kind().to_string();
        self.into_any_box()
            .downcast::<T>()
            .map_err(|_| Error::SpecMismatch {
                name,
                kind,
                expected: type_name::<T>(),
            })
    }

    /// Hex SHA-256 of the canonical snapshot
    pub fn config_digest(&self) -> String {
        hex::encode(Sha256::digest(self.yaml_config().as_bytes()))
    }
}

/// Convert a shared spec into its concrete type.
pub fn downcast_spec<T: KindSpec>(spec: Arc<dyn Spec>) -> Result<Arc<T>> {
    let name = spec.name().to_string();
    let kind = spec.kind().to_string();
    spec.into_any_arc()
        .downcast::<T>()
        .map_err(|_| Error::SpecMismatch {
            name,
            kind,
            expected: type_name::<T>(),
        })
}

/// Create a filter spec and validate it.
///
/// Callers only ever see a fully validated spec or an error. A panic raised
/// while building the spec, including inside a kind's `default_spec` or
/// `validate`, is recovered and returned as [`Error::InternalFault`].
pub fn new_spec<R, S>(
    registry: &R,
    supervisor: &Arc<Supervisor>,
    pipeline: &str,
    raw_spec: &S,
) -> Result<Box<dyn Spec>>
where
    R: KindRegistry + ?Sized,
    S: Serialize + ?Sized,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        build_spec(registry, supervisor, pipeline, raw_spec)
    }));

    match outcome {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            tracing::warn!(pipeline, %message, "recovered fault while creating filter spec");
            Err(Error::InternalFault { message })
        }
    }
}

fn build_spec<R, S>(
    registry: &R,
    supervisor: &Arc<Supervisor>,
    pipeline: &str,
    raw_spec: &S,
) -> Result<Box<dyn Spec>>
where
    R: KindRegistry + ?Sized,
    S: Serialize + ?Sized,
{
    let yaml = serde_yaml::to_string(raw_spec).map_err(Error::Encoding)?;
    let mut doc: serde_yaml::Value = serde_yaml::from_str(&yaml).map_err(Error::Decoding)?;
    drop_nulls(&mut doc);

    // Meta part.
    let meta: MetaSpec = serde_yaml::from_value(doc.clone()).map_err(Error::Decoding)?;
    let result = validation::validate(&meta)?;
    if !result.valid() {
        return Err(Error::MetaValidation(result));
    }

    // Kind part.
    let root = registry.lookup(&meta.kind).ok_or_else(|| Error::UnknownKind {
        kind: meta.kind.clone(),
    })?;
    let mut spec = root.default_spec();
    spec.decode_layered(&doc).map_err(Error::Decoding)?;

    let result = spec.validate_kind()?;
    if !result.valid() {
        return Err(Error::KindValidation {
            kind: meta.kind,
            result,
        });
    }

    let yaml_config = spec.render_yaml().map_err(Error::Encoding)?;
    spec.base_spec_mut().stamp(supervisor, pipeline, yaml_config);

    tracing::debug!(
        name = %meta.name,
        kind = %meta.kind,
        pipeline,
        "created filter spec"
    );
    Ok(spec)
}

/// Treat null mapping entries as absent. A null document is an empty one.
fn drop_nulls(value: &mut serde_yaml::Value) {
    match value {
        serde_yaml::Value::Null => *value = serde_yaml::Value::Mapping(Default::default()),
        serde_yaml::Value::Mapping(map) => {
            for (key, mut entry) in std::mem::take(map) {
                if entry.is_null() {
                    continue;
                }
                drop_nulls(&mut entry);
                map.insert(key, entry);
            }
        }
        serde_yaml::Value::Sequence(items) => items.iter_mut().for_each(drop_nulls_in_item),
        serde_yaml::Value::Tagged(tagged) => drop_nulls(&mut tagged.value),
        _ => {}
    }
}

/// Sequence items keep their position, so a null item stays null.
fn drop_nulls_in_item(item: &mut serde_yaml::Value) {
    if !item.is_null() {
        drop_nulls(item);
    }
}

/// Deep-merge `overlay` into `base`: mappings merge key by key, anything else replaces.
fn merge_yaml(base: &mut serde_yaml::Value, overlay: serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base), serde_yaml::Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
