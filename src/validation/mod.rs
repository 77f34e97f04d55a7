//! Validation adapter
//!
//! Wraps the `validator` engine behind a uniform result contract: a validity
//! flag plus, on failure, a map from snake_case field path to the messages
//! reported for that field. Batch validation aggregates per-item failures
//! with the zero-based index of the failing item prefixed onto every key
//! (`[2].field_name`) and is valid only when zero items failed.
//!
//! The engine is synchronous, so the adapter is too; callers in async code
//! can call it inline.

use std::collections::BTreeMap;

use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::core::error::ValidationFailure;

/// Uniform result of a validation run.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    failure: Option<ValidationFailure>,
}

impl ValidationOutcome {
    fn valid() -> Self {
        Self { failure: None }
    }

    fn invalid(errors: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            failure: Some(ValidationFailure::new(errors)),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.failure.is_none()
    }

    /// The failure, when the run was invalid.
    pub fn failure(&self) -> Option<&ValidationFailure> {
        self.failure.as_ref()
    }

    /// Convert into a `Result`, surfacing the failure as an error value.
    pub fn into_result(self) -> Result<(), ValidationFailure> {
        match self.failure {
            None => Ok(()),
            Some(failure) => Err(failure),
        }
    }
}

/// Validate a single instance.
pub fn validate<T: Validate>(instance: &T) -> ValidationOutcome {
    match instance.validate() {
        Ok(()) => ValidationOutcome::valid(),
        Err(errors) => {
            let mut map = BTreeMap::new();
            flatten(&errors, "", &mut map);

            ValidationOutcome::invalid(map)
        }
    }
}

/// Validate a batch of instances.
///
/// Each failing item contributes its error map with `[index].` prefixed onto
/// every key, where `index` is the item's zero-based position in the batch.
pub fn validate_all<T: Validate>(instances: &[T]) -> ValidationOutcome {
    let mut map = BTreeMap::new();

    for (index, instance) in instances.iter().enumerate() {
        if let Err(errors) = instance.validate() {
            let mut item_map = BTreeMap::new();
            flatten(&errors, "", &mut item_map);

            for (field, messages) in item_map {
                map.insert(format!("[{index}].{field}"), messages);
            }
        }
    }

    if map.is_empty() {
        ValidationOutcome::valid()
    } else {
        ValidationOutcome::invalid(map)
    }
}

fn flatten(errors: &ValidationErrors, prefix: &str, out: &mut BTreeMap<String, Vec<String>>) {
    for (field, kind) in errors.errors() {
        let name = to_snake_case(field.as_ref());
        let path = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}.{name}")
        };

        match kind {
            ValidationErrorsKind::Field(failures) => {
                let messages = failures
                    .iter()
                    .map(|failure| {
                        failure
                            .message
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| failure.code.to_string())
                    })
                    .collect();

                out.insert(path, messages);
            }
            ValidationErrorsKind::Struct(nested) => flatten(nested, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    flatten(nested, &format!("{path}[{index}]"), out);
                }
            }
        }
    }
}

fn to_snake_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());

    for (index, ch) in value.chars().enumerate() {
        if ch.is_uppercase() {
            if index > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }

    out
}
