#![deny(warnings)]
#![deny(
  clippy::all,
  clippy::default_trait_access,
  clippy::expl_impl_clone_on_copy,
  clippy::if_not_else,
  clippy::needless_continue,
  clippy::unseparated_literal_suffix,
  clippy::used_underscore_binding
)]
#![allow(clippy::match_ref_pats)]
#![allow(
  clippy::len_without_is_empty,
  clippy::redundant_field_names,
  clippy::too_many_arguments
)]
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]
#![allow(clippy::mutex_atomic)]

//! Crash-isolated request containment (§4.11): a request carrying `containment_data`
//! dispatches to a short-lived child process loaded with a named plug-in, so that user code
//! that might crash never takes the parent process down with it. Grounded in
//! `process_execution::children::ManagedChild`'s spawn/kill-on-drop/timeout shape, simplified
//! to drop that file's process-group signal handling (the `nix` PGID machinery): CRADLE's
//! containment contract only needs "times out or dies is a transient failure", not
//! group-wide signal propagation.

mod dispatcher;
mod registry;

pub use dispatcher::{ContainedDispatcher, LoopbackContainedDispatcher, ProcessContainedDispatcher};
pub use registry::{PluginKey, PluginRegistry};

use std::path::PathBuf;

use cradle_errors::CradleError;
use values::Value;

/// The `containment_data = (uuid, dll_directory, dll_name)` a request may carry (§4.11).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainmentData {
  pub uuid: String,
  pub dll_directory: PathBuf,
  pub dll_name: String,
}

impl ContainmentData {
  pub fn plugin_key(&self) -> PluginKey {
    PluginKey {
      dll_directory: self.dll_directory.clone(),
      dll_name: self.dll_name.clone(),
    }
  }

  /// Decodes containment data out of a request's `containment()` value, which is a mapping
  /// with string fields `uuid`, `dll_directory`, `dll_name`.
  pub fn from_value(value: &Value) -> Result<ContainmentData, CradleError> {
    let Value::Mapping(fields) = value else {
      return Err(CradleError::TypeMismatch {
        expected: "mapping".to_string(),
        found: value.type_name().to_string(),
      });
    };
    let field = |name: &str| -> Result<&Value, CradleError> {
      fields
        .get(&Value::String(name.to_string()))
        .ok_or_else(|| CradleError::MissingField {
          field: name.to_string(),
        })
    };
    Ok(ContainmentData {
      uuid: field("uuid")?.as_string()?.to_string(),
      dll_directory: PathBuf::from(field("dll_directory")?.as_string()?),
      dll_name: field("dll_name")?.as_string()?.to_string(),
    })
  }
}
