//! # Store Contract
//!
//! The service identity, the parameter DTO, and the capability trait that
//! every backend implements. Command handlers hold a `Box<dyn Store>` and
//! never construct backend-specific requests themselves.

pub mod aws;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three-part identity that scopes all configuration for one service.
///
/// Serialized with capitalised field names to stay compatible with the
/// identity files written by instance provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Service {
    pub stage: String,
    pub stack: String,
    pub app: String,
}

impl Service {
    /// Canonical namespace prefix for this service: `/{stage}/{stack}/{app}`.
    /// Stage comes first; the order is fixed.
    pub fn prefix(&self) -> String {
        format!("/{}/{}/{}", self.stage, self.stack, self.app)
    }
}

/// Flattens a fully-qualified item name into a shell-safe key: strips a
/// leading `{prefix}/` if present, then replaces every `.` and `/` with `_`.
///
/// The order matters - the prefix is stripped before replacement so its own
/// slashes never leak into the key.
pub fn clean_key(name: &str, prefix: &str) -> String {
    let relative = name
        .strip_prefix(&format!("{prefix}/"))
        .unwrap_or(name);
    relative.replace(['.', '/'], "_")
}

/// One configuration entry or secret.
///
/// `name` is fully qualified (prefixed with the namespace path) on items
/// returned by `get`/`list`; items submitted to `set`/`delete` use
/// namespace-relative names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub service: Service,
    pub name: String,
    pub value: String,
    pub is_secret: bool,
}

impl fmt::Display for Parameter {
    /// Renders `key=value`, the form consumed as a process environment
    /// variable by downstream tooling.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}",
            clean_key(&self.name, &self.service.prefix()),
            self.value
        )
    }
}

/// Errors surfaced by the store contract.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed item does not exist. Returned by `get` and `delete`
    /// only; `set` is an upsert and an empty `list` is not an error.
    #[error("'{name}' was not found")]
    NotFound { name: String },

    /// The caller violated a precondition of this store. Never retried.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The backing service reported any other failure (network, permission,
    /// throttling, timeout). Propagated with the operation and target so the
    /// caller can report it.
    #[error("{operation} failed for '{target}': {message}")]
    Transport {
        operation: &'static str,
        target: String,
        message: String,
    },
}

/// The capability contract implemented by every backend.
///
/// Which backend a caller holds (parameter store vs. secrets manager) is a
/// command-level decision; the contract itself does not route.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch one item by namespace-relative name, decrypted.
    async fn get(&self, service: &Service, name: &str) -> Result<Parameter, StoreError>;

    /// Fetch every item under the service's namespace prefix. Ordering is
    /// backend-defined and not guaranteed stable across calls.
    async fn list(&self, service: &Service) -> Result<Vec<Parameter>, StoreError>;

    /// Create or overwrite one item. Upsert semantics for every backend.
    async fn set(
        &self,
        service: &Service,
        name: &str,
        value: &str,
        is_secret: bool,
    ) -> Result<(), StoreError>;

    /// Remove one item by namespace-relative name.
    async fn delete(&self, service: &Service, name: &str) -> Result<(), StoreError>;
}
