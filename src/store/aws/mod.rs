//! # AWS Backends
//!
//! Backend implementations of the store contract:
//!
//! - `parameter_store`: AWS Systems Manager Parameter Store for hierarchical
//!   config values (plain and encrypted)
//! - `secrets_manager`: AWS Secrets Manager for version-chained secrets
//!
//! Both talk to AWS through a narrow API seam so the store logic can be
//! tested against recording mocks.

pub mod parameter_store;
pub mod secrets_manager;

pub use parameter_store::ParameterStore;
pub use secrets_manager::SecretsManagerStore;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::info;

use crate::store::StoreError;

/// Create the shared AWS SDK config with the operating region and an
/// optional shared-credentials profile (for running locally).
///
/// Setting `AWS_ENDPOINT_URL` routes every request to a local emulator
/// instead of the real AWS endpoints.
pub async fn create_sdk_config(region: &str, profile: Option<&str>) -> SdkConfig {
    let mut builder = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()));

    if let Some(profile) = profile {
        builder = builder.profile_name(profile);
    }

    if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL") {
        info!("routing AWS requests to endpoint override {}", endpoint);
        builder = builder.endpoint_url(&endpoint);
    }

    builder.load().await
}

/// Failure reported by the API seam, pre-classified into the kinds the
/// store logic switches on. Everything else stays an opaque message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ApiError {
    /// The addressed entry does not exist.
    NotFound,
    /// A create collided with an existing entry of the same name.
    AlreadyExists,
    /// Any other failure: network, permission, throttling, malformed
    /// request, or a timed-out round trip.
    Other(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound => write!(f, "not found"),
            ApiError::AlreadyExists => write!(f, "already exists"),
            ApiError::Other(message) => write!(f, "{message}"),
        }
    }
}

impl ApiError {
    /// Lift an API failure into the store error taxonomy, attaching the
    /// operation name and target for caller-side reporting.
    pub(crate) fn into_store_error(self, operation: &'static str, target: &str) -> StoreError {
        match self {
            ApiError::NotFound => StoreError::NotFound {
                name: target.to_string(),
            },
            other => StoreError::Transport {
                operation,
                target: target.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Bound one network round trip by the configured timeout. The timeout is
/// fresh per round trip, not per logical operation - a multi-page listing
/// applies it to each page and each per-entry fetch independently.
pub(crate) async fn round_trip<T, F>(timeout: Duration, fut: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>> + Send,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Other(format!(
            "no response within {timeout:?}"
        ))),
    }
}
