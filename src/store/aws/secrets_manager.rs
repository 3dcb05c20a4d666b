//! # Secrets Manager Backend
//!
//! Implements the store contract against AWS Secrets Manager, where every
//! write creates a new immutable version of a named secret.
//!
//! The awkward parts this backend papers over:
//!
//! - first-write (`CreateSecret`) and subsequent-write (`PutSecretValue`)
//!   are different operations, reconciled into one idempotent `set` by
//!   reacting to the already-exists conflict the service reports
//! - listing returns metadata only, so every entry costs a second round
//!   trip to decrypt its current value
//! - deletion is either immediate-irreversible or scheduled with a
//!   recovery window, never both

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_secretsmanager::types::{Filter, FilterNameStringType, SortOrderType, Tag};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::debug;

use super::{round_trip, ApiError};
use crate::store::{Parameter, Service, Store, StoreError};

/// Recovery windows the backing service accepts for a scheduled deletion.
const RETENTION_DAYS_RANGE: RangeInclusive<i64> = 7..=30;

/// Metadata for one listed secret. `id` is what the per-entry value fetch
/// addresses (the ARN when the service reports one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SecretEntry {
    pub(crate) id: String,
    pub(crate) name: String,
}

/// One page of secret metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SecretPage {
    pub(crate) entries: Vec<SecretEntry>,
    pub(crate) next_token: Option<String>,
}

/// The decrypted current version of one secret. `value` is `None` for
/// binary-typed secrets, which this backend does not support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SecretValue {
    pub(crate) name: String,
    pub(crate) value: Option<String>,
}

/// How a deletion is issued. The two request shapes are mutually exclusive
/// by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeletionMode {
    /// Irreversible immediate removal, no recovery window.
    Force,
    /// Scheduled removal after the given number of days of recovery.
    Recover { days: i64 },
}

/// The slice of the Secrets Manager API this backend needs. The real
/// implementation wraps the SDK client; tests substitute a recording mock.
#[async_trait]
pub(crate) trait SecretsApi: Send + Sync {
    async fn get_secret_value(&self, secret_id: &str) -> Result<SecretValue, ApiError>;
    /// Returns the version id of the newly created secret.
    async fn create_secret(
        &self,
        name: &str,
        value: &str,
        idempotency_token: &str,
        service: &Service,
    ) -> Result<String, ApiError>;
    /// Returns the version id of the appended secret version.
    async fn put_secret_value(
        &self,
        secret_id: &str,
        value: &str,
        idempotency_token: &str,
    ) -> Result<String, ApiError>;
    async fn list_secrets(
        &self,
        name_prefix: &str,
        next_token: Option<&str>,
    ) -> Result<SecretPage, ApiError>;
    async fn delete_secret(&self, secret_id: &str, mode: DeletionMode) -> Result<(), ApiError>;
}

struct SecretsManagerClientApi {
    client: aws_sdk_secretsmanager::Client,
}

#[async_trait]
impl SecretsApi for SecretsManagerClientApi {
    async fn get_secret_value(&self, secret_id: &str) -> Result<SecretValue, ApiError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|err| match err.into_service_error() {
                e if e.is_resource_not_found_exception() => ApiError::NotFound,
                e => ApiError::Other(e.to_string()),
            })?;

        Ok(SecretValue {
            name: output.name.unwrap_or_else(|| secret_id.to_string()),
            value: output.secret_string,
        })
    }

    async fn create_secret(
        &self,
        name: &str,
        value: &str,
        idempotency_token: &str,
        service: &Service,
    ) -> Result<String, ApiError> {
        let tag = |key: &str, value: &str| Tag::builder().key(key).value(value).build();

        let output = self
            .client
            .create_secret()
            .client_request_token(idempotency_token)
            .name(name)
            .secret_string(value)
            .tags(tag("App", &service.app))
            .tags(tag("Stack", &service.stack))
            .tags(tag("Stage", &service.stage))
            .send()
            .await
            .map_err(|err| match err.into_service_error() {
                e if e.is_resource_exists_exception() => ApiError::AlreadyExists,
                e => ApiError::Other(e.to_string()),
            })?;

        Ok(output.version_id.unwrap_or_default())
    }

    async fn put_secret_value(
        &self,
        secret_id: &str,
        value: &str,
        idempotency_token: &str,
    ) -> Result<String, ApiError> {
        let output = self
            .client
            .put_secret_value()
            .client_request_token(idempotency_token)
            .secret_id(secret_id)
            .secret_string(value)
            .send()
            .await
            .map_err(|err| ApiError::Other(err.into_service_error().to_string()))?;

        Ok(output.version_id.unwrap_or_default())
    }

    async fn list_secrets(
        &self,
        name_prefix: &str,
        next_token: Option<&str>,
    ) -> Result<SecretPage, ApiError> {
        let mut request = self
            .client
            .list_secrets()
            .filters(
                Filter::builder()
                    .key(FilterNameStringType::Name)
                    .values(name_prefix)
                    .build(),
            )
            .sort_order(SortOrderType::Desc);
        if let Some(token) = next_token {
            request = request.next_token(token);
        }

        let output = request
            .send()
            .await
            .map_err(|err| ApiError::Other(err.into_service_error().to_string()))?;

        let entries = output
            .secret_list
            .unwrap_or_default()
            .into_iter()
            .map(|entry| {
                let name = entry.name.unwrap_or_default();
                let id = entry.arn.unwrap_or_else(|| name.clone());
                SecretEntry { id, name }
            })
            .collect();
        Ok(SecretPage {
            entries,
            next_token: output.next_token,
        })
    }

    async fn delete_secret(&self, secret_id: &str, mode: DeletionMode) -> Result<(), ApiError> {
        let mut request = self.client.delete_secret().secret_id(secret_id);
        match mode {
            DeletionMode::Force => {
                request = request.force_delete_without_recovery(true);
            }
            DeletionMode::Recover { days } => {
                request = request.recovery_window_in_days(days);
            }
        }

        request
            .send()
            .await
            .map_err(|err| match err.into_service_error() {
                e if e.is_resource_not_found_exception() => ApiError::NotFound,
                e => ApiError::Other(e.to_string()),
            })?;
        Ok(())
    }
}

/// Deterministic idempotency token for one secret value, so repeated
/// identical writes are safe to retry at the transport layer.
pub(crate) fn idempotency_token(value: &str) -> String {
    BASE64.encode(*md5::compute(value))
}

/// Secrets Manager implementation of the store contract.
pub struct SecretsManagerStore {
    api: Arc<dyn SecretsApi>,
    retention_days: i64,
    timeout: Duration,
}

impl std::fmt::Debug for SecretsManagerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsManagerStore")
            .field("retention_days", &self.retention_days)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SecretsManagerStore {
    /// Wrap an SDK client. `retention_days` controls deletion: `0` deletes
    /// immediately and irreversibly, anything else must fall within the
    /// 7-30 day recovery window the service accepts - out-of-range values
    /// fail here, not at the delete call. `timeout` bounds each network
    /// round trip.
    pub fn new(
        client: aws_sdk_secretsmanager::Client,
        retention_days: i64,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        Self::with_api(
            Arc::new(SecretsManagerClientApi { client }),
            retention_days,
            timeout,
        )
    }

    pub(crate) fn with_api(
        api: Arc<dyn SecretsApi>,
        retention_days: i64,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        if retention_days != 0 && !RETENTION_DAYS_RANGE.contains(&retention_days) {
            return Err(StoreError::Validation(format!(
                "post-deletion retention must be between {} and {} days, or 0 to delete \
                 immediately; got {retention_days}",
                RETENTION_DAYS_RANGE.start(),
                RETENTION_DAYS_RANGE.end(),
            )));
        }

        Ok(Self {
            api,
            retention_days,
            timeout,
        })
    }

    fn qualified(service: &Service, name: &str) -> String {
        format!("{}/{}", service.prefix(), name)
    }
}

#[async_trait]
impl Store for SecretsManagerStore {
    /// Fetches the most recent version. Binary-typed secrets are not
    /// supported and yield an empty value rather than an error.
    async fn get(&self, service: &Service, name: &str) -> Result<Parameter, StoreError> {
        let path = Self::qualified(service, name);
        let secret = round_trip(self.timeout, self.api.get_secret_value(&path))
            .await
            .map_err(|e| e.into_store_error("GetSecretValue", &path))?;

        Ok(Parameter {
            service: service.clone(),
            name: secret.name,
            value: secret.value.unwrap_or_default(),
            is_secret: true,
        })
    }

    /// The listing API returns metadata only, so each entry costs a second
    /// round trip to decrypt its current value. The first per-entry failure
    /// aborts the whole call; no partial results are surfaced.
    async fn list(&self, service: &Service) -> Result<Vec<Parameter>, StoreError> {
        let prefix = service.prefix();
        let mut items = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let page = round_trip(
                self.timeout,
                self.api.list_secrets(&prefix, next_token.as_deref()),
            )
            .await
            .map_err(|e| e.into_store_error("ListSecrets", &prefix))?;

            for entry in page.entries {
                // A listing never reports NotFound: an entry vanishing
                // between the metadata page and its value fetch (deleted
                // concurrently) is a backend failure of the scan, not a
                // missing item the caller addressed.
                let secret = round_trip(self.timeout, self.api.get_secret_value(&entry.id))
                    .await
                    .map_err(|e| StoreError::Transport {
                        operation: "GetSecretValue",
                        target: entry.name.clone(),
                        message: e.to_string(),
                    })?;
                items.push(Parameter {
                    service: service.clone(),
                    name: entry.name,
                    value: secret.value.unwrap_or_default(),
                    is_secret: true,
                });
            }

            match page.next_token {
                Some(token) => {
                    debug!(prefix = %prefix, "loading next page of secrets");
                    next_token = Some(token);
                }
                None => return Ok(items),
            }
        }
    }

    /// Idempotent upsert. Attempts a create tagged with a content-hash
    /// idempotency token and the identity triple; if and only if the
    /// service reports that the name already exists, falls back to
    /// appending a new version with the same token. Any other create
    /// failure surfaces unmodified with no fallback. This reacts to the
    /// authoritative existence conflict instead of racing a separate
    /// existence check.
    async fn set(
        &self,
        service: &Service,
        name: &str,
        value: &str,
        is_secret: bool,
    ) -> Result<(), StoreError> {
        if !is_secret {
            return Err(StoreError::Validation(
                "the secrets manager store only holds secrets; store plain config in the \
                 parameter store instead"
                    .to_string(),
            ));
        }

        let path = Self::qualified(service, name);
        let token = idempotency_token(value);

        match round_trip(
            self.timeout,
            self.api.create_secret(&path, value, &token, service),
        )
        .await
        {
            Ok(version) => {
                debug!(secret = %path, version = %version, "created new secret");
                Ok(())
            }
            Err(ApiError::AlreadyExists) => {
                debug!(secret = %path, "secret already exists, appending a new version");
                let version = round_trip(
                    self.timeout,
                    self.api.put_secret_value(&path, value, &token),
                )
                .await
                .map_err(|e| e.into_store_error("PutSecretValue", &path))?;
                debug!(secret = %path, version = %version, "stored new secret version");
                Ok(())
            }
            Err(other) => Err(other.into_store_error("CreateSecret", &path)),
        }
    }

    /// Issues an immediate irreversible deletion when the configured
    /// retention is zero, otherwise a scheduled deletion with that many
    /// days of recovery window.
    async fn delete(&self, service: &Service, name: &str) -> Result<(), StoreError> {
        let path = Self::qualified(service, name);
        let mode = if self.retention_days > 0 {
            DeletionMode::Recover {
                days: self.retention_days,
            }
        } else {
            DeletionMode::Force
        };

        round_trip(self.timeout, self.api.delete_secret(&path, mode))
            .await
            .map_err(|e| e.into_store_error("DeleteSecret", &path))?;
        debug!(secret = %path, ?mode, "requested secret deletion");
        Ok(())
    }
}
