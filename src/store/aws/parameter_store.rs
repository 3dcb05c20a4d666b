//! # Parameter Store Backend
//!
//! Implements the store contract against AWS Systems Manager Parameter
//! Store. Entries live under the service's namespace prefix; plain values
//! are stored as `String` and secrets as `SecureString`, so every read
//! requests decryption.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_ssm::types::ParameterType;
use tracing::debug;

use super::{round_trip, ApiError};
use crate::store::{Parameter, Service, Store, StoreError};

/// One entry as reported by the backing service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawParameter {
    pub(crate) name: String,
    pub(crate) value: String,
    pub(crate) secure: bool,
}

/// One page of a prefix-scoped scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParameterPage {
    pub(crate) parameters: Vec<RawParameter>,
    pub(crate) next_token: Option<String>,
}

/// The slice of the Parameter Store API this backend needs. The real
/// implementation wraps the SDK client; tests substitute a recording mock.
#[async_trait]
pub(crate) trait SsmApi: Send + Sync {
    async fn get_parameter(&self, name: &str) -> Result<RawParameter, ApiError>;
    async fn get_parameters_by_path(
        &self,
        path: &str,
        next_token: Option<&str>,
    ) -> Result<ParameterPage, ApiError>;
    async fn put_parameter(&self, name: &str, value: &str, secure: bool) -> Result<(), ApiError>;
    async fn delete_parameter(&self, name: &str) -> Result<(), ApiError>;
}

struct SsmClientApi {
    client: aws_sdk_ssm::Client,
}

#[async_trait]
impl SsmApi for SsmClientApi {
    async fn get_parameter(&self, name: &str) -> Result<RawParameter, ApiError> {
        let output = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|err| match err.into_service_error() {
                e if e.is_parameter_not_found() => ApiError::NotFound,
                e => ApiError::Other(e.to_string()),
            })?;

        let parameter = output
            .parameter
            .ok_or_else(|| ApiError::Other("response carried no parameter".to_string()))?;
        Ok(RawParameter {
            name: parameter.name.unwrap_or_else(|| name.to_string()),
            value: parameter.value.unwrap_or_default(),
            secure: parameter.r#type == Some(ParameterType::SecureString),
        })
    }

    async fn get_parameters_by_path(
        &self,
        path: &str,
        next_token: Option<&str>,
    ) -> Result<ParameterPage, ApiError> {
        let mut request = self
            .client
            .get_parameters_by_path()
            .path(path)
            .with_decryption(true);
        if let Some(token) = next_token {
            request = request.next_token(token);
        }

        let output = request
            .send()
            .await
            .map_err(|err| ApiError::Other(err.into_service_error().to_string()))?;

        let parameters = output
            .parameters
            .unwrap_or_default()
            .into_iter()
            .map(|parameter| RawParameter {
                name: parameter.name.unwrap_or_default(),
                value: parameter.value.unwrap_or_default(),
                secure: parameter.r#type == Some(ParameterType::SecureString),
            })
            .collect();
        Ok(ParameterPage {
            parameters,
            next_token: output.next_token,
        })
    }

    async fn put_parameter(&self, name: &str, value: &str, secure: bool) -> Result<(), ApiError> {
        let parameter_type = if secure {
            ParameterType::SecureString
        } else {
            ParameterType::String
        };

        self.client
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(parameter_type)
            .overwrite(true)
            .send()
            .await
            .map_err(|err| ApiError::Other(err.into_service_error().to_string()))?;
        Ok(())
    }

    async fn delete_parameter(&self, name: &str) -> Result<(), ApiError> {
        self.client
            .delete_parameter()
            .name(name)
            .send()
            .await
            .map_err(|err| match err.into_service_error() {
                e if e.is_parameter_not_found() => ApiError::NotFound,
                e => ApiError::Other(e.to_string()),
            })?;
        Ok(())
    }
}

/// Parameter Store implementation of the store contract.
pub struct ParameterStore {
    api: Arc<dyn SsmApi>,
    timeout: Duration,
}

impl std::fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ParameterStore {
    /// Wrap an SDK client. `timeout` bounds each network round trip.
    pub fn new(client: aws_sdk_ssm::Client, timeout: Duration) -> Self {
        Self::with_api(Arc::new(SsmClientApi { client }), timeout)
    }

    pub(crate) fn with_api(api: Arc<dyn SsmApi>, timeout: Duration) -> Self {
        Self { api, timeout }
    }

    fn qualified(service: &Service, name: &str) -> String {
        format!("{}/{}", service.prefix(), name)
    }
}

#[async_trait]
impl Store for ParameterStore {
    async fn get(&self, service: &Service, name: &str) -> Result<Parameter, StoreError> {
        let path = Self::qualified(service, name);
        let raw = round_trip(self.timeout, self.api.get_parameter(&path))
            .await
            .map_err(|e| e.into_store_error("GetParameter", &path))?;

        Ok(Parameter {
            service: service.clone(),
            name: raw.name,
            value: raw.value,
            is_secret: raw.secure,
        })
    }

    /// Scans the namespace prefix page by page. A mid-scan failure returns
    /// only the error; no partial results are surfaced.
    async fn list(&self, service: &Service) -> Result<Vec<Parameter>, StoreError> {
        let prefix = service.prefix();
        let mut items = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let page = round_trip(
                self.timeout,
                self.api.get_parameters_by_path(&prefix, next_token.as_deref()),
            )
            .await
            .map_err(|e| e.into_store_error("GetParametersByPath", &prefix))?;

            items.extend(page.parameters.into_iter().map(|raw| Parameter {
                service: service.clone(),
                name: raw.name,
                value: raw.value,
                is_secret: raw.secure,
            }));

            match page.next_token {
                Some(token) => {
                    debug!(prefix = %prefix, "fetching next page of parameters");
                    next_token = Some(token);
                }
                None => return Ok(items),
            }
        }
    }

    /// Upsert at the backend level already - no prior-existence check.
    async fn set(
        &self,
        service: &Service,
        name: &str,
        value: &str,
        is_secret: bool,
    ) -> Result<(), StoreError> {
        let path = Self::qualified(service, name);
        round_trip(self.timeout, self.api.put_parameter(&path, value, is_secret))
            .await
            .map_err(|e| e.into_store_error("PutParameter", &path))?;
        debug!(parameter = %path, secure = is_secret, "stored parameter");
        Ok(())
    }

    async fn delete(&self, service: &Service, name: &str) -> Result<(), StoreError> {
        let path = Self::qualified(service, name);
        round_trip(self.timeout, self.api.delete_parameter(&path))
            .await
            .map_err(|e| e.into_store_error("DeleteParameter", &path))?;
        debug!(parameter = %path, "deleted parameter");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    fn test_service() -> Service {
        Service {
            stage: "TEST".to_string(),
            stack: "my-stack".to_string(),
            app: "my-app".to_string(),
        }
    }

    #[derive(Default)]
    struct MockSsmApi {
        parameters: HashMap<String, RawParameter>,
        pages: Vec<ParameterPage>,
        page_error: Option<(usize, ApiError)>,
        get_calls: Mutex<Vec<String>>,
        list_calls: Mutex<Vec<Option<String>>>,
        put_calls: Mutex<Vec<(String, String, bool)>>,
        delete_calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SsmApi for MockSsmApi {
        async fn get_parameter(&self, name: &str) -> Result<RawParameter, ApiError> {
            self.get_calls.lock().unwrap().push(name.to_string());
            self.parameters.get(name).cloned().ok_or(ApiError::NotFound)
        }

        async fn get_parameters_by_path(
            &self,
            _path: &str,
            next_token: Option<&str>,
        ) -> Result<ParameterPage, ApiError> {
            let mut calls = self.list_calls.lock().unwrap();
            calls.push(next_token.map(str::to_string));
            let index = calls.len() - 1;
            if let Some((failing_index, error)) = &self.page_error {
                if index == *failing_index {
                    return Err(error.clone());
                }
            }
            Ok(self.pages[index].clone())
        }

        async fn put_parameter(
            &self,
            name: &str,
            value: &str,
            secure: bool,
        ) -> Result<(), ApiError> {
            self.put_calls
                .lock()
                .unwrap()
                .push((name.to_string(), value.to_string(), secure));
            Ok(())
        }

        async fn delete_parameter(&self, name: &str) -> Result<(), ApiError> {
            self.delete_calls.lock().unwrap().push(name.to_string());
            if self.parameters.contains_key(name) {
                Ok(())
            } else {
                Err(ApiError::NotFound)
            }
        }
    }

    fn store_with(api: MockSsmApi) -> (Arc<MockSsmApi>, ParameterStore) {
        let api = Arc::new(api);
        let store = ParameterStore::with_api(Arc::clone(&api) as Arc<dyn SsmApi>, Duration::from_secs(5));
        (api, store)
    }

    #[tokio::test]
    async fn get_fetches_the_fully_qualified_path() {
        let mut parameters = HashMap::new();
        parameters.insert(
            "/TEST/my-stack/my-app/db.url".to_string(),
            RawParameter {
                name: "/TEST/my-stack/my-app/db.url".to_string(),
                value: "postgres://localhost".to_string(),
                secure: true,
            },
        );
        let (api, store) = store_with(MockSsmApi {
            parameters,
            ..MockSsmApi::default()
        });

        let item = store.get(&test_service(), "db.url").await.unwrap();

        assert_eq!(
            api.get_calls.lock().unwrap().as_slice(),
            ["/TEST/my-stack/my-app/db.url"]
        );
        assert_eq!(item.name, "/TEST/my-stack/my-app/db.url");
        assert_eq!(item.value, "postgres://localhost");
        assert!(item.is_secret);
        assert_eq!(item.service, test_service());
    }

    #[tokio::test]
    async fn get_of_a_missing_parameter_is_not_found() {
        let (_, store) = store_with(MockSsmApi::default());

        let err = store.get(&test_service(), "absent").await.unwrap_err();
        match err {
            StoreError::NotFound { name } => {
                assert_eq!(name, "/TEST/my-stack/my-app/absent");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_drains_every_page_in_order() {
        let raw = |n: &str, secure| RawParameter {
            name: format!("/TEST/my-stack/my-app/{n}"),
            value: format!("{n}-value"),
            secure,
        };
        let (api, store) = store_with(MockSsmApi {
            pages: vec![
                ParameterPage {
                    parameters: vec![raw("first", false), raw("second", true)],
                    next_token: Some("token-1".to_string()),
                },
                ParameterPage {
                    parameters: vec![raw("third", false)],
                    next_token: None,
                },
            ],
            ..MockSsmApi::default()
        });

        let items = store.list(&test_service()).await.unwrap();

        assert_eq!(
            api.list_calls.lock().unwrap().as_slice(),
            [None, Some("token-1".to_string())]
        );
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "/TEST/my-stack/my-app/first",
                "/TEST/my-stack/my-app/second",
                "/TEST/my-stack/my-app/third"
            ]
        );
        assert!(!items[0].is_secret);
        assert!(items[1].is_secret);
    }

    #[tokio::test]
    async fn list_aborts_on_a_mid_scan_failure() {
        let (api, store) = store_with(MockSsmApi {
            pages: vec![ParameterPage {
                parameters: vec![RawParameter {
                    name: "/TEST/my-stack/my-app/first".to_string(),
                    value: "v".to_string(),
                    secure: false,
                }],
                next_token: Some("token-1".to_string()),
            }],
            page_error: Some((1, ApiError::Other("throttled".to_string()))),
            ..MockSsmApi::default()
        });

        let err = store.list(&test_service()).await.unwrap_err();

        assert_eq!(api.list_calls.lock().unwrap().len(), 2);
        match err {
            StoreError::Transport { operation, .. } => {
                assert_eq!(operation, "GetParametersByPath");
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn set_tags_the_entry_type_from_the_secret_flag() {
        let (api, store) = store_with(MockSsmApi::default());

        store
            .set(&test_service(), "plain-one", "v1", false)
            .await
            .unwrap();
        store
            .set(&test_service(), "secret-one", "v2", true)
            .await
            .unwrap();

        assert_eq!(
            api.put_calls.lock().unwrap().as_slice(),
            [
                (
                    "/TEST/my-stack/my-app/plain-one".to_string(),
                    "v1".to_string(),
                    false
                ),
                (
                    "/TEST/my-stack/my-app/secret-one".to_string(),
                    "v2".to_string(),
                    true
                ),
            ]
        );
    }

    #[tokio::test]
    async fn delete_targets_the_fully_qualified_path() {
        let mut parameters = HashMap::new();
        parameters.insert(
            "/TEST/my-stack/my-app/doomed".to_string(),
            RawParameter {
                name: "/TEST/my-stack/my-app/doomed".to_string(),
                value: "v".to_string(),
                secure: false,
            },
        );
        let (api, store) = store_with(MockSsmApi {
            parameters,
            ..MockSsmApi::default()
        });

        store.delete(&test_service(), "doomed").await.unwrap();
        assert_eq!(
            api.delete_calls.lock().unwrap().as_slice(),
            ["/TEST/my-stack/my-app/doomed"]
        );

        let err = store.delete(&test_service(), "absent").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
