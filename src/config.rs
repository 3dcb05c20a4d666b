//! # Local Config
//!
//! Resolves the service identity (stage, stack, app) from local files and
//! command-line flags.
//!
//! Discovery order: `./.service-config` in the working directory, then
//! `/etc/config/tags.json` (written by instance provisioning). The first
//! file that can be read is used; flag values win over file values per
//! field.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::Service;

/// Identity file written by `set-local-config` in the working directory.
pub const LOCAL_CONFIG_PATH: &str = ".service-config";

/// Identity file written by instance provisioning.
pub const INSTANCE_TAGS_PATH: &str = "/etc/config/tags.json";

/// Errors from identity resolution and the local config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in config file {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(
        "service identity incomplete (stage='{stage}', stack='{stack}', app='{app}'); \
         pass --stage, --stack and --app, or run set-local-config"
    )]
    Incomplete {
        stage: String,
        stack: String,
        app: String,
    },
}

/// A possibly incomplete service identity, as read from one source (flags
/// or a config file). Field names are capitalised on disk to match the
/// files written by provisioning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PartialIdentity {
    pub stage: Option<String>,
    pub stack: Option<String>,
    pub app: Option<String>,
}

impl PartialIdentity {
    /// Overlay `overrides` on top of `self`, field by field. Empty strings
    /// count as absent.
    pub fn merge(self, overrides: Self) -> Self {
        fn pick(base: Option<String>, over: Option<String>) -> Option<String> {
            match over {
                Some(value) if !value.is_empty() => Some(value),
                _ => base,
            }
        }

        Self {
            stage: pick(self.stage, overrides.stage),
            stack: pick(self.stack, overrides.stack),
            app: pick(self.app, overrides.app),
        }
    }

    /// Require all three fields, empty strings included in the failure
    /// report so the operator can see which sources were found.
    pub fn into_service(self) -> Result<Service, ConfigError> {
        let present = |field: Option<String>| field.filter(|value| !value.is_empty());

        match (present(self.stage), present(self.stack), present(self.app)) {
            (Some(stage), Some(stack), Some(app)) => Ok(Service { stage, stack, app }),
            (stage, stack, app) => Err(ConfigError::Incomplete {
                stage: stage.unwrap_or_default(),
                stack: stack.unwrap_or_default(),
                app: app.unwrap_or_default(),
            }),
        }
    }
}

/// The default file locations, in precedence order.
pub fn default_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from(LOCAL_CONFIG_PATH),
        PathBuf::from(INSTANCE_TAGS_PATH),
    ]
}

/// Read the first config file that exists. Unreadable files are skipped;
/// a readable but malformed file is an error rather than silently losing
/// the operator's identity.
pub fn load_first(paths: &[PathBuf]) -> Result<PartialIdentity, ConfigError> {
    for path in paths {
        let Ok(data) = fs::read(path) else {
            continue;
        };
        return serde_json::from_slice(&data).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        });
    }

    Ok(PartialIdentity::default())
}

/// Resolve the service identity from the default file locations merged
/// with flag values (flags win).
pub fn resolve(flags: PartialIdentity) -> Result<Service, ConfigError> {
    resolve_from(flags, &default_paths())
}

/// As [`resolve`], against an explicit list of candidate files.
pub fn resolve_from(flags: PartialIdentity, paths: &[PathBuf]) -> Result<Service, ConfigError> {
    let file = load_first(paths)?;
    file.merge(flags).into_service()
}

/// Write the identity to the local config file in the working directory.
pub fn write_local(service: &Service) -> Result<(), ConfigError> {
    write_to(Path::new(LOCAL_CONFIG_PATH), service)
}

/// As [`write_local`], to an explicit path.
pub fn write_to(path: &Path, service: &Service) -> Result<(), ConfigError> {
    let data = serde_json::to_vec(service).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, data).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
