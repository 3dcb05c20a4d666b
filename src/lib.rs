//! # service-config
//!
//! Store and retrieve per-application configuration and secrets, addressed by
//! a three-part service identity (stage, stack, app) and persisted in AWS.
//!
//! The crate is organised around a single store abstraction:
//!
//! - **Store contract** - a uniform get/list/set/delete trait that command
//!   handlers depend on, never on a concrete backend
//! - **Parameter Store backend** - hierarchical, path-addressed entries in
//!   AWS Systems Manager Parameter Store (plain and encrypted)
//! - **Secrets Manager backend** - version-chained secrets with idempotent
//!   upsert, decrypting paginated listing, and tiered deletion
//! - **Local config** - discovery and merging of the service identity from
//!   local files and command-line flags
//!
//! All persistence lives in the backing services; the crate holds no state
//! between invocations.

pub mod config;
pub mod store;
