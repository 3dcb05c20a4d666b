//! # svc-config CLI
//!
//! Command-line interface for per-service configuration and secrets.
//!
//! ## Usage
//!
//! ```bash
//! # Fetch one config item
//! svc-config get --stage TEST --stack my-stack --app my-app --name db.url
//!
//! # List everything for the service, one KEY=value line per item
//! svc-config list --stage TEST --stack my-stack --app my-app
//!
//! # Store a value (prompts whether it is a secret unless told)
//! svc-config set --name db.url --value postgres://localhost --plain
//!
//! # Store into Secrets Manager instead of Parameter Store
//! svc-config --backend secrets-manager set --name api-key --value hunter2 --secret
//!
//! # Remember the identity so the flags can be dropped
//! svc-config set-local-config --stage TEST --stack my-stack --app my-app
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dialoguer::{Confirm, Input};

use service_config::config::{self, PartialIdentity};
use service_config::store::aws::{create_sdk_config, ParameterStore, SecretsManagerStore};
use service_config::store::{Service, Store};

/// Per-service configuration and secrets, backed by AWS
#[derive(Parser)]
#[command(name = "svc-config", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Stage for your service (typically 'CODE' or 'PROD')
    #[arg(long, global = true)]
    stage: Option<String>,

    /// Stack for your service
    #[arg(long, global = true)]
    stack: Option<String>,

    /// App for your service
    #[arg(long, global = true)]
    app: Option<String>,

    /// Profile for AWS credentials (if running locally)
    #[arg(long, global = true)]
    profile: Option<String>,

    /// AWS region to operate in
    #[arg(long, global = true, default_value = "eu-west-1")]
    region: String,

    /// Which backing service holds the items
    #[arg(long, global = true, value_enum, default_value = "parameter-store")]
    backend: Backend,

    /// Days a deleted secret is recoverable for (0 deletes immediately;
    /// secrets-manager backend only)
    #[arg(long, global = true, default_value_t = 7)]
    retention_days: i64,

    /// Timeout in seconds applied to each network round trip
    #[arg(long, global = true, default_value_t = 10)]
    timeout_secs: u64,

    /// Enable debug logs
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// AWS Systems Manager Parameter Store (plain config and secrets)
    ParameterStore,
    /// AWS Secrets Manager (secrets only)
    SecretsManager,
}

#[derive(Subcommand)]
enum Commands {
    /// Get specific config for the service
    Get {
        /// Name of the config item to retrieve
        #[arg(long)]
        name: String,
    },
    /// List all config for the service
    List,
    /// Set specific config for the service
    Set {
        /// Name of the config item to set
        #[arg(long)]
        name: String,

        /// Value of the config item to set
        #[arg(long)]
        value: String,

        /// Mark the value as a secret without prompting
        #[arg(long, conflicts_with = "plain")]
        secret: bool,

        /// Mark the value as plain config without prompting
        #[arg(long)]
        plain: bool,
    },
    /// Delete specific config for the service
    Delete {
        /// Name of the config item to delete
        #[arg(long)]
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Write a local config file so the stage/stack/app flags can be
    /// dropped on later invocations
    SetLocalConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match &cli.command {
        Commands::Get { name } => {
            let service = resolve_service(&cli)?;
            let store = open_store(&cli).await?;
            let item = store.get(&service, name).await.with_context(|| {
                format!(
                    "unable to get '{}' for service '{}'",
                    name,
                    service.prefix()
                )
            })?;
            println!("{item}");
        }
        Commands::List => {
            let service = resolve_service(&cli)?;
            let store = open_store(&cli).await?;
            let items = store.list(&service).await.with_context(|| {
                format!("unable to list for service '{}'", service.prefix())
            })?;
            for item in items {
                println!("{item}");
            }
        }
        Commands::Set {
            name,
            value,
            secret,
            plain,
        } => {
            let service = resolve_service(&cli)?;
            let store = open_store(&cli).await?;
            let is_secret = if *secret {
                true
            } else if *plain {
                false
            } else {
                Confirm::new()
                    .with_prompt("Is this value a secret?")
                    .interact()?
            };

            store
                .set(&service, name, value, is_secret)
                .await
                .with_context(|| {
                    format!(
                        "unable to set '{}' for service '{}'",
                        name,
                        service.prefix()
                    )
                })?;
            println!("Set '{}' for service '{}'.", name, service.prefix());
        }
        Commands::Delete { name, yes } => {
            let service = resolve_service(&cli)?;

            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Are you sure you want to delete '{name}'?"))
                    .interact()?;
                if !confirmed {
                    println!("Config item '{name}' has not been deleted.");
                    return Ok(());
                }
            }

            let store = open_store(&cli).await?;
            store.delete(&service, name).await.with_context(|| {
                format!(
                    "unable to delete '{}' for service '{}'",
                    name,
                    service.prefix()
                )
            })?;
            println!("Deleted '{}' for service '{}'.", name, service.prefix());
        }
        Commands::SetLocalConfig => {
            let service = prompt_missing_identity(flag_identity(&cli))?;
            config::write_local(&service)
                .with_context(|| format!("unable to write {}", config::LOCAL_CONFIG_PATH))?;
            println!(
                "Wrote {} for service '{}'.",
                config::LOCAL_CONFIG_PATH,
                service.prefix()
            );
        }
    }

    Ok(())
}

fn init_tracing(debug: bool) {
    let default_directive = if debug {
        "service_config=debug,svc_config=debug"
    } else {
        "service_config=info,svc_config=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .init();
}

fn flag_identity(cli: &Cli) -> PartialIdentity {
    PartialIdentity {
        stage: cli.stage.clone(),
        stack: cli.stack.clone(),
        app: cli.app.clone(),
    }
}

/// Merge the identity flags with any local config file; flags win.
fn resolve_service(cli: &Cli) -> Result<Service> {
    Ok(config::resolve(flag_identity(cli))?)
}

/// Prompt for any identity field not supplied as a flag.
fn prompt_missing_identity(mut identity: PartialIdentity) -> Result<Service> {
    let filled = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.is_empty());

    if !filled(&identity.app) {
        identity.app = Some(Input::new().with_prompt("App").interact_text()?);
    }
    if !filled(&identity.stack) {
        identity.stack = Some(Input::new().with_prompt("Stack").interact_text()?);
    }
    if !filled(&identity.stage) {
        identity.stage = Some(Input::new().with_prompt("Stage").interact_text()?);
    }

    Ok(identity.into_service()?)
}

/// Build the backend selected on the command line. Both backends bound
/// every network round trip by the configured timeout.
async fn open_store(cli: &Cli) -> Result<Box<dyn Store>> {
    let sdk_config = create_sdk_config(&cli.region, cli.profile.as_deref()).await;
    let timeout = Duration::from_secs(cli.timeout_secs);

    match cli.backend {
        Backend::ParameterStore => Ok(Box::new(ParameterStore::new(
            aws_sdk_ssm::Client::new(&sdk_config),
            timeout,
        ))),
        Backend::SecretsManager => Ok(Box::new(SecretsManagerStore::new(
            aws_sdk_secretsmanager::Client::new(&sdk_config),
            cli.retention_days,
            timeout,
        )?)),
    }
}
