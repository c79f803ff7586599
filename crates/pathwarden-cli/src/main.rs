//! Pathwarden command-line front end
//!
//! Opens the configured database, builds the permission index and runs a
//! single operation, printing the outcome as JSON on stdout.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pathwarden_core::storage::{
    find_entity_by_path, insert_entity, insert_permission_record, list_roles, upsert_role,
};
use pathwarden_core::{
    CoreConfig, FilesystemEntity, FilesystemGateway, Grantee, LocalFilesystem, NormalizedPath,
    OpResult, Permission, PermissionIndex, PermissionRecord, PermissionSet, Principal, Role,
    SafeMutationOrchestrator, Storage,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "pathwarden", version, about = "Permission-aware filesystem operations")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, env = "PATHWARDEN_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    identity: Identity,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct Identity {
    /// User the operation runs as
    #[arg(long, global = true, default_value = "anonymous", env = "PATHWARDEN_USER")]
    user: String,

    /// Role held by the user (repeatable)
    #[arg(long = "role", global = true)]
    roles: Vec<String>,
}

impl Identity {
    fn principal(&self) -> Principal {
        Principal::with_roles(self.user.clone(), self.roles.iter().cloned())
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the effective permissions at a path
    Resolve {
        #[arg(value_parser = absolute_path)]
        path: NormalizedPath,
    },

    /// Recursively delete a path
    Delete {
        #[arg(value_parser = absolute_path)]
        path: NormalizedPath,

        /// Skip permission and sensitive-path checks
        #[arg(long)]
        ignore_permissions: bool,
    },

    /// Recursively move a path to a new location
    Move {
        #[arg(value_parser = absolute_path)]
        source: NormalizedPath,
        #[arg(value_parser = absolute_path)]
        destination: NormalizedPath,

        #[arg(long)]
        ignore_permissions: bool,
    },

    /// Recursively copy a path to a new location
    Copy {
        #[arg(value_parser = absolute_path)]
        source: NormalizedPath,
        #[arg(value_parser = absolute_path)]
        destination: NormalizedPath,

        #[arg(long)]
        ignore_permissions: bool,
    },

    /// Grant permissions on a path to a user or a role
    Grant {
        #[arg(value_parser = absolute_path)]
        path: NormalizedPath,

        #[arg(long = "to-user", conflicts_with = "to_role", required_unless_present = "to_role")]
        to_user: Option<String>,

        #[arg(long = "to-role")]
        to_role: Option<String>,

        /// Comma separated; an empty list records an explicit denial
        #[arg(long, value_delimiter = ',', num_args = 0..)]
        permissions: Vec<Permission>,
    },

    /// Create or update a role and its global permissions
    Role {
        role_id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, value_delimiter = ',', num_args = 0..)]
        permissions: Vec<Permission>,
    },
}

/// Accept relative paths by anchoring them at the working directory
fn absolute_path(raw: &str) -> std::result::Result<NormalizedPath, String> {
    let path = PathBuf::from(raw);
    let path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(|e| format!("cannot resolve {}: {}", raw, e))?
            .join(path)
    };
    NormalizedPath::from_path(&path).map_err(|e| e.to_string())
}

/// Exit status for an operation outcome
fn exit_status<T>(outcome: &OpResult<T>) -> u8 {
    match outcome {
        OpResult::Ok(_) => 0,
        OpResult::Error { .. } => 1,
        OpResult::NotFound => 2,
        OpResult::Rejected { .. } => 3,
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<CoreConfig> {
    match path {
        Some(path) => CoreConfig::load(path).context("Failed to load configuration"),
        None => {
            debug!("No configuration file given, using defaults");
            Ok(CoreConfig::default())
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_ref())?;
    let storage = Arc::new(
        Storage::from_path(config.resolved_database_path()).context("Failed to open database")?,
    );
    let principal = cli.identity.principal();

    match cli.command {
        Command::Resolve { path } => {
            let index = PermissionIndex::load(storage)?;
            let view = index.resolve(&path, &principal);
            print_json(&view)?;
            Ok(if view.is_some() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }

        Command::Grant {
            path,
            to_user,
            to_role,
            permissions,
        } => {
            let grantee = match (to_user, to_role) {
                (Some(user), _) => Grantee::User(user),
                (None, Some(role)) => Grantee::Role(role),
                (None, None) => bail!("either --to-user or --to-role is required"),
            };
            let record = grant(&storage, &path, grantee, permissions.into_iter().collect())?;
            print_json(&record)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Role {
            role_id,
            name,
            permissions,
        } => {
            let role = Role::new(
                role_id.clone(),
                name.unwrap_or(role_id),
                permissions.into_iter().collect(),
            );
            upsert_role(&*storage.connection()?, &role)?;
            info!(role_id = %role.role_id, "Role saved");
            print_json(&role)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Delete {
            path,
            ignore_permissions,
        } => {
            let orchestrator = orchestrator(&config, storage)?;
            let outcome = orchestrator.delete(&path, &principal, ignore_permissions);
            print_json(&outcome)?;
            Ok(ExitCode::from(exit_status(&outcome)))
        }

        Command::Move {
            source,
            destination,
            ignore_permissions,
        } => {
            let orchestrator = orchestrator(&config, storage)?;
            let outcome =
                orchestrator.move_entry(&source, &destination, &principal, ignore_permissions);
            print_json(&outcome)?;
            Ok(ExitCode::from(exit_status(&outcome)))
        }

        Command::Copy {
            source,
            destination,
            ignore_permissions,
        } => {
            let orchestrator = orchestrator(&config, storage)?;
            let outcome = orchestrator.copy(&source, &destination, &principal, ignore_permissions);
            print_json(&outcome)?;
            Ok(ExitCode::from(exit_status(&outcome)))
        }
    }
}

fn orchestrator(config: &CoreConfig, storage: Arc<Storage>) -> Result<SafeMutationOrchestrator> {
    let index = Arc::new(PermissionIndex::load(storage)?);
    Ok(SafeMutationOrchestrator::from_config(
        config,
        index,
        Arc::new(LocalFilesystem::new()),
    )?)
}

/// Record a grant, tracking the path as an entity first if needed
fn grant(
    storage: &Storage,
    path: &NormalizedPath,
    grantee: Grantee,
    permissions: PermissionSet,
) -> Result<PermissionRecord> {
    let conn = storage.connection()?;

    if let Grantee::Role(role_id) = &grantee {
        if !list_roles(&conn)?.iter().any(|r| &r.role_id == role_id) {
            bail!("unknown role {}; create it with `pathwarden role` first", role_id);
        }
    }

    let entity = match find_entity_by_path(&conn, path)? {
        Some(entity) => entity,
        None => {
            let mut entity = FilesystemEntity::new(path.clone());
            if let Ok(attributes) = LocalFilesystem::new().read_attributes(path) {
                if let Some(inode) = attributes.inode {
                    entity = entity.with_inode(inode);
                }
            }
            insert_entity(&conn, &entity)?;
            debug!(%path, entity_id = %entity.entity_id, "Tracking new entity");
            entity
        }
    };

    let record = PermissionRecord::new(&entity.entity_id, grantee, permissions);
    insert_permission_record(&conn, &record)?;
    info!(%path, permission_id = %record.permission_id, "Grant recorded");
    Ok(record)
}

fn main() -> ExitCode {
    // Logs go to stderr so stdout stays machine readable
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Pathwarden v{}", env!("CARGO_PKG_VERSION"));

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}
