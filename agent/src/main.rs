// Copyright (c) 2026 AO.space. MIT License.
// See LICENSE for details.

//! # AO.space Agent
//!
//! Entry point for the `aospace-agent` binary. Parses CLI arguments,
//! initializes logging, opens the identity database and runs one identity
//! operation against it.
//!
//! The identity core is synchronous. Every call into it runs on tokio's
//! blocking pool so RSA generation and PBKDF2 never stall the runtime.

mod cli;
mod logging;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

use aospace_identity::config::{IdentityConfig, DID_METHOD, VERIFICATION_DID_METHOD};
use aospace_identity::crypto::CryptoError;
use aospace_identity::did::{BinderKey, Document};
use aospace_identity::storage::IdentityDb;
use aospace_identity::{DidLookup, DidRegistry};

use cli::{AccountArgs, AospaceAgentCli, Commands};
use logging::DEFAULT_DIRECTIVES;

/// Name of the sled database directory under `--data-dir`.
const DB_DIR: &str = "identity";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AospaceAgentCli::parse();
    logging::init_logging(DEFAULT_DIRECTIVES, cli.log_format.into());

    let config = IdentityConfig {
        rsa_bits: cli.rsa_bits,
        ..IdentityConfig::default()
    };

    match cli.command {
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::Init => init(&cli.data_dir),
        command => {
            let registry = open_registry(&cli.data_dir, &config)?;
            run(registry, &config, command).await
        }
    }
}

/// Creates the data directory and the database inside it.
fn init(data_dir: &Path) -> Result<()> {
    let db = open_db(data_dir)?;
    db.flush().context("failed to flush identity database")?;

    tracing::info!(data_dir = %data_dir.display(), records = db.record_count(), "data directory ready");
    println!("Agent initialized.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Records        : {}", db.record_count());
    Ok(())
}

fn open_db(data_dir: &Path) -> Result<IdentityDb> {
    let db_path = data_dir.join(DB_DIR);
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = IdentityDb::open(&db_path)
        .with_context(|| format!("failed to open identity database at {}", db_path.display()))?;
    tracing::debug!(path = %db_path.display(), "identity database opened");
    Ok(db)
}

fn open_registry(data_dir: &Path, config: &IdentityConfig) -> Result<DidRegistry> {
    Ok(DidRegistry::with_config(open_db(data_dir)?, config))
}

/// Runs `f` on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> aospace_identity::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("identity task panicked")?
        .map_err(anyhow::Error::from)
}

async fn run(registry: DidRegistry, config: &IdentityConfig, command: Commands) -> Result<()> {
    match command {
        Commands::Create(args) => {
            // Key generation overlaps with reading the client's keys.
            let warmup = start_pregeneration(&registry, config);

            let raw = tokio::fs::read(&args.binder_keys).await.with_context(|| {
                format!("failed to read binder keys from {}", args.binder_keys.display())
            })?;
            let external: Vec<BinderKey> = serde_json::from_slice(&raw)
                .with_context(|| format!("malformed binder keys in {}", args.binder_keys.display()))?;

            finish_pregeneration(warmup).await?;

            let ao_id = args.ao_id.clone();
            let issued = blocking(move || {
                registry.create_document(None, &args.ao_id, &args.password, &external)
            })
            .await
            .with_context(|| format!("failed to create document for aoId {}", ao_id))?;

            print_json(&IssuedOutput {
                ao_id: &ao_id,
                did: &issued.did,
                wrapped_password_key: hex::encode(&issued.wrapped_password_key),
                document: serde_json::from_slice(&issued.document)?,
            })
        }

        Commands::Show(args) => {
            let account = Account::try_from(args.account)?;
            let label = account.to_string();
            let bytes = blocking(move || registry.get_document(None, account.lookup()))
                .await
                .with_context(|| format!("no document for {}", label))?;
            let document = Document::from_slice(&bytes)?;
            println!("{}", document.to_json_pretty()?);
            Ok(())
        }

        Commands::RotatePassword(args) => {
            let ao_id = args.ao_id.clone();
            let wrapped = blocking(move || {
                registry.update_password_key(None, &args.ao_id, &args.old_password, &args.new_password)
            })
            .await
            .with_context(|| format!("failed to rotate password key of aoId {}", ao_id))?;

            tracing::info!(ao_id = %ao_id, "password key re-wrapped");
            println!("{}", hex::encode(wrapped));
            Ok(())
        }

        Commands::ResetPassword(args) => {
            let account = Account::try_from(args.account)?;
            let label = account.to_string();
            let new_password = args.new_password;
            finish_pregeneration(start_pregeneration(&registry, config)).await?;
            let issued = blocking(move || {
                let issued = registry.reset_password_verification_method(
                    None,
                    account.lookup(),
                    &new_password,
                )?;
                let ao_id = registry
                    .lookup_ao_id_by_did(None, &issued.did)?
                    .unwrap_or_default();
                Ok((ao_id, issued))
            })
            .await
            .with_context(|| format!("failed to reset password credential of {}", label))?;

            let (ao_id, issued) = issued;
            print_json(&IssuedOutput {
                ao_id: &ao_id,
                did: &issued.did,
                wrapped_password_key: hex::encode(&issued.wrapped_password_key),
                document: serde_json::from_slice(&issued.document)?,
            })
        }

        Commands::Lookup(args) => {
            let account = Account::try_from(args.account)?;
            let label = account.to_string();
            let pair = blocking(move || match &account {
                Account::AoId(ao_id) => Ok(registry
                    .lookup_did_by_ao_id(None, ao_id)?
                    .map(|did| (ao_id.clone(), did))),
                Account::Did(did) => Ok(registry
                    .lookup_ao_id_by_did(None, did)?
                    .map(|ao_id| (ao_id, did.clone()))),
            })
            .await?;

            let (ao_id, did) = pair.ok_or_else(|| anyhow!("{} is not indexed", label))?;
            println!("{}\t{}", ao_id, did);
            Ok(())
        }

        Commands::List => {
            let accounts = blocking(move || registry.list_accounts()).await?;
            for (ao_id, did) in &accounts {
                println!("{}\t{}", ao_id, did);
            }
            tracing::debug!(count = accounts.len(), "accounts listed");
            Ok(())
        }

        other => Err(anyhow!("{:?} does not run against the registry", other)),
    }
}

/// Fills the key pool on the blocking pool when enabled.
fn start_pregeneration(
    registry: &DidRegistry,
    config: &IdentityConfig,
) -> Option<JoinHandle<Result<(), CryptoError>>> {
    config.pregenerate.then(|| {
        let pool = Arc::clone(registry.custody().pool());
        tokio::task::spawn_blocking(move || pool.pregenerate())
    })
}

/// Waits for pre-generation. A failure only costs latency: custody
/// generates on demand when the pool is empty.
async fn finish_pregeneration(
    warmup: Option<JoinHandle<Result<(), CryptoError>>>,
) -> Result<()> {
    if let Some(warmup) = warmup {
        if let Err(e) = warmup.await.context("key pre-generation panicked")? {
            tracing::warn!(error = %e, "key pre-generation failed, generating on demand");
        }
    }
    Ok(())
}

/// An account selector with owned strings, movable onto the blocking pool.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Account {
    AoId(String),
    Did(String),
}

impl Account {
    fn lookup(&self) -> DidLookup<'_> {
        match self {
            Account::AoId(ao_id) => DidLookup::AoId(ao_id),
            Account::Did(did) => DidLookup::Did(did),
        }
    }
}

impl TryFrom<AccountArgs> for Account {
    type Error = anyhow::Error;

    fn try_from(args: AccountArgs) -> Result<Self> {
        match (args.ao_id, args.did) {
            (Some(ao_id), None) => Ok(Account::AoId(ao_id)),
            (None, Some(did)) => Ok(Account::Did(did)),
            _ => Err(anyhow!("pass exactly one of --ao-id or --did")),
        }
    }
}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Account::AoId(ao_id) => write!(f, "aoId {}", ao_id),
            Account::Did(did) => f.write_str(did),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IssuedOutput<'a> {
    ao_id: &'a str,
    did: &'a str,
    wrapped_password_key: String,
    document: serde_json::Value,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("aospace-agent {}", env!("CARGO_PKG_VERSION"));
    println!("did method    did:{} / did:{}", DID_METHOD, VERIFICATION_DID_METHOD);
    println!("rustc         {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
