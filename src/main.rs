use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bucket_credentials::config::{self, Settings};
use bucket_credentials::registry::{self, CredentialCatalog};
use bucket_credentials::{BucketCredential, CredentialParams, CredentialRecord};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = cli::Cli::parse();
    let settings = config::load().context("invalid configuration")?;

    match args.command {
        cli::Commands::Show { catalog } => show(&catalog),
        cli::Commands::Resolve { target, reveal } => resolve(target, reveal, settings).await,
    }
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing() {
    let json = std::env::var("BUCKET_CREDS_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "bucket_credentials=info".into()),
        ))
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn show(catalog: &Path) -> anyhow::Result<()> {
    let records = registry::read_catalog_file(catalog)?;
    if records.is_empty() {
        println!("No credentials in {}", catalog.display());
        return Ok(());
    }

    println!("{:<38} {:<8} {:<16} DISPLAY NAME", "ID", "SCOPE", "USERNAME");
    for record in records {
        println!(
            "{:<38} {:<8} {:<16} {}",
            record.id(),
            record.scope(),
            record.username().unwrap_or("-"),
            record.display_name()
        );
    }
    Ok(())
}

async fn resolve(target: cli::ResolveTarget, reveal: bool, settings: Settings) -> anyhow::Result<()> {
    let credential = match target.catalog {
        Some(path) => {
            let id = target.id.context("--id is required with --catalog")?;
            let catalog = CredentialCatalog::load_file(&path, settings)?;
            catalog
                .get(&id)
                .with_context(|| format!("no credential with id {id:?} in {}", path.display()))?
        }
        None => {
            let record = CredentialRecord::new(CredentialParams {
                scope: Some("GLOBAL".into()),
                id: target.id,
                region: target.region,
                bucket_name: target.bucket,
                bucket_path: target.path,
                username: target.username,
                description: None,
                kms_encryption_context_key: target.context_key,
                kms_secret_name: target.secret_name,
            })?;
            Arc::new(BucketCredential::connect(record, &settings)?)
        }
    };

    let password = credential
        .password()
        .await
        .with_context(|| format!("could not resolve {}", credential.display_name()))?;

    println!("credential: {}", credential.display_name());
    println!("username:   {}", credential.username().unwrap_or("-"));
    if reveal {
        println!("password:   {}", password.expose_secret());
    } else {
        println!("password:   {} ({} bytes)", password, password.len());
    }
    Ok(())
}
