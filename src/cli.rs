use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// bucketcred: passwords stored in S3, unlocked with KMS
#[derive(Parser)]
#[command(name = "bucketcred", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the credentials in a catalog file
    Show {
        #[arg(long, env = "BUCKET_CREDS_CATALOG")]
        catalog: PathBuf,
    },

    /// Fetch and decrypt a password
    Resolve {
        #[command(flatten)]
        target: ResolveTarget,

        /// Print the plaintext instead of [REDACTED]
        #[arg(long)]
        reveal: bool,
    },
}

#[derive(Args)]
pub struct ResolveTarget {
    /// Catalog file to look the credential up in
    #[arg(long, requires = "id", conflicts_with_all = ["region", "bucket", "path"])]
    pub catalog: Option<PathBuf>,

    /// Credential id within the catalog
    #[arg(long)]
    pub id: Option<String>,

    #[arg(long, required_unless_present = "catalog")]
    pub region: Option<String>,

    #[arg(long, required_unless_present = "catalog")]
    pub bucket: Option<String>,

    #[arg(long, required_unless_present = "catalog")]
    pub path: Option<String>,

    #[arg(long)]
    pub username: Option<String>,

    /// Encryption context key (used only together with --secret-name)
    #[arg(long)]
    pub context_key: Option<String>,

    /// Encryption context value
    #[arg(long)]
    pub secret_name: Option<String>,
}
