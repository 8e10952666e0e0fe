mod claims;
mod cli;
mod config;
mod documents;
mod storage;
mod users;

use std::{fs, io::Read, path::Path};

use crate::cli::ConfigCommand;
use clap::Parser;
use claims_core::records::UserRepository;
use claims_storage::document_cipher::DocumentCipher;
use color_eyre::{eyre::bail, Result};
use storage::Paths;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    let paths = storage::resolve_paths(&config)?;
    match cli.command {
        cli::Command::Version => print_version(),
        cli::Command::Health => run_health_check(&paths).await?,
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
        cli::Command::User(cmd) => {
            let store = storage::open_records(&paths)?;
            users::handle(cmd, &store)?
        }
        cli::Command::Claim(cmd) => {
            let store = storage::open_records(&paths)?;
            let cipher = storage::open_cipher(&paths.key_file).await?;
            let policy = config.upload_policy();
            let ctx = claims::ClaimContext {
                store: &store,
                cipher: &cipher,
                uploads_dir: &paths.uploads_dir,
                policy: &policy,
            };
            claims::handle(cmd, &ctx)?
        }
        cli::Command::Document(cmd) => {
            let store = storage::open_records(&paths)?;
            let cipher = storage::open_cipher(&paths.key_file).await?;
            documents::handle(
                cmd,
                &store,
                &cipher,
                &paths.uploads_dir,
                &config.upload_policy(),
            )?
        }
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to keep stdout readable.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("claims {}", env!("CARGO_PKG_VERSION"));
}

/// Loads both snapshots and round-trips a probe through the document cipher.
async fn run_health_check(paths: &Paths) -> Result<()> {
    let store = storage::open_records(paths)?;
    println!("Records: ok ({} users)", store.get_all_users().len());

    let cipher = storage::open_cipher(&paths.key_file).await?;
    run_cipher_health(&cipher, &paths.uploads_dir)?;
    println!("Documents: ok (key {})", cipher.key_id());
    Ok(())
}

fn run_cipher_health(cipher: &DocumentCipher, uploads_dir: &Path) -> Result<()> {
    let payload = b"ok";
    let stored_name = cipher.encrypt(&payload[..], uploads_dir)?;
    let round_trip = read_back(cipher, uploads_dir, &stored_name);
    if let Err(err) = fs::remove_file(uploads_dir.join(&stored_name)) {
        warn!(%stored_name, "failed to remove health probe: {err}");
    }

    if round_trip? != payload {
        bail!("document round-trip failed");
    }
    Ok(())
}

fn read_back(cipher: &DocumentCipher, folder: &Path, stored_name: &str) -> Result<Vec<u8>> {
    let mut plaintext = Vec::new();
    cipher
        .decrypt(folder, stored_name)?
        .read_to_end(&mut plaintext)?;
    Ok(plaintext)
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
