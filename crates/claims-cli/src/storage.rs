use std::path::{Path, PathBuf};

use crate::{config::Config, users};
use claims_records::RecordStore;
use claims_storage::{document_cipher::DocumentCipher, key_provider::FileKeyProvider};
use color_eyre::Result;
use dirs::data_dir;
use tracing::debug;

const KEY_FILE: &str = "file_key.txt";
const UPLOADS_DIR: &str = "uploads";

/// Where snapshots, the key file and ciphertexts live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub data_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub key_file: PathBuf,
}

impl Paths {
    /// Default layout rooted at `data_dir`.
    pub fn rooted_at(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            uploads_dir: data_dir.join(UPLOADS_DIR),
            key_file: data_dir.join(KEY_FILE),
            data_dir,
        }
    }
}

/// Resolve the default data directory.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("claims"))
}

/// Apply config overrides on top of the default layout.
pub fn resolve_paths(config: &Config) -> Result<Paths> {
    let data_dir = match &config.data_dir {
        Some(dir) => dir.clone(),
        None => default_data_dir()?,
    };
    let mut paths = Paths::rooted_at(data_dir);
    if let Some(uploads) = &config.uploads_dir {
        paths.uploads_dir = uploads.clone();
    }
    if let Some(key_file) = &config.key_file {
        paths.key_file = key_file.clone();
    }
    Ok(paths)
}

/// Open the record store and make sure an HR account exists.
pub fn open_records(paths: &Paths) -> Result<RecordStore> {
    debug!(data_dir = ?paths.data_dir, "opening record store");
    let store = RecordStore::open(&paths.data_dir)?;
    users::seed_hr_user(&store);
    Ok(store)
}

/// Build the document cipher from the persisted key file.
pub async fn open_cipher(key_file: &Path) -> Result<DocumentCipher> {
    debug!(?key_file, "loading document key");
    let provider = FileKeyProvider::new(key_file);
    Ok(DocumentCipher::from_provider(&provider).await?)
}

/// Helper for tests to lay out every path under a temp dir.
#[cfg(test)]
pub fn test_paths(root: impl Into<PathBuf>) -> Paths {
    Paths::rooted_at(root)
}
