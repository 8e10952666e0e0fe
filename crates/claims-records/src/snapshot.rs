use std::{
    borrow::Cow,
    fs,
    io::{ErrorKind, Write},
    path::Path,
};

use claims_core::{claims::Claim, users::User};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

pub const CLAIMS_FILE: &str = "claims_data.json";
pub const USERS_FILE: &str = "users_data.json";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot path has no parent directory")]
    InvalidPath,
}

/// Full claims collection plus the id counters that go with it.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimsSnapshot<'a> {
    pub claims: Cow<'a, [Claim]>,
    pub next_claim_id: u64,
    pub next_document_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersSnapshot<'a> {
    pub users: Cow<'a, [User]>,
    pub next_user_id: u64,
}

/// `Ok(None)` when the file does not exist yet.
pub fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SnapshotError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Replace `path` with the serialized snapshot via a sibling temp file and rename,
/// so readers see either the previous snapshot or the new one.
pub fn write_snapshot<T: Serialize>(path: &Path, snapshot: &T) -> Result<(), SnapshotError> {
    let parent = path.parent().ok_or(SnapshotError::InvalidPath)?;
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    let json = serde_json::to_vec_pretty(snapshot)?;
    tmp.write_all(&json)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
