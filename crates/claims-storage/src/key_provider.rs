use std::{
    fmt,
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::{debug, info, instrument};

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;

const FIELD_DELIMITER: char = ':';

/// Key material used for document encryption at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Non-secret identifier for logging (never log key bytes).
    pub id: String,
    /// 256-bit symmetric key.
    pub key: [u8; KEY_LEN],
    /// Deployment-wide initialization vector persisted next to the key.
    pub iv: [u8; IV_LEN],
}

impl KeyMaterial {
    pub fn new(key: [u8; KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        let encoded_iv = general_purpose::URL_SAFE_NO_PAD.encode(iv);
        Self {
            id: format!("file-key-{}", &encoded_iv[..8]),
            key,
            iv,
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .field("key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("key file io error at {path}: {reason}")]
    Io { path: PathBuf, reason: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

/// Provides the process-wide document key (key file in production; memory in tests).
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyStoreError>;
}

/// Key file provider. The file holds `base64(key):base64(iv)` and is written at
/// most once; later opens reuse it.
#[derive(Debug, Clone)]
pub struct FileKeyProvider {
    path: PathBuf,
}

impl FileKeyProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KeyProvider for FileKeyProvider {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyStoreError> {
        // File operations are small and synchronous; wrap in async for trait compatibility.
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }

        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let material = decode_key_file(&contents)?;
                debug!(key_id = %material.id, "loaded existing key file");
                return Ok(material);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(&self.path, err)),
        }

        let material = generate_key();
        match write_key_file(&self.path, &material) {
            Ok(()) => {
                info!(key_id = %material.id, "generated new document key");
                Ok(material)
            }
            // Another opener created the file between our read and write.
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let contents =
                    fs::read_to_string(&self.path).map_err(|e| io_err(&self.path, e))?;
                decode_key_file(&contents)
            }
            Err(err) => Err(io_err(&self.path, err)),
        }
    }
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<KeyMaterial>>>,
}

#[async_trait]
impl KeyProvider for InMemoryKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyStoreError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyStoreError::Generation(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let material = generate_key();
        *guard = Some(material.clone());
        Ok(material)
    }
}

fn generate_key() -> KeyMaterial {
    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut key);
    OsRng.fill_bytes(&mut iv);
    KeyMaterial::new(key, iv)
}

fn encode_key_file(material: &KeyMaterial) -> String {
    format!(
        "{}{}{}",
        general_purpose::STANDARD.encode(material.key),
        FIELD_DELIMITER,
        general_purpose::STANDARD.encode(material.iv)
    )
}

fn decode_key_file(contents: &str) -> Result<KeyMaterial, KeyStoreError> {
    let (key, iv) = contents
        .trim()
        .split_once(FIELD_DELIMITER)
        .ok_or_else(|| KeyStoreError::Decode("missing key/iv delimiter".to_string()))?;

    let key = decode_field::<KEY_LEN>("key", key)?;
    let iv = decode_field::<IV_LEN>("iv", iv)?;
    Ok(KeyMaterial::new(key, iv))
}

fn decode_field<const N: usize>(label: &str, field: &str) -> Result<[u8; N], KeyStoreError> {
    let bytes = general_purpose::STANDARD
        .decode(field)
        .map_err(|e| KeyStoreError::Decode(format!("{label}: {e}")))?;

    bytes.try_into().map_err(|bytes: Vec<u8>| {
        KeyStoreError::Decode(format!(
            "{label}: expected {N} bytes, got {}",
            bytes.len()
        ))
    })
}

fn write_key_file(path: &Path, material: &KeyMaterial) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(encode_key_file(material).as_bytes())?;
    file.sync_all()
}

fn io_err(path: &Path, err: std::io::Error) -> KeyStoreError {
    KeyStoreError::Io {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_provider_returns_same_key() {
        let provider = InMemoryKeyProvider::default();
        let first = provider.get_or_create().await.unwrap();
        let second = provider.get_or_create().await.unwrap();

        assert_eq!(first.key, second.key);
        assert_eq!(first.iv, second.iv);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn file_provider_creates_key_once_and_reuses_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("App_Data").join("file_key.txt");

        let first = FileKeyProvider::new(&path).get_or_create().await.expect("create");
        let on_disk = fs::read_to_string(&path).expect("key file written");
        assert_eq!(on_disk.matches(':').count(), 1);

        let second = FileKeyProvider::new(&path).get_or_create().await.expect("reload");
        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(&path).expect("reread"), on_disk);
    }

    #[tokio::test]
    async fn file_provider_reads_existing_material() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("file_key.txt");
        let material = KeyMaterial::new([7u8; KEY_LEN], [9u8; IV_LEN]);
        fs::write(&path, format!("{}\n", encode_key_file(&material))).expect("seed key file");

        let loaded = FileKeyProvider::new(&path).get_or_create().await.expect("load");
        assert_eq!(loaded, material);
    }

    #[tokio::test]
    async fn file_provider_rejects_malformed_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("file_key.txt");
        fs::write(&path, "not-a-key-file").expect("seed");

        let err = FileKeyProvider::new(&path)
            .get_or_create()
            .await
            .expect_err("should reject");
        assert!(matches!(err, KeyStoreError::Decode(_)));
    }

    #[tokio::test]
    async fn file_provider_surfaces_unusable_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file, not dir").expect("seed");

        let err = FileKeyProvider::new(blocker.join("file_key.txt"))
            .get_or_create()
            .await
            .expect_err("parent is a file");
        assert!(matches!(err, KeyStoreError::Io { .. }));
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let err = decode_key_file("abcd:abcd").expect_err("should reject wrong length");
        assert!(matches!(err, KeyStoreError::Decode(_)));
    }

    #[test]
    fn debug_never_prints_key_bytes() {
        let material = KeyMaterial::new([0xAB; KEY_LEN], [1u8; IV_LEN]);
        let rendered = format!("{material:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("171"));
    }
}
