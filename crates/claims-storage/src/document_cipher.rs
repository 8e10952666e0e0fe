//! At-rest encryption for uploaded supporting documents.
//!
//! Ciphertext layout:
//! ```text
//! [4 bytes: "CLV1"][8 bytes: random per-file nonce prefix]
//! [chunk 0: ciphertext || 16-byte tag] ... [chunk n: ciphertext || 16-byte tag]
//! nonce(i) = prefix || i (u32, big-endian)
//! AAD(i)   = final-chunk flag (1 byte) || deployment IV (16 bytes)
//! ```
//!
//! Every chunk except the last carries exactly `CHUNK_SIZE` plaintext bytes. The
//! final-chunk flag makes truncation at a chunk boundary detectable, and the
//! deployment IV ties a blob to the key file it was written under.
//!
//! Decryption buffers the whole plaintext in memory. Uploads are capped at 5 MiB
//! by the caller; revisit before accepting larger files.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Cursor, ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::key_provider::{KeyMaterial, KeyProvider, KeyStoreError, IV_LEN};

const MAGIC: &[u8; 4] = b"CLV1";
const NONCE_PREFIX_LEN: usize = 8;
const HEADER_LEN: usize = MAGIC.len() + NONCE_PREFIX_LEN;
const TAG_LEN: usize = 16;

/// Plaintext bytes per sealed chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;
const SEALED_CHUNK_SIZE: usize = CHUNK_SIZE + TAG_LEN;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
    #[error("encrypted file missing: {path}")]
    NotFound { path: PathBuf },
    #[error("invalid stored name: {name:?}")]
    InvalidName { name: String },
    #[error("io failure: {0}")]
    Io(String),
    #[error("crypto failure: {0}")]
    Crypto(String),
}

/// Encrypts document streams into a folder and decrypts them back by stored name.
/// Holds the process-wide key; callers never pass key material per call.
pub struct DocumentCipher {
    cipher: Aes256Gcm,
    iv: [u8; IV_LEN],
    key_id: String,
}

impl DocumentCipher {
    pub fn new(material: &KeyMaterial) -> Result<Self, CipherError> {
        let cipher = Aes256Gcm::new_from_slice(&material.key)
            .map_err(|e| CipherError::Crypto(format!("cipher init failed: {e}")))?;
        Ok(Self {
            cipher,
            iv: material.iv,
            key_id: material.id.clone(),
        })
    }

    /// Fetch the key material once and build the cipher around it.
    pub async fn from_provider<P: KeyProvider + ?Sized>(provider: &P) -> Result<Self, CipherError> {
        let material = provider.get_or_create().await?;
        Self::new(&material)
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Stream `plaintext` into a new ciphertext file under `folder` and return its
    /// generated stored name. Never overwrites an existing file.
    #[instrument(skip(self, plaintext), fields(folder = %folder.display(), key_id = %self.key_id))]
    pub fn encrypt<R: Read>(&self, plaintext: R, folder: &Path) -> Result<String, CipherError> {
        fs::create_dir_all(folder).map_err(io_err)?;

        let stored_name = format!("{}.bin", Uuid::new_v4().simple());
        let path = folder.join(&stored_name);
        let file = create_exclusive(&path)?;

        match self.write_sealed(plaintext, file) {
            Ok(written) => {
                debug!(%stored_name, written, "document encrypted");
                Ok(stored_name)
            }
            Err(err) => {
                if let Err(cleanup) = fs::remove_file(&path) {
                    warn!(path = %path.display(), "failed to remove partial ciphertext: {cleanup}");
                }
                Err(err)
            }
        }
    }

    /// Decrypt `stored_name` from `folder` into memory, returning a reader at offset 0.
    #[instrument(skip(self), fields(folder = %folder.display(), key_id = %self.key_id))]
    pub fn decrypt(&self, folder: &Path, stored_name: &str) -> Result<Cursor<Vec<u8>>, CipherError> {
        validate_stored_name(stored_name)?;
        let path = folder.join(stored_name);

        let mut file = File::open(&path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                CipherError::NotFound { path: path.clone() }
            } else {
                io_err(err)
            }
        })?;
        let mut sealed = Vec::new();
        file.read_to_end(&mut sealed).map_err(io_err)?;

        let plaintext = self.open_sealed(&sealed)?;
        debug!(stored_name, bytes = plaintext.len(), "document decrypted");
        Ok(Cursor::new(plaintext))
    }

    fn write_sealed<R: Read>(&self, mut plaintext: R, file: File) -> Result<u64, CipherError> {
        let mut prefix = [0u8; NONCE_PREFIX_LEN];
        OsRng.fill_bytes(&mut prefix);

        let mut out = BufWriter::new(file);
        out.write_all(MAGIC).map_err(io_err)?;
        out.write_all(&prefix).map_err(io_err)?;

        let mut current = vec![0u8; CHUNK_SIZE];
        let mut next = vec![0u8; CHUNK_SIZE];
        let mut current_len = read_full(&mut plaintext, &mut current).map_err(io_err)?;
        let mut index: u32 = 0;
        let mut written: u64 = 0;

        loop {
            // A short read means EOF, so only a full chunk needs a look-ahead.
            let next_len = if current_len == CHUNK_SIZE {
                read_full(&mut plaintext, &mut next).map_err(io_err)?
            } else {
                0
            };
            let last = next_len == 0;

            let sealed = self.seal(&prefix, index, last, &current[..current_len])?;
            out.write_all(&sealed).map_err(io_err)?;
            written += current_len as u64;

            if last {
                break;
            }
            std::mem::swap(&mut current, &mut next);
            current_len = next_len;
            index = index
                .checked_add(1)
                .ok_or_else(|| CipherError::Crypto("document too large".to_string()))?;
        }

        let file = out.into_inner().map_err(|e| io_err(e.into_error()))?;
        file.sync_all().map_err(io_err)?;
        Ok(written)
    }

    fn open_sealed(&self, sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
        if sealed.len() < HEADER_LEN + TAG_LEN || &sealed[..MAGIC.len()] != MAGIC {
            return Err(CipherError::Crypto(
                "unrecognised or truncated ciphertext header".to_string(),
            ));
        }

        let (header, body) = sealed.split_at(HEADER_LEN);
        let mut prefix = [0u8; NONCE_PREFIX_LEN];
        prefix.copy_from_slice(&header[MAGIC.len()..]);

        let chunk_count = body.len().div_ceil(SEALED_CHUNK_SIZE);
        let mut plaintext = Vec::with_capacity(body.len());
        for (i, chunk) in body.chunks(SEALED_CHUNK_SIZE).enumerate() {
            let index = u32::try_from(i)
                .map_err(|_| CipherError::Crypto("too many chunks".to_string()))?;
            let last = i + 1 == chunk_count;
            plaintext.extend_from_slice(&self.open(&prefix, index, last, chunk)?);
        }
        Ok(plaintext)
    }

    fn seal(
        &self,
        prefix: &[u8; NONCE_PREFIX_LEN],
        index: u32,
        last: bool,
        chunk: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        let nonce = chunk_nonce(prefix, index);
        let aad = self.chunk_aad(last);
        self.cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: chunk,
                    aad: &aad,
                },
            )
            .map_err(|e| CipherError::Crypto(format!("encrypt failed: {e}")))
    }

    fn open(
        &self,
        prefix: &[u8; NONCE_PREFIX_LEN],
        index: u32,
        last: bool,
        chunk: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        let nonce = chunk_nonce(prefix, index);
        let aad = self.chunk_aad(last);
        self.cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: chunk,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                CipherError::Crypto(format!(
                    "decrypt failed at chunk {index}: wrong key, tampered or truncated data"
                ))
            })
    }

    fn chunk_aad(&self, last: bool) -> [u8; 1 + IV_LEN] {
        let mut aad = [0u8; 1 + IV_LEN];
        aad[0] = u8::from(last);
        aad[1..].copy_from_slice(&self.iv);
        aad
    }
}

fn chunk_nonce(prefix: &[u8; NONCE_PREFIX_LEN], index: u32) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..NONCE_PREFIX_LEN].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_LEN..].copy_from_slice(&index.to_be_bytes());
    nonce
}

/// Open `path` for writing, failing if anything already exists there.
fn create_exclusive(path: &Path) -> Result<File, CipherError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|err| {
            if err.kind() == ErrorKind::AlreadyExists {
                CipherError::Io(format!("stored name collision at {}", path.display()))
            } else {
                io_err(err)
            }
        })
}

/// Fill `buf` from `reader`, stopping early only at EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

fn validate_stored_name(name: &str) -> Result<(), CipherError> {
    let invalid = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains(['/', '\\'])
        || Path::new(name).is_absolute();
    if invalid {
        return Err(CipherError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn io_err(err: io::Error) -> CipherError {
    CipherError::Io(err.to_string())
}
