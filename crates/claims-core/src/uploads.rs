//! Caller-side checks for supporting-document uploads.
//!
//! The document cipher buffers a whole file in memory on decrypt, so the size
//! cap here is also the decrypt-side memory bound.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 5 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 3] = [".pdf", ".docx", ".xlsx"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("file is empty")]
    Empty,
    #[error("invalid file type {extension:?}; allowed: {allowed}")]
    InvalidType { extension: String, allowed: String },
    #[error("file size {size} exceeds the {max} byte limit")]
    TooLarge { size: u64, max: u64 },
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    /// Lower-cased extensions including the leading dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl UploadPolicy {
    /// Checks name and size; returns the normalised extension (`.pdf`).
    pub fn check(&self, file_name: &str, size: u64) -> Result<String, UploadError> {
        if size == 0 {
            return Err(UploadError::Empty);
        }

        let extension = extension_of(file_name);
        if !self
            .allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
        {
            return Err(UploadError::InvalidType {
                extension,
                allowed: self.allowed_extensions.join(", "),
            });
        }

        if size > self.max_bytes {
            return Err(UploadError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }
        Ok(extension)
    }
}

fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}
