//! Encryption at rest for supporting documents.
//! AES-256-GCM in sealed 64 KiB chunks, keyed from a persisted key file (or test doubles).

pub mod document_cipher;
pub mod key_provider;
