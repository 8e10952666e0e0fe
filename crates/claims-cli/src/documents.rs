use std::{
    fs::{self, File},
    io,
    path::Path,
};

use claims_core::{claims::Document, records::ClaimRepository, uploads::UploadPolicy};
use claims_storage::document_cipher::{CipherError, DocumentCipher};
use color_eyre::{
    eyre::{bail, eyre, WrapErr},
    Result,
};
use tracing::info;

use crate::cli::DocumentCommand;

/// Execute a document subcommand.
pub fn handle(
    cmd: DocumentCommand,
    store: &impl ClaimRepository,
    cipher: &DocumentCipher,
    uploads_dir: &Path,
    policy: &UploadPolicy,
) -> Result<()> {
    match cmd {
        DocumentCommand::Attach { claim_id, path } => {
            let doc = attach_file(store, cipher, uploads_dir, claim_id, &path, policy)?;
            println!(
                "Attached {} ({} bytes) to claim {} as document {}",
                doc.file_name, doc.file_size, claim_id, doc.id
            );
        }
        DocumentCommand::Download { document_id, out } => {
            let doc = download(store, cipher, uploads_dir, document_id, &out)?;
            println!(
                "Wrote {} ({}) to {}",
                doc.file_name,
                doc.content_type(),
                out.display()
            );
        }
    }
    Ok(())
}

/// Check, encrypt and attach the file at `path` to an existing claim.
pub fn attach_file(
    store: &impl ClaimRepository,
    cipher: &DocumentCipher,
    uploads_dir: &Path,
    claim_id: u64,
    path: &Path,
    policy: &UploadPolicy,
) -> Result<Document> {
    if store.get_claim_by_id(claim_id).is_none() {
        bail!("claim {claim_id} not found");
    }
    let file_name = display_name(path)?;
    let size = fs::metadata(path)
        .wrap_err_with(|| format!("cannot read {}", path.display()))?
        .len();
    let file_type = policy.check(&file_name, size)?;

    let source = File::open(path).wrap_err_with(|| format!("cannot open {}", path.display()))?;
    let stored_name = cipher.encrypt(source, uploads_dir)?;
    info!(claim_id, %stored_name, size, "stored encrypted document");

    store.add_document_to_claim(
        claim_id,
        Document::new(file_name, stored_name.as_str(), size, file_type),
    );
    store
        .get_claim_by_id(claim_id)
        .and_then(|claim| {
            claim
                .documents
                .into_iter()
                .find(|doc| doc.stored_name == stored_name)
        })
        .ok_or_else(|| eyre!("claim {claim_id} disappeared while attaching"))
}

/// Decrypt document `document_id` into `out`.
pub fn download(
    store: &impl ClaimRepository,
    cipher: &DocumentCipher,
    uploads_dir: &Path,
    document_id: u64,
    out: &Path,
) -> Result<Document> {
    let doc = store
        .find_document(document_id)
        .ok_or_else(|| eyre!("document {document_id} not found"))?;
    let mut plaintext = match cipher.decrypt(uploads_dir, &doc.stored_name) {
        Ok(reader) => reader,
        Err(CipherError::NotFound { .. }) => bail!("File not found on server."),
        Err(err) => return Err(err.into()),
    };
    let mut sink = File::create(out).wrap_err_with(|| format!("cannot create {}", out.display()))?;
    io::copy(&mut plaintext, &mut sink)?;
    Ok(doc)
}

fn display_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| eyre!("{} has no usable file name", path.display()))
}
