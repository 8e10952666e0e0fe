use std::path::Path;

use claims_core::{
    claims::{Claim, ClaimStatus},
    records::{ClaimRepository, UserRepository},
    uploads::UploadPolicy,
    users::{Role, User},
    workflow::{self, ReviewAction},
};
use claims_storage::document_cipher::DocumentCipher;
use color_eyre::{
    eyre::{bail, eyre, WrapErr},
    Result,
};
use rust_decimal::Decimal;
use tracing::info;

use crate::{cli::ClaimCommand, documents};

/// Everything a claim command may touch.
pub struct ClaimContext<'a, S> {
    pub store: &'a S,
    pub cipher: &'a DocumentCipher,
    pub uploads_dir: &'a Path,
    pub policy: &'a UploadPolicy,
}

pub fn handle<S>(cmd: ClaimCommand, ctx: &ClaimContext<'_, S>) -> Result<()>
where
    S: ClaimRepository + UserRepository,
{
    match cmd {
        ClaimCommand::Submit {
            email,
            hours,
            notes,
            document,
        } => {
            let claim = submit(ctx, &email, hours, notes, document.as_deref())?;
            println!(
                "Claim {} submitted: {} h x R{:.2} = R{:.2}",
                claim.id,
                claim.hours_worked,
                claim.hourly_rate,
                claim.total_amount()
            );
        }
        ClaimCommand::List { status, lecturer } => {
            let claims = match (status, lecturer) {
                (Some(status), _) => {
                    let status: ClaimStatus = status.parse()?;
                    ctx.store.get_claims_by_status(status.as_str())
                }
                (None, Some(email)) => {
                    let lecturer = find_user(ctx.store, &email)?;
                    ctx.store.get_claims_by_lecturer(lecturer.id)
                }
                (None, None) => ctx.store.get_all_claims(),
            };
            if claims.is_empty() {
                println!("No claims found.");
            }
            for claim in &claims {
                print_summary(claim);
            }
        }
        ClaimCommand::Show { id } => {
            let claim = ctx
                .store
                .get_claim_by_id(id)
                .ok_or_else(|| eyre!("claim {id} not found"))?;
            print_summary(&claim);
            if let Some(notes) = &claim.notes {
                println!("  notes: {notes}");
            }
            if let (Some(by), Some(at)) = (&claim.approved_by, claim.approval_date) {
                println!("  reviewed by {by} at {}", at.format("%Y-%m-%d %H:%M"));
            }
            for doc in &claim.documents {
                println!(
                    "  document {}: {} ({} bytes, {})",
                    doc.id,
                    doc.file_name,
                    doc.file_size,
                    doc.content_type()
                );
            }
        }
        ClaimCommand::Review {
            id,
            action,
            reviewer,
        } => {
            let status = review(ctx.store, id, action.into(), &reviewer)?;
            println!("Claim {id} is now {status}.");
        }
    }
    Ok(())
}

/// Create a claim at the lecturer's hourly rate, attaching `document` if given.
///
/// The document is checked against the upload policy before the claim is
/// stored, so a rejected file never leaves an orphan claim behind.
pub fn submit<S>(
    ctx: &ClaimContext<'_, S>,
    email: &str,
    hours: Decimal,
    notes: Option<String>,
    document: Option<&Path>,
) -> Result<Claim>
where
    S: ClaimRepository + UserRepository,
{
    let lecturer = find_user(ctx.store, email)?;
    if lecturer.role != Role::Lecturer {
        bail!("{} is not a lecturer", lecturer.email);
    }

    let mut claim = Claim::new(lecturer.id, hours, lecturer.hourly_rate);
    claim.lecturer_name = Some(lecturer.full_name());
    claim.notes = notes.filter(|n| !n.trim().is_empty());
    claim.validate()?;

    if let Some(path) = document {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let size = std::fs::metadata(path)
            .wrap_err_with(|| format!("cannot read {}", path.display()))?
            .len();
        ctx.policy.check(name, size)?;
    }

    let claim = ctx.store.add_claim(claim);
    info!(claim_id = claim.id, lecturer_id = lecturer.id, "claim submitted");

    if let Some(path) = document {
        documents::attach_file(
            ctx.store,
            ctx.cipher,
            ctx.uploads_dir,
            claim.id,
            path,
            ctx.policy,
        )?;
    }
    ctx.store
        .get_claim_by_id(claim.id)
        .ok_or_else(|| eyre!("claim {} vanished after submit", claim.id))
}

/// Apply a reviewer's action to a claim and record who made it.
pub fn review<S>(store: &S, id: u64, action: ReviewAction, reviewer: &str) -> Result<ClaimStatus>
where
    S: ClaimRepository + UserRepository,
{
    let reviewer = find_user(store, reviewer)?;
    let claim = store
        .get_claim_by_id(id)
        .ok_or_else(|| eyre!("claim {id} not found"))?;
    let next = workflow::review(reviewer.role, action, claim.status)?;

    let name = reviewer.full_name();
    let approver = match name.trim() {
        "" => workflow::default_approver(action),
        trimmed => trimmed,
    };
    store.update_claim_status(id, next, approver);
    info!(claim_id = id, status = %next, approver, "claim reviewed");
    Ok(next)
}

fn find_user(store: &impl UserRepository, email: &str) -> Result<User> {
    store
        .get_user_by_email(email)
        .ok_or_else(|| eyre!("no user with email {email}"))
}

fn print_summary(claim: &Claim) {
    println!(
        "{} - {} - {} h - R{:.2} - {} - submitted {}",
        claim.id,
        claim.lecturer_name.as_deref().unwrap_or("unknown"),
        claim.hours_worked,
        claim.total_amount(),
        claim.status,
        claim.submission_date.format("%Y-%m-%d")
    );
}
