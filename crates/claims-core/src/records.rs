//! Repository contracts for claims and users.
//!
//! Implementations own their collections; every read hands back an independent
//! copy. Mutations that name an unknown id are silent no-ops rather than errors.

use crate::{
    claims::{Claim, ClaimStatus, Document},
    users::{User, UserUpdate},
};

pub trait ClaimRepository: Send + Sync {
    /// Assign an id, stamp the submission time and persist. Performs no validation.
    fn add_claim(&self, claim: Claim) -> Claim;

    /// All claims in insertion order.
    fn get_all_claims(&self) -> Vec<Claim>;

    fn get_claim_by_id(&self, id: u64) -> Option<Claim>;

    /// Set status, approver and approval date together. Unknown ids are ignored.
    fn update_claim_status(&self, claim_id: u64, status: ClaimStatus, approved_by: &str);

    /// Attach a document, assigning its id and upload date. Unknown ids are ignored.
    fn add_document_to_claim(&self, claim_id: u64, document: Document);

    /// Case-insensitive exact match on the status label, insertion order.
    fn get_claims_by_status(&self, status: &str) -> Vec<Claim>;

    /// A lecturer's claims, newest submission first.
    fn get_claims_by_lecturer(&self, lecturer_id: u64) -> Vec<Claim>;

    fn find_document(&self, document_id: u64) -> Option<Document>;
}

pub trait UserRepository: Send + Sync {
    fn add_user(&self, user: User) -> User;

    /// Case-insensitive email lookup.
    fn get_user_by_email(&self, email: &str) -> Option<User>;

    /// Case-insensitive email plus exact hash match; first hit wins.
    fn validate_user(&self, email: &str, password_hash: &str) -> Option<User>;

    fn get_user_by_id(&self, id: u64) -> Option<User>;

    fn get_all_users(&self) -> Vec<User>;

    /// Returns `false` when no user has `id`.
    fn update_user(&self, id: u64, update: UserUpdate) -> bool;

    /// Returns `false` when no user has `id`.
    fn delete_user(&self, id: u64) -> bool;
}
