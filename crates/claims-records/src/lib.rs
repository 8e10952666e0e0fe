//! Snapshot-backed record store for claims and users.
//!
//! All state sits behind one mutex. Every mutation rewrites the full snapshot
//! of the collection it touched before the lock is released, so an operation
//! that starts after another finishes sees its effects in memory and on disk.
//! Snapshot write failures are logged and swallowed; unreadable snapshots are
//! logged and replaced with an empty collection.

pub mod snapshot;

use std::{
    borrow::Cow,
    fs,
    path::{Path, PathBuf},
};

use chrono::Utc;
use claims_core::{
    claims::{Claim, ClaimStatus, Document},
    records::{ClaimRepository, UserRepository},
    users::{User, UserUpdate},
};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::snapshot::{
    read_snapshot, write_snapshot, ClaimsSnapshot, UsersSnapshot, CLAIMS_FILE, USERS_FILE,
};

#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("cannot create data directory {path}: {reason}")]
    DataDir { path: PathBuf, reason: String },
}

#[derive(Debug)]
struct State {
    claims: Vec<Claim>,
    next_claim_id: u64,
    next_document_id: u64,
    users: Vec<User>,
    next_user_id: u64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            claims: Vec::new(),
            next_claim_id: 1,
            next_document_id: 1,
            users: Vec::new(),
            next_user_id: 1,
        }
    }
}

/// In-memory authoritative copy of all claims and users, persisted to
/// `claims_data.json` and `users_data.json` under the data directory.
#[derive(Debug)]
pub struct RecordStore {
    claims_path: PathBuf,
    users_path: PathBuf,
    state: Mutex<State>,
}

impl RecordStore {
    /// Create the data directory if needed and load both snapshots. Missing or
    /// corrupt snapshots yield an empty collection; only directory creation fails.
    #[instrument(skip_all, fields(data_dir = %data_dir.as_ref().display()))]
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, RecordStoreError> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).map_err(|e| RecordStoreError::DataDir {
            path: data_dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let store = Self {
            claims_path: data_dir.join(CLAIMS_FILE),
            users_path: data_dir.join(USERS_FILE),
            state: Mutex::new(State::default()),
        };
        {
            let mut state = store.state.lock();
            store.load_claims(&mut state);
            store.load_users(&mut state);
        }
        Ok(store)
    }

    pub fn claims_path(&self) -> &Path {
        &self.claims_path
    }

    pub fn users_path(&self) -> &Path {
        &self.users_path
    }

    fn load_claims(&self, state: &mut State) {
        match read_snapshot::<ClaimsSnapshot>(&self.claims_path) {
            Ok(Some(snapshot)) => {
                state.claims = snapshot.claims.into_owned();
                let max_claim = state.claims.iter().map(|c| c.id).max().unwrap_or(0);
                let max_document = state
                    .claims
                    .iter()
                    .flat_map(|c| c.documents.iter().map(|d| d.id))
                    .max()
                    .unwrap_or(0);
                state.next_claim_id = snapshot.next_claim_id.max(max_claim + 1);
                state.next_document_id = snapshot.next_document_id.max(max_document + 1);
                info!(count = state.claims.len(), "loaded claims");
            }
            Ok(None) => debug!(path = %self.claims_path.display(), "no claims snapshot yet"),
            Err(err) => {
                error!(path = %self.claims_path.display(), "failed to load claims data, starting empty: {err}");
                state.claims.clear();
                state.next_claim_id = 1;
                state.next_document_id = 1;
            }
        }
    }

    fn load_users(&self, state: &mut State) {
        match read_snapshot::<UsersSnapshot>(&self.users_path) {
            Ok(Some(snapshot)) => {
                state.users = snapshot.users.into_owned();
                let max_user = state.users.iter().map(|u| u.id).max().unwrap_or(0);
                state.next_user_id = snapshot.next_user_id.max(max_user + 1);
                info!(count = state.users.len(), "loaded users");
            }
            Ok(None) => debug!(path = %self.users_path.display(), "no users snapshot yet"),
            Err(err) => {
                error!(path = %self.users_path.display(), "failed to load users data, starting empty: {err}");
                state.users.clear();
                state.next_user_id = 1;
            }
        }
    }

    // Callers hold the state lock.
    fn save_claims(&self, state: &State) {
        let snapshot = ClaimsSnapshot {
            claims: Cow::Borrowed(&state.claims),
            next_claim_id: state.next_claim_id,
            next_document_id: state.next_document_id,
        };
        match write_snapshot(&self.claims_path, &snapshot) {
            Ok(()) => info!(count = state.claims.len(), "saved claims"),
            Err(err) => error!(path = %self.claims_path.display(), "error saving claims data: {err}"),
        }
    }

    fn save_users(&self, state: &State) {
        let snapshot = UsersSnapshot {
            users: Cow::Borrowed(&state.users),
            next_user_id: state.next_user_id,
        };
        match write_snapshot(&self.users_path, &snapshot) {
            Ok(()) => info!(count = state.users.len(), "saved users"),
            Err(err) => error!(path = %self.users_path.display(), "error saving users data: {err}"),
        }
    }
}

fn same_email(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

impl ClaimRepository for RecordStore {
    #[instrument(skip(self, claim), fields(lecturer_id = claim.lecturer_id))]
    fn add_claim(&self, mut claim: Claim) -> Claim {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        claim.id = state.next_claim_id;
        state.next_claim_id += 1;
        claim.submission_date = Utc::now();
        for document in &mut claim.documents {
            document.id = state.next_document_id;
            state.next_document_id += 1;
            document.claim_id = claim.id;
        }

        state.claims.push(claim.clone());
        self.save_claims(state);
        claim
    }

    fn get_all_claims(&self) -> Vec<Claim> {
        self.state.lock().claims.clone()
    }

    fn get_claim_by_id(&self, id: u64) -> Option<Claim> {
        self.state.lock().claims.iter().find(|c| c.id == id).cloned()
    }

    #[instrument(skip(self))]
    fn update_claim_status(&self, claim_id: u64, status: ClaimStatus, approved_by: &str) {
        let mut state = self.state.lock();
        let Some(claim) = state.claims.iter_mut().find(|c| c.id == claim_id) else {
            debug!("status update for unknown claim ignored");
            return;
        };

        claim.status = status;
        claim.approval_date = Some(Utc::now());
        claim.approved_by = Some(approved_by.to_string());
        self.save_claims(&state);
    }

    #[instrument(skip(self, document), fields(file_type = %document.file_type))]
    fn add_document_to_claim(&self, claim_id: u64, mut document: Document) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(claim) = state.claims.iter_mut().find(|c| c.id == claim_id) else {
            debug!("document attach for unknown claim ignored");
            return;
        };

        document.id = state.next_document_id;
        state.next_document_id += 1;
        document.claim_id = claim_id;
        document.upload_date = Utc::now();
        claim.documents.push(document);
        self.save_claims(state);
    }

    fn get_claims_by_status(&self, status: &str) -> Vec<Claim> {
        self.state
            .lock()
            .claims
            .iter()
            .filter(|c| c.status.matches(status))
            .cloned()
            .collect()
    }

    fn get_claims_by_lecturer(&self, lecturer_id: u64) -> Vec<Claim> {
        let mut claims: Vec<Claim> = self
            .state
            .lock()
            .claims
            .iter()
            .filter(|c| c.lecturer_id == lecturer_id)
            .cloned()
            .collect();
        claims.sort_by(|a, b| b.submission_date.cmp(&a.submission_date));
        claims
    }

    fn find_document(&self, document_id: u64) -> Option<Document> {
        self.state
            .lock()
            .claims
            .iter()
            .flat_map(|c| c.documents.iter())
            .find(|d| d.id == document_id)
            .cloned()
    }
}

impl UserRepository for RecordStore {
    #[instrument(skip(self, user), fields(role = %user.role))]
    fn add_user(&self, mut user: User) -> User {
        let mut state = self.state.lock();
        user.id = state.next_user_id;
        state.next_user_id += 1;
        state.users.push(user.clone());
        self.save_users(&state);
        user
    }

    fn get_user_by_email(&self, email: &str) -> Option<User> {
        self.state
            .lock()
            .users
            .iter()
            .find(|u| same_email(&u.email, email))
            .cloned()
    }

    fn validate_user(&self, email: &str, password_hash: &str) -> Option<User> {
        self.state
            .lock()
            .users
            .iter()
            .find(|u| same_email(&u.email, email) && u.password_hash.as_deref() == Some(password_hash))
            .cloned()
    }

    fn get_user_by_id(&self, id: u64) -> Option<User> {
        self.state.lock().users.iter().find(|u| u.id == id).cloned()
    }

    fn get_all_users(&self) -> Vec<User> {
        self.state.lock().users.clone()
    }

    #[instrument(skip(self, update))]
    fn update_user(&self, id: u64, update: UserUpdate) -> bool {
        let mut state = self.state.lock();
        let Some(user) = state.users.iter_mut().find(|u| u.id == id) else {
            return false;
        };
        update.apply(user);
        self.save_users(&state);
        true
    }

    #[instrument(skip(self))]
    fn delete_user(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        let Some(index) = state.users.iter().position(|u| u.id == id) else {
            return false;
        };
        state.users.remove(index);
        self.save_users(&state);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, sync::Arc, thread};

    use claims_core::users::Role;
    use rust_decimal::Decimal;

    use super::*;

    fn open_store() -> (tempfile::TempDir, RecordStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RecordStore::open(dir.path().join("App_Data")).expect("open");
        (dir, store)
    }

    fn claim(hours: i64, rate: i64) -> Claim {
        let mut claim = Claim::new(1, Decimal::from(hours), Decimal::from(rate));
        claim.lecturer_name = Some("Test".into());
        claim
    }

    fn lecturer(email: &str) -> User {
        User::new("Thabo", "Nkosi", email, Role::Lecturer, Decimal::from(250))
            .with_password_hash("HASH-1")
    }

    #[test]
    fn add_claim_increases_count_with_increasing_ids() {
        let (_dir, store) = open_store();
        let first = store.add_claim(claim(5, 100));
        let before = store.get_all_claims().len();

        let second = store.add_claim(claim(8, 120));

        assert_eq!(store.get_all_claims().len(), before + 1);
        assert!(second.id > first.id);
        assert_eq!(second.status, ClaimStatus::Pending);
    }

    #[test]
    fn update_status_sets_status_and_approver_together() {
        let (_dir, store) = open_store();
        let added = store.add_claim(claim(8, 120));

        store.update_claim_status(added.id, ClaimStatus::Approved, "Manager");

        let updated = store.get_claim_by_id(added.id).expect("claim");
        assert_eq!(updated.status, ClaimStatus::Approved);
        assert_eq!(updated.approved_by.as_deref(), Some("Manager"));
        assert!(updated.approval_date.is_some());
        assert_eq!(updated.submission_date, added.submission_date);
    }

    #[test]
    fn update_status_on_unknown_id_is_a_noop() {
        let (_dir, store) = open_store();
        let added = store.add_claim(claim(2, 50));
        let before = store.get_all_claims();
        let snapshot_before = fs::read(store.claims_path()).expect("snapshot");

        store.update_claim_status(9999, ClaimStatus::Approved, "Manager");

        assert_eq!(store.get_all_claims(), before);
        assert_eq!(fs::read(store.claims_path()).expect("snapshot"), snapshot_before);
        assert_eq!(
            store.get_claim_by_id(added.id).expect("claim").status,
            ClaimStatus::Pending
        );
    }

    #[test]
    fn claim_missing_required_fields_is_still_stored() {
        let (_dir, store) = open_store();
        let mut invalid = Claim::new(0, Decimal::from(500), Decimal::from(200));
        invalid.lecturer_name = None;

        let stored = store.add_claim(invalid);

        let fetched = store.get_claim_by_id(stored.id).expect("retrievable");
        assert!(fetched.lecturer_name.is_none());
        assert_eq!(fetched.total_amount(), Decimal::from(100_000));
        assert_eq!(store.get_all_claims().len(), 1);
    }

    #[test]
    fn status_filter_is_case_insensitive_and_ordered() {
        let (_dir, store) = open_store();
        let alice = store.add_claim(claim(6, 90));
        let bob = store.add_claim(claim(7, 100));
        let carol = store.add_claim(claim(3, 80));
        store.update_claim_status(bob.id, ClaimStatus::Verified, "Coordinator");

        let pending = store.get_claims_by_status("Pending");
        assert!(pending.iter().all(|c| c.status.matches("pending")));
        assert_eq!(
            pending.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![alice.id, carol.id]
        );

        assert_eq!(store.get_claims_by_status("VERIFIED").len(), 1);
        assert!(store.get_claims_by_status("archived").is_empty());
    }

    #[test]
    fn attach_document_assigns_ids_and_keeps_metadata() {
        let (_dir, store) = open_store();
        let added = store.add_claim(claim(10, 100));

        store.add_document_to_claim(
            added.id,
            Document::new("test.pdf", "fakepath", 1234, ".pdf"),
        );

        let updated = store.get_claim_by_id(added.id).expect("claim");
        assert_eq!(updated.documents.len(), 1);
        let doc = &updated.documents[0];
        assert_eq!(doc.file_type, ".pdf");
        assert_eq!(doc.claim_id, added.id);
        assert_eq!(doc.id, 1);
        assert_eq!(store.find_document(doc.id).as_ref(), Some(doc));
    }

    #[test]
    fn attach_document_to_unknown_claim_is_a_noop() {
        let (_dir, store) = open_store();
        store.add_claim(claim(1, 1));

        store.add_document_to_claim(42, Document::new("a.pdf", "x.bin", 1, ".pdf"));

        assert!(store.get_all_claims().iter().all(|c| c.documents.is_empty()));
        assert!(store.find_document(1).is_none());
    }

    #[test]
    fn returned_claims_are_independent_copies() {
        let (_dir, store) = open_store();
        let added = store.add_claim(claim(4, 10));

        let mut copy = store.get_claim_by_id(added.id).expect("claim");
        copy.status = ClaimStatus::Rejected;
        copy.documents.push(Document::new("sneaky.pdf", "x", 1, ".pdf"));

        let fresh = store.get_claim_by_id(added.id).expect("claim");
        assert_eq!(fresh.status, ClaimStatus::Pending);
        assert!(fresh.documents.is_empty());
    }

    #[test]
    fn reopen_restores_state_and_continues_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (claim_id, user_id) = {
            let store = RecordStore::open(dir.path()).expect("open");
            let c = store.add_claim(claim(10, 150));
            store.add_document_to_claim(c.id, Document::new("t.docx", "s.bin", 9, ".docx"));
            let u = store.add_user(lecturer("a@example.com"));
            (c.id, u.id)
        };

        let store = RecordStore::open(dir.path()).expect("reopen");
        let restored = store.get_claim_by_id(claim_id).expect("claim");
        assert_eq!(restored.total_amount(), Decimal::from(1500));
        assert_eq!(restored.documents.len(), 1);
        assert_eq!(store.get_user_by_id(user_id).expect("user").email, "a@example.com");

        let next = store.add_claim(claim(1, 1));
        assert!(next.id > claim_id);
        store.add_document_to_claim(next.id, Document::new("n.pdf", "n.bin", 1, ".pdf"));
        let doc_id = store.get_claim_by_id(next.id).expect("claim").documents[0].id;
        assert!(doc_id > restored.documents[0].id);
        assert!(store.add_user(lecturer("b@example.com")).id > user_id);
    }

    #[test]
    fn corrupt_claims_snapshot_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = RecordStore::open(dir.path()).expect("open");
            store.add_claim(claim(1, 1));
            store.add_user(lecturer("keep@example.com"));
        }
        fs::write(dir.path().join(CLAIMS_FILE), b"{\"claims\": [tru").expect("corrupt");

        let store = RecordStore::open(dir.path()).expect("open despite corruption");
        assert!(store.get_all_claims().is_empty());
        assert_eq!(store.add_claim(claim(2, 2)).id, 1);
        assert!(store.get_user_by_email("keep@example.com").is_some());
    }

    #[test]
    fn missing_snapshots_start_empty() {
        let (_dir, store) = open_store();
        assert!(store.get_all_claims().is_empty());
        assert!(store.get_all_users().is_empty());
        assert!(!store.claims_path().exists());
    }

    #[test]
    fn snapshot_write_failure_does_not_fail_the_mutation() {
        let (_dir, store) = open_store();
        // A directory where the snapshot file should be makes the rename fail.
        fs::create_dir(store.claims_path()).expect("block snapshot path");

        let added = store.add_claim(claim(3, 3));

        assert_eq!(store.get_claim_by_id(added.id).expect("in memory").id, added.id);
        assert!(store.claims_path().is_dir());
    }

    #[test]
    fn snapshot_layout_holds_claims_and_counters() {
        let (_dir, store) = open_store();
        let added = store.add_claim(claim(2, 3));
        store.add_document_to_claim(added.id, Document::new("a.pdf", "a.bin", 1, ".pdf"));

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(store.claims_path()).expect("read")).expect("json");
        assert_eq!(raw["next_claim_id"], 2);
        assert_eq!(raw["next_document_id"], 2);
        assert_eq!(raw["claims"].as_array().expect("array").len(), 1);
        assert!(raw["claims"][0].get("total_amount").is_none());
    }

    #[test]
    fn concurrent_inserts_get_distinct_consecutive_ids() {
        const THREADS: u64 = 32;
        let (_dir, store) = open_store();
        let store = Arc::new(store);

        thread::scope(|scope| {
            for i in 0..THREADS {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    store.add_claim(Claim::new(i, Decimal::ONE, Decimal::from(i)));
                });
            }
        });

        let ids: BTreeSet<u64> = store.get_all_claims().iter().map(|c| c.id).collect();
        assert_eq!(ids.len() as u64, THREADS);
        assert_eq!(ids, (1..=THREADS).collect::<BTreeSet<_>>());

        let reopened = RecordStore::open(store.claims_path().parent().expect("dir")).expect("reopen");
        assert_eq!(reopened.get_all_claims().len() as u64, THREADS);
    }

    #[test]
    fn lecturer_view_filters_and_orders_newest_first() {
        let (_dir, store) = open_store();
        for lecturer_id in [1, 2, 1, 1] {
            store.add_claim(Claim::new(lecturer_id, Decimal::ONE, Decimal::ONE));
        }

        let mine = store.get_claims_by_lecturer(1);
        assert_eq!(mine.len(), 3);
        assert!(mine.iter().all(|c| c.lecturer_id == 1));
        assert!(mine
            .windows(2)
            .all(|pair| pair[0].submission_date >= pair[1].submission_date));
    }

    #[test]
    fn users_are_found_by_email_case_insensitively() {
        let (_dir, store) = open_store();
        let added = store.add_user(lecturer("Thabo@Example.com"));
        assert_eq!(added.id, 1);

        let found = store.get_user_by_email("thabo@example.COM").expect("found");
        assert_eq!(found.id, added.id);
        assert!(store.get_user_by_email("nobody@example.com").is_none());
    }

    #[test]
    fn validate_user_needs_matching_email_and_exact_hash() {
        let (_dir, store) = open_store();
        store.add_user(lecturer("thabo@example.com"));
        store.add_user(User::new("No", "Password", "nopw@example.com", Role::Hr, Decimal::ZERO));

        assert!(store.validate_user("THABO@example.com", "HASH-1").is_some());
        assert!(store.validate_user("thabo@example.com", "hash-1").is_none());
        assert!(store.validate_user("other@example.com", "HASH-1").is_none());
        assert!(store.validate_user("nopw@example.com", "").is_none());
    }

    #[test]
    fn update_and_delete_users_without_reusing_ids() {
        let (_dir, store) = open_store();
        let first = store.add_user(lecturer("one@example.com"));
        let second = store.add_user(lecturer("two@example.com"));

        assert!(store.update_user(
            first.id,
            UserUpdate {
                role: Some(Role::Manager),
                ..UserUpdate::default()
            }
        ));
        assert_eq!(store.get_user_by_id(first.id).expect("user").role, Role::Manager);
        assert!(!store.update_user(99, UserUpdate::default()));

        assert!(store.delete_user(second.id));
        assert!(!store.delete_user(second.id));
        assert!(store.get_user_by_id(second.id).is_none());

        let third = store.add_user(lecturer("three@example.com"));
        assert_eq!(third.id, 3);
    }
}
