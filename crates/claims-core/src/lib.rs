//! Core types for the claims system: claims, documents, users, the repository
//! contracts the record store implements, and caller-side review and upload rules.
//! No I/O lives here.

pub mod claims;
pub mod records;
pub mod uploads;
pub mod users;
pub mod workflow;
