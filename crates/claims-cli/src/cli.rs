use std::path::PathBuf;

use claims_core::{users::Role, workflow::ReviewAction};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "claims",
    about = "Lecturer claims records and encrypted supporting documents",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Check that the record store loads and the document cipher round-trips.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// HR user management.
    #[command(subcommand)]
    User(UserCommand),
    /// Submit, list and review claims.
    #[command(subcommand)]
    Claim(ClaimCommand),
    /// Attach and download encrypted supporting documents.
    #[command(subcommand)]
    Document(DocumentCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Create an account.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        surname: String,
        #[arg(long)]
        email: String,
        /// Lecturer, Coordinator, Manager or HR.
        #[arg(long)]
        role: Role,
        /// Hourly rate applied to the user's claims.
        #[arg(long, default_value = "0")]
        rate: Decimal,
        #[arg(long)]
        password: String,
    },
    /// List all accounts.
    List,
    /// Change account details.
    Edit {
        id: u64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        surname: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        role: Option<Role>,
        #[arg(long)]
        rate: Option<Decimal>,
    },
    /// Remove an account.
    Remove { id: u64 },
    /// Check a password against the stored hash.
    Verify {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ClaimCommand {
    /// Submit a claim for a lecturer, optionally with a supporting document.
    Submit {
        /// Lecturer's email; their hourly rate is applied.
        #[arg(long)]
        email: String,
        #[arg(long)]
        hours: Decimal,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        document: Option<PathBuf>,
    },
    /// List claims, optionally filtered.
    List {
        #[arg(long)]
        status: Option<String>,
        /// Only claims submitted by this lecturer.
        #[arg(long)]
        lecturer: Option<String>,
    },
    /// Show one claim with its documents.
    Show { id: u64 },
    /// Verify, approve or reject a claim.
    Review {
        id: u64,
        #[arg(value_enum)]
        action: ReviewArg,
        /// Reviewer's email; their role decides what they may do.
        #[arg(long)]
        reviewer: String,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum DocumentCommand {
    /// Encrypt a file and attach it to a claim.
    Attach { claim_id: u64, path: PathBuf },
    /// Decrypt a stored document to a file.
    Download {
        document_id: u64,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewArg {
    Verify,
    Approve,
    Reject,
}

impl From<ReviewArg> for ReviewAction {
    fn from(arg: ReviewArg) -> Self {
        match arg {
            ReviewArg::Verify => ReviewAction::Verify,
            ReviewArg::Approve => ReviewAction::Approve,
            ReviewArg::Reject => ReviewAction::Reject,
        }
    }
}
