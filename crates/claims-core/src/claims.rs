use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Monthly ceiling on hours a lecturer may claim.
pub const MAX_MONTHLY_HOURS: u32 = 180;

/// Claim approval lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ClaimStatus {
    Pending,
    Verified,
    Approved,
    Rejected,
}

impl Default for ClaimStatus {
    fn default() -> Self {
        ClaimStatus::Pending
    }
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "Pending",
            ClaimStatus::Verified => "Verified",
            ClaimStatus::Approved => "Approved",
            ClaimStatus::Rejected => "Rejected",
        }
    }

    /// Case-insensitive comparison against a free-form status label.
    pub fn matches(&self, label: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(label)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown claim status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for ClaimStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            ClaimStatus::Pending,
            ClaimStatus::Verified,
            ClaimStatus::Approved,
            ClaimStatus::Rejected,
        ]
        .into_iter()
        .find(|status| status.matches(s.trim()))
        .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Supporting document metadata. The bytes live encrypted on disk under `stored_name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub id: u64,
    pub claim_id: u64,
    /// Original, user-supplied file name.
    pub file_name: String,
    /// Opaque name of the ciphertext on disk.
    pub stored_name: String,
    pub file_size: u64,
    /// Lower-cased extension including the dot, e.g. `.pdf`.
    pub file_type: String,
    pub upload_date: DateTime<Utc>,
}

impl Document {
    /// Builds an unattached document; `id`, `claim_id` and `upload_date` are
    /// assigned when the record store attaches it to a claim.
    pub fn new(
        file_name: impl Into<String>,
        stored_name: impl Into<String>,
        file_size: u64,
        file_type: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            claim_id: 0,
            file_name: file_name.into(),
            stored_name: stored_name.into(),
            file_size,
            file_type: file_type.into(),
            upload_date: Utc::now(),
        }
    }

    /// MIME type served on download.
    pub fn content_type(&self) -> &'static str {
        match self.file_type.to_ascii_lowercase().as_str() {
            ".pdf" => "application/pdf",
            ".docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ".xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            _ => "application/octet-stream",
        }
    }
}

/// A lecturer's request for payment of worked hours.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claim {
    pub id: u64,
    pub lecturer_id: u64,
    #[serde(default)]
    pub lecturer_name: Option<String>,
    pub hours_worked: Decimal,
    pub hourly_rate: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: ClaimStatus,
    pub submission_date: DateTime<Utc>,
    #[serde(default)]
    pub approval_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub documents: Vec<Document>,
}

impl Claim {
    pub fn new(lecturer_id: u64, hours_worked: Decimal, hourly_rate: Decimal) -> Self {
        Self {
            id: 0,
            lecturer_id,
            lecturer_name: None,
            hours_worked,
            hourly_rate,
            notes: None,
            status: ClaimStatus::Pending,
            submission_date: Utc::now(),
            approval_date: None,
            approved_by: None,
            documents: Vec::new(),
        }
    }

    /// `hours_worked × hourly_rate`, rounded to cents (midpoint to even).
    pub fn total_amount(&self) -> Decimal {
        (self.hours_worked * self.hourly_rate).round_dp(2)
    }

    /// Submission-time checks applied by callers before a claim reaches the store.
    pub fn validate(&self) -> Result<(), ClaimValidationError> {
        let max = Decimal::from(MAX_MONTHLY_HOURS);
        if self.hours_worked < Decimal::ONE || self.hours_worked > max {
            return Err(ClaimValidationError::HoursOutOfRange {
                hours: self.hours_worked,
            });
        }
        if self.hourly_rate.is_sign_negative() {
            return Err(ClaimValidationError::NegativeRate {
                rate: self.hourly_rate,
            });
        }
        if let Some(notes) = &self.notes {
            if notes.chars().count() > MAX_NOTES_LEN {
                return Err(ClaimValidationError::NotesTooLong);
            }
        }
        Ok(())
    }
}

const MAX_NOTES_LEN: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimValidationError {
    #[error("hours must be between 1 and 180, got {hours}")]
    HoursOutOfRange { hours: Decimal },
    #[error("hourly rate cannot be negative, got {rate}")]
    NegativeRate { rate: Decimal },
    #[error("notes exceed 500 characters")]
    NotesTooLong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_amount_is_hours_times_rate() {
        let claim = Claim::new(1, Decimal::from(10), Decimal::from(150));
        assert_eq!(claim.total_amount(), Decimal::from(1500));
    }

    #[test]
    fn total_amount_rounds_to_cents_half_even() {
        // 0.125 -> 0.12, 0.135 -> 0.14
        let low = Claim::new(1, Decimal::new(125, 3), Decimal::ONE);
        let high = Claim::new(1, Decimal::new(135, 3), Decimal::ONE);
        assert_eq!(low.total_amount(), Decimal::new(12, 2));
        assert_eq!(high.total_amount(), Decimal::new(14, 2));
    }

    #[test]
    fn total_amount_tracks_input_changes() {
        let mut claim = Claim::new(1, Decimal::new(75, 1), Decimal::new(9999, 2));
        assert_eq!(claim.total_amount(), Decimal::new(74992, 2));
        claim.hours_worked = Decimal::from(2);
        assert_eq!(claim.total_amount(), Decimal::new(19998, 2));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("pending".parse::<ClaimStatus>(), Ok(ClaimStatus::Pending));
        assert_eq!(" APPROVED ".parse::<ClaimStatus>(), Ok(ClaimStatus::Approved));
        assert_eq!(
            "archived".parse::<ClaimStatus>(),
            Err(UnknownStatus("archived".into()))
        );
    }

    #[test]
    fn new_claims_default_to_pending() {
        let claim = Claim::new(3, Decimal::ONE, Decimal::ONE);
        assert_eq!(claim.status, ClaimStatus::Pending);
        assert!(claim.approval_date.is_none());
        assert!(claim.approved_by.is_none());
    }

    #[test]
    fn validate_enforces_hour_bounds() {
        let ok = Claim::new(1, Decimal::from(180), Decimal::from(100));
        assert!(ok.validate().is_ok());

        let over = Claim::new(1, Decimal::from(181), Decimal::from(100));
        assert!(matches!(
            over.validate(),
            Err(ClaimValidationError::HoursOutOfRange { .. })
        ));

        let zero = Claim::new(1, Decimal::ZERO, Decimal::from(100));
        assert!(zero.validate().is_err());
    }

    #[test]
    fn validate_rejects_long_notes() {
        let mut claim = Claim::new(1, Decimal::from(4), Decimal::from(100));
        claim.notes = Some("x".repeat(501));
        assert_eq!(claim.validate(), Err(ClaimValidationError::NotesTooLong));
    }

    #[test]
    fn serialized_claim_omits_total_amount() {
        let claim = Claim::new(1, Decimal::from(2), Decimal::from(3));
        let json = serde_json::to_value(&claim).expect("serialize");
        assert!(json.get("total_amount").is_none());
        assert_eq!(json["status"], "Pending");
    }

    #[test]
    fn content_type_follows_extension() {
        let doc = Document::new("a.PDF", "x.bin", 1, ".PDF");
        assert_eq!(doc.content_type(), "application/pdf");
        let other = Document::new("a.txt", "y.bin", 1, ".txt");
        assert_eq!(other.content_type(), "application/octet-stream");
    }
}
