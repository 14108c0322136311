//! Domain types shared by the backend client, the dashboard state and the
//! terminal front.
//!
//! Identifiers are server-assigned integers; the client never mints one.
//! `PatientFields` is the editable subset of a record — the same shape stages
//! a new patient and carries an update, so create and edit flows cannot
//! diverge on what a form holds.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier of the provider account that owns a set of patients.
pub type ProviderId = i64;

/// Server-assigned patient identifier, immutable once created.
pub type PatientId = i64;

/// Lifecycle status of a patient record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatientStatus {
    #[default]
    Inquiry,
    Onboarding,
    Active,
    Churned,
}

impl PatientStatus {
    /// Every status, in form display order.
    pub const ALL: [PatientStatus; 4] = [
        PatientStatus::Inquiry,
        PatientStatus::Onboarding,
        PatientStatus::Active,
        PatientStatus::Churned,
    ];

    /// The wire name, identical to the display name.
    pub fn as_str(self) -> &'static str {
        match self {
            PatientStatus::Inquiry => "Inquiry",
            PatientStatus::Onboarding => "Onboarding",
            PatientStatus::Active => "Active",
            PatientStatus::Churned => "Churned",
        }
    }

    /// Parse a status name, case-insensitively. `None` for anything outside
    /// the closed set.
    pub fn parse(input: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(input.trim()))
    }
}

impl std::fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A patient record as the backend returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub first_name: String,
    /// Optional; the backend may return `null` or an empty string.
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
    pub dob: NaiveDate,
    pub status: PatientStatus,
    pub address: String,
}

impl Patient {
    /// The editable fields of this record — everything except the identifier.
    pub fn fields(&self) -> PatientFields {
        PatientFields {
            first_name: self.first_name.clone(),
            middle_name: self.middle_name.clone(),
            last_name: self.last_name.clone(),
            dob: Some(self.dob),
            status: self.status,
            address: self.address.clone(),
        }
    }

    /// Display name, with the middle name when present.
    pub fn full_name(&self) -> String {
        match self.middle_name.as_deref() {
            Some(middle) if !middle.is_empty() => {
                format!("{} {} {}", self.first_name, middle, self.last_name)
            }
            _ => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

/// The editable subset of a patient record.
///
/// Doubles as the form draft and as the body of create/update requests.
/// Defaults to the empty form: blank names and address, no date of birth,
/// status `Inquiry`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientFields {
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
    /// Required by the backend; `None` only while the form is being filled.
    pub dob: Option<NaiveDate>,
    pub status: PatientStatus,
    pub address: String,
}
