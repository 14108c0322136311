//! Pure dashboard state — identity, collection, draft, error slot.
//!
//! Every transition here is synchronous and local; the record manager layers
//! the network calls on top. The view renders from a clone of this struct
//! and nothing else.

use crate::models::{Patient, PatientFields, PatientId, ProviderId};

/// The form's staging area.
///
/// Create and edit mode cannot coexist: the variant IS the mode, and an
/// edit always knows which record it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draft {
    Create(PatientFields),
    Edit {
        target: PatientId,
        fields: PatientFields,
    },
}

impl Default for Draft {
    fn default() -> Self {
        Draft::Create(PatientFields::default())
    }
}

impl Draft {
    pub fn is_edit(&self) -> bool {
        matches!(self, Draft::Edit { .. })
    }

    /// The record an edit targets, `None` in create mode.
    pub fn target(&self) -> Option<PatientId> {
        match self {
            Draft::Create(_) => None,
            Draft::Edit { target, .. } => Some(*target),
        }
    }

    pub fn fields(&self) -> &PatientFields {
        match self {
            Draft::Create(fields) => fields,
            Draft::Edit { fields, .. } => fields,
        }
    }
}

/// Everything the dashboard renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    /// The authenticated provider; `None` gates the whole dashboard behind
    /// the auth form.
    pub provider: Option<ProviderId>,
    /// The current provider's patients, replaced wholesale on refresh.
    pub patients: Vec<Patient>,
    pub draft: Draft,
    /// At most one human-readable failure message; overwritten, never
    /// appended.
    pub error: Option<String>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.provider.is_some()
    }

    pub fn set_identity(&mut self, id: ProviderId) {
        self.provider = Some(id);
    }

    /// Replace collection state from the server's response. No merging,
    /// no diffing.
    pub fn replace_patients(&mut self, patients: Vec<Patient>) {
        self.patients = patients;
    }

    /// Copy a displayed record's editable fields into the draft and record
    /// the target. Overwrites whatever was staged, including an in-progress
    /// creation.
    pub fn begin_edit(&mut self, patient: &Patient) {
        self.draft = Draft::Edit {
            target: patient.id,
            fields: patient.fields(),
        };
    }

    /// Return the draft to the empty create-mode form.
    pub fn reset_draft(&mut self) {
        self.draft = Draft::default();
    }

    /// Replace the staged fields without changing the draft's mode.
    pub fn set_draft_fields(&mut self, fields: PatientFields) {
        match &mut self.draft {
            Draft::Create(staged) => *staged = fields,
            Draft::Edit { fields: staged, .. } => *staged = fields,
        }
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Back to the initial unauthenticated state. Logout in one move.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
