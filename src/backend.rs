//! HTTP client for the patient records backend.
//!
//! Six REST calls: signup, login, list, create, update, delete. The backend
//! sits behind the [`PatientBackend`] trait so the record manager can be
//! exercised against [`MockBackend`] in tests.
//!
//! Error responses carry a JSON body `{"error": "..."}`; when the body is
//! missing or unparseable the client falls back to a fixed per-operation
//! message.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config;
use crate::models::{Patient, PatientFields, PatientId, ProviderId};

/// Fallback when a signup rejection carries no detail.
pub const SIGNUP_FALLBACK: &str = "Signup failed";
/// Fallback when a login rejection carries no detail.
pub const LOGIN_FALLBACK: &str = "Login failed";
/// Fallback for every other rejected call.
pub const GENERIC_FALLBACK: &str = "An unknown error occurred.";

/// Errors from backend calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Cannot reach the backend at {0}")]
    Connect(String),
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    /// Non-success HTTP status. `message` is the server's `error` detail
    /// when present, otherwise the operation's fallback string.
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("Malformed response from the backend: {0}")]
    Decode(String),
    #[error("HTTP transport error: {0}")]
    Transport(String),
}

/// Operations the record manager needs from a backend.
#[allow(async_fn_in_trait)]
pub trait PatientBackend {
    async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderId, ApiError>;

    async fn log_in(&self, email: &str, password: &str) -> Result<ProviderId, ApiError>;

    /// Full current patient list. `scope` selects the provider-scoped
    /// listing; `None` asks the backend for every patient it holds.
    async fn list_patients(&self, scope: Option<ProviderId>) -> Result<Vec<Patient>, ApiError>;

    async fn create_patient(
        &self,
        provider: ProviderId,
        fields: &PatientFields,
    ) -> Result<Patient, ApiError>;

    async fn update_patient(
        &self,
        id: PatientId,
        fields: &PatientFields,
    ) -> Result<Patient, ApiError>;

    async fn delete_patient(&self, id: PatientId) -> Result<(), ApiError>;
}

// ═══════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════

/// Request body for both auth calls.
#[derive(Serialize)]
struct AuthRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Success body from both auth calls.
#[derive(Deserialize)]
struct AuthResponse {
    provider_id: ProviderId,
}

/// Structured error body the backend attaches to rejections.
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Request body for patient creation: the draft fields plus the owner.
#[derive(Serialize)]
struct CreatePatientRequest<'a> {
    #[serde(flatten)]
    fields: &'a PatientFields,
    provider_id: ProviderId,
}

/// Pick the server's detail when it said something, else the fallback.
fn detail_or(detail: Option<String>, fallback: &str) -> String {
    match detail {
        Some(detail) if !detail.is_empty() => detail,
        _ => fallback.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════
// HttpBackend — reqwest against the real service
// ═══════════════════════════════════════════════════════════

/// REST client for the patient records service.
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpBackend {
    /// Client against an explicit base URL.
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        }
    }

    /// Client against the configured backend URL.
    pub fn from_config() -> Self {
        Self::new(&config::backend_url(), config::REQUEST_TIMEOUT_SECS)
    }

    fn patients_url(&self, scope: Option<ProviderId>) -> String {
        match scope {
            Some(provider) => format!("{}/api/patients?provider_id={provider}", self.base_url),
            None => format!("{}/api/patients", self.base_url),
        }
    }

    fn patient_url(&self, id: PatientId) -> String {
        format!("{}/api/patients/{id}", self.base_url)
    }

    fn send_error(&self, e: reqwest::Error) -> ApiError {
        if e.is_connect() {
            ApiError::Connect(self.base_url.clone())
        } else if e.is_timeout() {
            ApiError::Timeout(self.timeout_secs)
        } else {
            ApiError::Transport(e.to_string())
        }
    }

    /// Turn a non-success response into `ApiError::Server`, surfacing the
    /// `{"error": ...}` detail when the body carries one.
    async fn server_error(response: reqwest::Response, fallback: &str) -> ApiError {
        let status = response.status().as_u16();
        let detail = response.json::<ErrorBody>().await.ok().map(|b| b.error);
        ApiError::Server {
            status,
            message: detail_or(detail, fallback),
        }
    }

    async fn authenticate(
        &self,
        path: &str,
        email: &str,
        password: &str,
        fallback: &str,
    ) -> Result<ProviderId, ApiError> {
        let url = format!("{}{path}", self.base_url);
        let body = AuthRequest { email, password };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::server_error(response, fallback).await);
        }

        let parsed: AuthResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(parsed.provider_id)
    }
}

impl PatientBackend for HttpBackend {
    async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderId, ApiError> {
        self.authenticate("/api/signup", email, password, SIGNUP_FALLBACK)
            .await
    }

    async fn log_in(&self, email: &str, password: &str) -> Result<ProviderId, ApiError> {
        self.authenticate("/api/login", email, password, LOGIN_FALLBACK)
            .await
    }

    async fn list_patients(&self, scope: Option<ProviderId>) -> Result<Vec<Patient>, ApiError> {
        let response = self
            .client
            .get(self.patients_url(scope))
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::server_error(response, GENERIC_FALLBACK).await);
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn create_patient(
        &self,
        provider: ProviderId,
        fields: &PatientFields,
    ) -> Result<Patient, ApiError> {
        let body = CreatePatientRequest {
            fields,
            provider_id: provider,
        };

        let response = self
            .client
            .post(self.patients_url(None))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::server_error(response, GENERIC_FALLBACK).await);
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn update_patient(
        &self,
        id: PatientId,
        fields: &PatientFields,
    ) -> Result<Patient, ApiError> {
        let response = self
            .client
            .patch(self.patient_url(id))
            .json(fields)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::server_error(response, GENERIC_FALLBACK).await);
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn delete_patient(&self, id: PatientId) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.patient_url(id))
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::server_error(response, GENERIC_FALLBACK).await);
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// MockBackend — scriptable in-memory backend for tests
// ═══════════════════════════════════════════════════════════

/// One recorded backend call, in issue order.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    SignUp { email: String },
    LogIn { email: String },
    List { scope: Option<ProviderId> },
    Create { provider: ProviderId, fields: PatientFields },
    Update { id: PatientId, fields: PatientFields },
    Delete { id: PatientId },
}

/// In-memory backend that records every call and applies mutations to its
/// own patient list, so a follow-up refresh observes them.
pub struct MockBackend {
    provider_id: ProviderId,
    patients: std::sync::Mutex<Vec<Patient>>,
    next_id: std::sync::Mutex<PatientId>,
    calls: std::sync::Mutex<Vec<MockCall>>,
    fail_next: std::sync::Mutex<Option<ApiError>>,
}

impl MockBackend {
    /// Mock that authenticates every credential pair as `provider_id`.
    pub fn new(provider_id: ProviderId) -> Self {
        Self {
            provider_id,
            patients: std::sync::Mutex::new(Vec::new()),
            next_id: std::sync::Mutex::new(1),
            calls: std::sync::Mutex::new(Vec::new()),
            fail_next: std::sync::Mutex::new(None),
        }
    }

    /// Seed the served patient list.
    pub fn with_patients(self, patients: Vec<Patient>) -> Self {
        let next = patients.iter().map(|p| p.id + 1).max().unwrap_or(1);
        *self.next_id.lock().unwrap() = next;
        *self.patients.lock().unwrap() = patients;
        self
    }

    /// Make the next call fail with `error`. One-shot.
    pub fn fail_next(&self, error: ApiError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    /// Every call issued so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: MockCall) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(call);
        match self.fail_next.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl PatientBackend for MockBackend {
    async fn sign_up(&self, email: &str, _password: &str) -> Result<ProviderId, ApiError> {
        self.record(MockCall::SignUp { email: email.to_string() })?;
        Ok(self.provider_id)
    }

    async fn log_in(&self, email: &str, _password: &str) -> Result<ProviderId, ApiError> {
        self.record(MockCall::LogIn { email: email.to_string() })?;
        Ok(self.provider_id)
    }

    async fn list_patients(&self, scope: Option<ProviderId>) -> Result<Vec<Patient>, ApiError> {
        self.record(MockCall::List { scope })?;
        Ok(self.patients.lock().unwrap().clone())
    }

    async fn create_patient(
        &self,
        provider: ProviderId,
        fields: &PatientFields,
    ) -> Result<Patient, ApiError> {
        self.record(MockCall::Create { provider, fields: fields.clone() })?;

        let mut next_id = self.next_id.lock().unwrap();
        let patient = Patient {
            id: *next_id,
            first_name: fields.first_name.clone(),
            middle_name: fields.middle_name.clone(),
            last_name: fields.last_name.clone(),
            dob: fields.dob.unwrap_or_default(),
            status: fields.status,
            address: fields.address.clone(),
        };
        *next_id += 1;
        self.patients.lock().unwrap().push(patient.clone());
        Ok(patient)
    }

    async fn update_patient(
        &self,
        id: PatientId,
        fields: &PatientFields,
    ) -> Result<Patient, ApiError> {
        self.record(MockCall::Update { id, fields: fields.clone() })?;

        let mut patients = self.patients.lock().unwrap();
        let patient = patients
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ApiError::Server {
                status: 404,
                message: format!("Patient {id} not found"),
            })?;
        patient.first_name = fields.first_name.clone();
        patient.middle_name = fields.middle_name.clone();
        patient.last_name = fields.last_name.clone();
        if let Some(dob) = fields.dob {
            patient.dob = dob;
        }
        patient.status = fields.status;
        patient.address = fields.address.clone();
        Ok(patient.clone())
    }

    async fn delete_patient(&self, id: PatientId) -> Result<(), ApiError> {
        self.record(MockCall::Delete { id })?;
        self.patients.lock().unwrap().retain(|p| p.id != id);
        Ok(())
    }
}
