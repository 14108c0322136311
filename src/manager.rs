//! Session-bound record manager.
//!
//! Owns the dashboard state and keeps it in sync with the backend. The
//! synchronization contract is deliberately blunt: every mutation is
//! followed by a wholesale list refresh instead of a local patch, so a
//! settled request can never leave the displayed list drifted from server
//! truth.
//!
//! Network calls are independent async units and never hold the state lock
//! across an await. Concurrent refreshes are ordered by a monotonic issue
//! counter: a response settles into collection state only if it belongs to
//! the latest issued refresh and the identity it was fetched for is still
//! active.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::backend::PatientBackend;
use crate::models::{Patient, PatientFields, PatientId, ProviderId};
use crate::session::SessionStore;
use crate::state::{DashboardState, Draft};

enum AuthOp {
    SignUp,
    LogIn,
}

/// The dashboard's single point of mutation: identity, collection, draft
/// and error slot all change through here.
pub struct RecordManager<B> {
    backend: B,
    store: SessionStore,
    state: RwLock<DashboardState>,
    /// Monotonic refresh counter; responses from superseded refreshes are
    /// discarded.
    refresh_issued: AtomicU64,
}

impl<B: PatientBackend> RecordManager<B> {
    pub fn new(backend: B, store: SessionStore) -> Self {
        Self {
            backend,
            store,
            state: RwLock::new(DashboardState::new()),
            refresh_issued: AtomicU64::new(0),
        }
    }

    // ── State access ────────────────────────────────────────

    /// Clone of the full state, for rendering.
    pub fn snapshot(&self) -> DashboardState {
        match self.state.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn provider(&self) -> Option<ProviderId> {
        self.snapshot().provider
    }

    pub fn patients(&self) -> Vec<Patient> {
        self.snapshot().patients
    }

    pub fn draft(&self) -> Draft {
        self.snapshot().draft
    }

    pub fn error(&self) -> Option<String> {
        self.snapshot().error
    }

    /// Run one synchronous state transition under the write lock.
    fn with_state<R>(&self, f: impl FnOnce(&mut DashboardState) -> R) -> R {
        // Transitions are short and synchronous; a poisoned lock cannot
        // leave the state half-updated, so recover the guard.
        let mut guard = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    // ── Session bootstrap ───────────────────────────────────

    /// Restore a previously saved identity, if any, and refresh for it.
    /// This is the only state restoration performed; drafts and error
    /// messages never survive a restart.
    pub async fn bootstrap(&self) {
        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read the stored session");
                None
            }
        };

        if let Some(id) = stored {
            self.with_state(|s| s.set_identity(id));
            tracing::info!(provider = id, "Restored session from durable storage");
            self.refresh().await;
        }
    }

    // ── Authentication ──────────────────────────────────────

    pub async fn sign_up(&self, email: &str, password: &str) {
        self.authenticate(AuthOp::SignUp, email, password).await;
    }

    pub async fn log_in(&self, email: &str, password: &str) {
        self.authenticate(AuthOp::LogIn, email, password).await;
    }

    /// The two auth operations are structurally identical: on success the
    /// identity is set and persisted and the first refresh is issued
    /// immediately; on failure the error slot gets the server's message and
    /// the identity remains unset.
    async fn authenticate(&self, op: AuthOp, email: &str, password: &str) {
        self.with_state(|s| s.clear_error());

        let result = match op {
            AuthOp::SignUp => self.backend.sign_up(email, password).await,
            AuthOp::LogIn => self.backend.log_in(email, password).await,
        };

        match result {
            Ok(id) => {
                self.with_state(|s| s.set_identity(id));
                if let Err(e) = self.store.save(id) {
                    tracing::warn!(error = %e, "Could not persist the provider id");
                }
                tracing::info!(provider = id, "Authenticated");
                self.refresh().await;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Authentication rejected");
                self.with_state(|s| s.set_error(e.to_string()));
            }
        }
    }

    /// Pure local logout: identity, durable storage, patient list, draft
    /// and error slot all reset. No network call.
    pub fn log_out(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Could not clear the stored session");
        }
        self.with_state(|s| s.reset());
        tracing::info!("Logged out");
    }

    // ── Collection refresh ──────────────────────────────────

    /// Fetch the active provider's full patient list and replace collection
    /// state atomically. No-op when unauthenticated.
    pub async fn refresh(&self) {
        let Some(provider) = self.provider() else {
            return;
        };

        let seq = self.next_refresh_seq();
        let result = self.backend.list_patients(Some(provider)).await;
        self.apply_refresh(seq, provider, result);
    }

    fn next_refresh_seq(&self) -> u64 {
        self.refresh_issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Settle a refresh response. Discarded unless `seq` is still the latest
    /// issued refresh and `provider` is still the active identity — a stale
    /// response must not overwrite a newer list, nor resurrect one after
    /// logout.
    fn apply_refresh(
        &self,
        seq: u64,
        provider: ProviderId,
        result: Result<Vec<Patient>, crate::backend::ApiError>,
    ) {
        if self.refresh_issued.load(Ordering::SeqCst) != seq {
            tracing::debug!(seq, "Discarding superseded refresh response");
            return;
        }

        self.with_state(|s| {
            if s.provider != Some(provider) {
                tracing::debug!(provider, "Discarding refresh for an inactive identity");
                return;
            }
            match result {
                Ok(patients) => {
                    tracing::debug!(count = patients.len(), "Patient list refreshed");
                    s.replace_patients(patients);
                }
                Err(e) => s.set_error(e.to_string()),
            }
        });
    }

    // ── Form draft ──────────────────────────────────────────

    /// Replace the staged fields, keeping the draft's current mode.
    pub fn set_draft_fields(&self, fields: PatientFields) {
        self.with_state(|s| s.set_draft_fields(fields));
    }

    /// Copy a displayed record into the draft and enter edit mode. Purely
    /// local; overwrites whatever was staged before.
    pub fn begin_edit(&self, id: PatientId) {
        self.with_state(|s| {
            if let Some(patient) = s.patients.iter().find(|p| p.id == id).cloned() {
                s.begin_edit(&patient);
            } else {
                tracing::warn!(patient = id, "Edit requested for a record not in the current list");
            }
        });
    }

    // ── Create-or-update submission ─────────────────────────

    /// Submit the draft: an edit PATCHes its target, a creation POSTs the
    /// fields under the active provider. On success the draft returns to
    /// the empty create form and the list is refreshed; on failure the
    /// error slot gets the server's detail (or the fixed fallback) and the
    /// draft is left as-is for resubmission.
    pub async fn submit(&self) {
        let (provider, draft) = self.with_state(|s| {
            s.clear_error();
            (s.provider, s.draft.clone())
        });

        let Some(provider) = provider else {
            tracing::warn!("Submit ignored: not signed in");
            return;
        };

        let outcome = match &draft {
            Draft::Edit { target, fields } => self
                .backend
                .update_patient(*target, fields)
                .await
                .map(drop),
            Draft::Create(fields) => self
                .backend
                .create_patient(provider, fields)
                .await
                .map(drop),
        };

        match outcome {
            Ok(()) => {
                self.with_state(|s| s.reset_draft());
                self.refresh().await;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Submission rejected");
                self.with_state(|s| s.set_error(e.to_string()));
            }
        }
    }

    // ── Delete ──────────────────────────────────────────────

    /// Delete a record and refresh. Confirmation is the caller's job: a
    /// declined confirmation must never reach this method.
    pub async fn delete(&self, id: PatientId) {
        self.with_state(|s| s.clear_error());

        match self.backend.delete_patient(id).await {
            Ok(()) => self.refresh().await,
            Err(e) => {
                tracing::debug!(error = %e, patient = id, "Delete rejected");
                self.with_state(|s| s.set_error(e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ApiError, MockBackend, MockCall};
    use crate::models::PatientStatus;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::new(dir.path().join("provider_id"))
    }

    fn jane_fields() -> PatientFields {
        PatientFields {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            dob: NaiveDate::from_ymd_opt(1990, 1, 1),
            status: PatientStatus::Inquiry,
            address: "1 Main St".into(),
            ..PatientFields::default()
        }
    }

    fn patient(id: PatientId) -> Patient {
        Patient {
            id,
            first_name: "Jane".into(),
            middle_name: None,
            last_name: "Doe".into(),
            dob: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            status: PatientStatus::Inquiry,
            address: "1 Main St".into(),
        }
    }

    fn server_error(status: u16, message: &str) -> ApiError {
        ApiError::Server {
            status,
            message: message.into(),
        }
    }

    #[tokio::test]
    async fn login_sets_identity_persists_it_and_refreshes() {
        let dir = tempdir().unwrap();
        let backend = MockBackend::new(7).with_patients(vec![patient(1)]);
        let manager = RecordManager::new(backend, store_in(&dir));

        manager.log_in("a@b.com", "x").await;

        assert_eq!(manager.provider(), Some(7));
        assert_eq!(manager.patients().len(), 1);
        assert!(manager.error().is_none());

        // Durable storage holds the string form.
        let raw = std::fs::read_to_string(dir.path().join("provider_id")).unwrap();
        assert_eq!(raw, "7");

        // Read-your-writes: the refresh went out for the new identity.
        assert_eq!(
            manager.backend.calls(),
            vec![
                MockCall::LogIn { email: "a@b.com".into() },
                MockCall::List { scope: Some(7) },
            ]
        );
    }

    #[tokio::test]
    async fn signup_is_structurally_identical_to_login() {
        let dir = tempdir().unwrap();
        let manager = RecordManager::new(MockBackend::new(9), store_in(&dir));

        manager.sign_up("new@b.com", "x").await;

        assert_eq!(manager.provider(), Some(9));
        assert_eq!(
            manager.backend.calls(),
            vec![
                MockCall::SignUp { email: "new@b.com".into() },
                MockCall::List { scope: Some(9) },
            ]
        );
    }

    #[tokio::test]
    async fn failed_login_sets_error_and_leaves_identity_unset() {
        let dir = tempdir().unwrap();
        let manager = RecordManager::new(MockBackend::new(7), store_in(&dir));
        manager.backend.fail_next(server_error(401, "Invalid email or password"));

        manager.log_in("a@b.com", "wrong").await;

        assert_eq!(manager.provider(), None);
        assert_eq!(manager.error().as_deref(), Some("Invalid email or password"));
        assert_eq!(manager.store.load().unwrap(), None);
        // No refresh for a rejected login.
        assert_eq!(manager.backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn auth_clears_a_previous_error_before_the_call() {
        let dir = tempdir().unwrap();
        let manager = RecordManager::new(MockBackend::new(7), store_in(&dir));
        manager.backend.fail_next(server_error(401, "Invalid email or password"));
        manager.log_in("a@b.com", "wrong").await;
        assert!(manager.error().is_some());

        manager.log_in("a@b.com", "right").await;
        assert!(manager.error().is_none());
    }

    #[tokio::test]
    async fn bootstrap_restores_the_stored_session_and_refreshes() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.save(7).unwrap();
        let backend = MockBackend::new(7).with_patients(vec![patient(1), patient(2)]);
        let manager = RecordManager::new(backend, store);

        manager.bootstrap().await;

        assert_eq!(manager.provider(), Some(7));
        assert_eq!(manager.patients().len(), 2);
        assert_eq!(
            manager.backend.calls(),
            vec![MockCall::List { scope: Some(7) }]
        );
    }

    #[tokio::test]
    async fn bootstrap_without_a_stored_session_stays_unauthenticated() {
        let dir = tempdir().unwrap();
        let manager = RecordManager::new(MockBackend::new(7), store_in(&dir));

        manager.bootstrap().await;

        assert_eq!(manager.provider(), None);
        assert!(manager.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn logout_resets_everything_without_a_network_call() {
        let dir = tempdir().unwrap();
        let backend = MockBackend::new(7).with_patients(vec![patient(1)]);
        let manager = RecordManager::new(backend, store_in(&dir));
        manager.log_in("a@b.com", "x").await;
        manager.begin_edit(1);
        let calls_before = manager.backend.calls().len();

        manager.log_out();

        assert_eq!(manager.snapshot(), DashboardState::default());
        assert_eq!(manager.store.load().unwrap(), None);
        assert_eq!(manager.backend.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn create_submit_resets_the_draft_and_refreshes() {
        let dir = tempdir().unwrap();
        let manager = RecordManager::new(MockBackend::new(7), store_in(&dir));
        manager.log_in("a@b.com", "x").await;

        manager.set_draft_fields(jane_fields());
        manager.submit().await;

        assert_eq!(manager.draft(), Draft::default());
        assert_eq!(manager.patients().len(), 1);
        assert!(manager.error().is_none());

        let calls = manager.backend.calls();
        assert_eq!(
            calls[2],
            MockCall::Create { provider: 7, fields: jane_fields() }
        );
        assert_eq!(calls[3], MockCall::List { scope: Some(7) });
    }

    #[tokio::test]
    async fn edit_submit_patches_the_target_and_exits_edit_mode() {
        let dir = tempdir().unwrap();
        let backend = MockBackend::new(7).with_patients(vec![patient(42)]);
        let manager = RecordManager::new(backend, store_in(&dir));
        manager.log_in("a@b.com", "x").await;

        manager.begin_edit(42);
        let mut changed = manager.draft().fields().clone();
        changed.status = PatientStatus::Active;
        manager.set_draft_fields(changed.clone());
        manager.submit().await;

        assert_eq!(manager.draft(), Draft::default());
        assert_eq!(manager.patients()[0].status, PatientStatus::Active);

        let calls = manager.backend.calls();
        assert_eq!(calls[2], MockCall::Update { id: 42, fields: changed });
        assert_eq!(calls[3], MockCall::List { scope: Some(7) });
    }

    #[tokio::test]
    async fn failed_create_keeps_the_draft_for_resubmission() {
        let dir = tempdir().unwrap();
        let manager = RecordManager::new(MockBackend::new(7), store_in(&dir));
        manager.log_in("a@b.com", "x").await;

        manager.set_draft_fields(jane_fields());
        manager.backend.fail_next(server_error(
            400,
            "Name field is too long. Please shorten and try again.",
        ));
        manager.submit().await;

        assert_eq!(
            manager.error().as_deref(),
            Some("Name field is too long. Please shorten and try again.")
        );
        assert_eq!(manager.draft().fields(), &jane_fields());
        assert!(manager.patients().is_empty());
    }

    #[tokio::test]
    async fn failed_edit_surfaces_server_detail_and_stays_in_edit_mode() {
        let dir = tempdir().unwrap();
        let backend = MockBackend::new(7).with_patients(vec![patient(42)]);
        let manager = RecordManager::new(backend, store_in(&dir));
        manager.log_in("a@b.com", "x").await;

        manager.begin_edit(42);
        manager.backend.fail_next(server_error(404, "Patient 42 not found"));
        manager.submit().await;

        assert_eq!(manager.error().as_deref(), Some("Patient 42 not found"));
        assert_eq!(manager.draft().target(), Some(42));
    }

    #[tokio::test]
    async fn submit_clears_the_error_slot_before_the_call_resolves() {
        let dir = tempdir().unwrap();
        let manager = RecordManager::new(MockBackend::new(7), store_in(&dir));
        manager.log_in("a@b.com", "x").await;

        manager.backend.fail_next(server_error(500, "first failure"));
        manager.submit().await;
        assert!(manager.error().is_some());

        manager.set_draft_fields(jane_fields());
        manager.submit().await;
        assert!(manager.error().is_none());
    }

    #[tokio::test]
    async fn submit_while_unauthenticated_sends_nothing() {
        let dir = tempdir().unwrap();
        let manager = RecordManager::new(MockBackend::new(7), store_in(&dir));

        manager.set_draft_fields(jane_fields());
        manager.submit().await;

        assert!(manager.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn begin_edit_of_an_unknown_id_leaves_the_draft_untouched() {
        let dir = tempdir().unwrap();
        let backend = MockBackend::new(7).with_patients(vec![patient(1)]);
        let manager = RecordManager::new(backend, store_in(&dir));
        manager.log_in("a@b.com", "x").await;

        manager.begin_edit(99);

        assert_eq!(manager.draft(), Draft::default());
    }

    #[tokio::test]
    async fn confirmed_delete_issues_the_request_then_refreshes() {
        let dir = tempdir().unwrap();
        let backend = MockBackend::new(7).with_patients(vec![patient(42)]);
        let manager = RecordManager::new(backend, store_in(&dir));
        manager.log_in("a@b.com", "x").await;

        manager.delete(42).await;

        assert!(manager.patients().is_empty());
        let calls = manager.backend.calls();
        assert_eq!(calls[2], MockCall::Delete { id: 42 });
        assert_eq!(calls[3], MockCall::List { scope: Some(7) });
    }

    #[tokio::test]
    async fn failed_delete_surfaces_server_detail() {
        let dir = tempdir().unwrap();
        let backend = MockBackend::new(7).with_patients(vec![patient(42)]);
        let manager = RecordManager::new(backend, store_in(&dir));
        manager.log_in("a@b.com", "x").await;

        manager.backend.fail_next(server_error(403, "Record belongs to another provider"));
        manager.delete(42).await;

        assert_eq!(
            manager.error().as_deref(),
            Some("Record belongs to another provider")
        );
        // The list was not refreshed, so the record is still displayed.
        assert_eq!(manager.patients().len(), 1);
    }

    #[tokio::test]
    async fn refresh_is_idempotent_without_intervening_mutations() {
        let dir = tempdir().unwrap();
        let backend = MockBackend::new(7).with_patients(vec![patient(1), patient(2)]);
        let manager = RecordManager::new(backend, store_in(&dir));
        manager.log_in("a@b.com", "x").await;

        manager.refresh().await;
        let first = manager.patients();
        manager.refresh().await;
        let second = manager.patients();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn refresh_while_unauthenticated_is_a_no_op() {
        let dir = tempdir().unwrap();
        let manager = RecordManager::new(MockBackend::new(7), store_in(&dir));

        manager.refresh().await;

        assert!(manager.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn refresh_failure_keeps_the_stale_list_and_sets_the_error() {
        let dir = tempdir().unwrap();
        let backend = MockBackend::new(7).with_patients(vec![patient(1)]);
        let manager = RecordManager::new(backend, store_in(&dir));
        manager.log_in("a@b.com", "x").await;

        manager.backend.fail_next(server_error(500, "backend unavailable"));
        manager.refresh().await;

        assert_eq!(manager.patients().len(), 1);
        assert_eq!(manager.error().as_deref(), Some("backend unavailable"));
    }

    // ── Refresh sequencing ──────────────────────────────────

    #[tokio::test]
    async fn a_superseded_refresh_response_is_discarded() {
        let dir = tempdir().unwrap();
        let manager = RecordManager::new(MockBackend::new(7), store_in(&dir));
        manager.log_in("a@b.com", "x").await;

        let stale_seq = manager.next_refresh_seq();
        let fresh_seq = manager.next_refresh_seq();

        manager.apply_refresh(fresh_seq, 7, Ok(vec![patient(2)]));
        manager.apply_refresh(stale_seq, 7, Ok(vec![patient(1)]));

        let ids: Vec<_> = manager.patients().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[tokio::test]
    async fn a_refresh_for_a_logged_out_identity_is_discarded() {
        let dir = tempdir().unwrap();
        let manager = RecordManager::new(MockBackend::new(7), store_in(&dir));
        manager.log_in("a@b.com", "x").await;

        let seq = manager.next_refresh_seq();
        manager.log_out();
        manager.apply_refresh(seq, 7, Ok(vec![patient(1)]));

        assert!(manager.patients().is_empty());
        assert_eq!(manager.provider(), None);
    }

    /// Backend whose second list call stalls until the third completes, so
    /// an older refresh settles after a newer one.
    struct RacingBackend {
        list_calls: AtomicU64,
        gate: tokio::sync::Notify,
    }

    impl RacingBackend {
        fn new() -> Self {
            Self {
                list_calls: AtomicU64::new(0),
                gate: tokio::sync::Notify::new(),
            }
        }
    }

    impl PatientBackend for RacingBackend {
        async fn sign_up(&self, _: &str, _: &str) -> Result<ProviderId, ApiError> {
            unimplemented!()
        }

        async fn log_in(&self, _: &str, _: &str) -> Result<ProviderId, ApiError> {
            Ok(7)
        }

        async fn list_patients(&self, _: Option<ProviderId>) -> Result<Vec<Patient>, ApiError> {
            match self.list_calls.fetch_add(1, Ordering::SeqCst) {
                // Login's immediate refresh.
                0 => Ok(vec![]),
                // The stale refresh: parked until the fresh one settles.
                1 => {
                    self.gate.notified().await;
                    Ok(vec![patient(1)])
                }
                _ => {
                    self.gate.notify_one();
                    Ok(vec![patient(2)])
                }
            }
        }

        async fn create_patient(
            &self,
            _: ProviderId,
            _: &PatientFields,
        ) -> Result<Patient, ApiError> {
            unimplemented!()
        }

        async fn update_patient(
            &self,
            _: PatientId,
            _: &PatientFields,
        ) -> Result<Patient, ApiError> {
            unimplemented!()
        }

        async fn delete_patient(&self, _: PatientId) -> Result<(), ApiError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn the_latest_issued_refresh_wins_a_race() {
        let dir = tempdir().unwrap();
        let manager = std::sync::Arc::new(RecordManager::new(RacingBackend::new(), store_in(&dir)));
        manager.log_in("a@b.com", "x").await;

        let stale = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.refresh().await })
        };
        // Let the stale refresh issue its sequence number and park.
        tokio::task::yield_now().await;

        manager.refresh().await;
        stale.await.unwrap();

        let ids: Vec<_> = manager.patients().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2]);
    }
}
