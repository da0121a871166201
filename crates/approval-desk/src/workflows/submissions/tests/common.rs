use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::to_bytes;
use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::config::{ReviewFailurePolicy, WorkflowConfig};
use crate::workflows::access::{Identity, InMemoryRoleStore, Role, RoleDirectory};
use crate::workflows::submissions::collaborators::{
    AssetPath, CollaboratorFailure, Collaborators, ContentReviewer, Notification, Notifier,
    ObjectStore,
};
use crate::workflows::submissions::domain::{
    AssetRef, AssetRefs, DocumentType, NewSubmission, Submission, SubmissionId,
};
use crate::workflows::submissions::intake::DocumentUpload;
use crate::workflows::submissions::memory::InMemorySubmissionRepository;
use crate::workflows::submissions::repository::{RepositoryError, SubmissionRepository};
use crate::workflows::submissions::review::{ChecklistItem, ComplianceChecklist, ReviewReport};
use crate::workflows::submissions::service::{Clock, SubmissionService};
use crate::workflows::submissions::storage::InMemoryObjectStore;
use crate::workflows::submissions::DeskState;

pub(super) const OWNER: &str = "collab@example.com";
pub(super) const OTHER_OWNER: &str = "other@example.com";
pub(super) const SUPERVISOR: &str = "supervisor@example.com";
pub(super) const ADMIN: &str = "admin@example.com";
pub(super) const INBOX: &str = "inbox@example.com";

/// Clock that advances one minute per reading, starting at a fixed instant.
pub(super) struct SteppingClock {
    start: DateTime<Utc>,
    ticks: AtomicUsize,
}

impl SteppingClock {
    pub(super) fn new() -> Self {
        Self {
            start: Utc
                .with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
                .single()
                .expect("valid start"),
            ticks: AtomicUsize::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) as i64;
        self.start + chrono::Duration::minutes(tick)
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), CollaboratorFailure> {
        self.sent.lock().expect("notifier lock").push(notification);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _notification: Notification) -> Result<(), CollaboratorFailure> {
        Err(CollaboratorFailure::new("smtp relay refused connection"))
    }
}

/// Reviewer with a scripted answer and optional delay.
pub(super) struct StubReviewer {
    pub(super) answer: Result<ReviewReport, CollaboratorFailure>,
    pub(super) delay: Option<Duration>,
    pub(super) calls: AtomicUsize,
}

impl StubReviewer {
    pub(super) fn answering(report: ReviewReport) -> Self {
        Self {
            answer: Ok(report),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn failing(reason: &str) -> Self {
        Self {
            answer: Err(CollaboratorFailure::new(reason)),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn slow(delay: Duration) -> Self {
        Self {
            answer: Ok(checklist_report()),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ContentReviewer for StubReviewer {
    async fn analyze(
        &self,
        _image: &[u8],
        _document_type: DocumentType,
    ) -> Result<ReviewReport, CollaboratorFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answer.clone()
    }
}

/// Wraps the in-memory repository and fails the next `conflicts` replaces with a stale
/// revision, as if another writer had committed first.
pub(super) struct FlakyRepository {
    pub(super) inner: InMemorySubmissionRepository,
    conflicts: AtomicUsize,
    pub(super) replace_calls: AtomicUsize,
}

impl FlakyRepository {
    pub(super) fn with_conflicts(conflicts: usize) -> Self {
        Self {
            inner: InMemorySubmissionRepository::default(),
            conflicts: AtomicUsize::new(conflicts),
            replace_calls: AtomicUsize::new(0),
        }
    }
}

impl SubmissionRepository for FlakyRepository {
    fn insert(&self, submission: Submission) -> Result<Submission, RepositoryError> {
        self.inner.insert(submission)
    }

    fn fetch(&self, id: &SubmissionId) -> Result<Option<Submission>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn by_owner(&self, owner: &Identity) -> Result<Vec<Submission>, RepositoryError> {
        self.inner.by_owner(owner)
    }

    fn all(&self) -> Result<Vec<Submission>, RepositoryError> {
        self.inner.all()
    }

    fn replace(
        &self,
        submission: Submission,
        expected_revision: u64,
    ) -> Result<Submission, RepositoryError> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::RevisionMismatch {
                expected: expected_revision,
                found: expected_revision + 1,
            });
        }
        self.inner.replace(submission, expected_revision)
    }
}

pub(super) struct UnavailableRepository;

impl SubmissionRepository for UnavailableRepository {
    fn insert(&self, _submission: Submission) -> Result<Submission, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &SubmissionId) -> Result<Option<Submission>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn by_owner(&self, _owner: &Identity) -> Result<Vec<Submission>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn all(&self) -> Result<Vec<Submission>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn replace(
        &self,
        _submission: Submission,
        _expected_revision: u64,
    ) -> Result<Submission, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// In-memory store that refuses writes once its allowance is spent, or refuses URL lookups.
pub(super) struct UnreliableObjectStore {
    pub(super) inner: InMemoryObjectStore,
    puts_allowed: AtomicUsize,
    urls_fail: bool,
}

impl UnreliableObjectStore {
    pub(super) fn failing_after(puts: usize) -> Self {
        Self {
            inner: InMemoryObjectStore::default(),
            puts_allowed: AtomicUsize::new(puts),
            urls_fail: false,
        }
    }

    pub(super) fn without_urls() -> Self {
        Self {
            inner: InMemoryObjectStore::default(),
            puts_allowed: AtomicUsize::new(usize::MAX),
            urls_fail: true,
        }
    }
}

#[async_trait]
impl ObjectStore for UnreliableObjectStore {
    async fn put(
        &self,
        path: &AssetPath,
        bytes: Vec<u8>,
        content_type: &mime::Mime,
    ) -> Result<AssetRef, CollaboratorFailure> {
        let spent = self
            .puts_allowed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_err();
        if spent {
            return Err(CollaboratorFailure::new("bucket quota exceeded"));
        }
        self.inner.put(path, bytes, content_type).await
    }

    async fn url(&self, asset: &AssetRef) -> Result<String, CollaboratorFailure> {
        if self.urls_fail {
            return Err(CollaboratorFailure::new("signing service unreachable"));
        }
        self.inner.url(asset).await
    }
}

pub(super) fn checklist_report() -> ReviewReport {
    ReviewReport::Checklist(ComplianceChecklist::from_items(
        vec![
            ChecklistItem {
                requirement: "Issue date is present".to_string(),
                satisfied: true,
                note: None,
            },
            ChecklistItem {
                requirement: "Physician signature or stamp is present".to_string(),
                satisfied: false,
                note: Some("stamp is illegible".to_string()),
            },
        ],
        "signature needs a closer look",
    ))
}

pub(super) fn workflow_config() -> WorkflowConfig {
    WorkflowConfig {
        review_timeout: Duration::from_millis(200),
        storage_timeout: Duration::from_millis(200),
        notify_timeout: Duration::from_millis(200),
        max_conflict_retries: 3,
        review_failure_policy: ReviewFailurePolicy::FailClosed,
        supervisor_inbox: Some(INBOX.to_string()),
        mail_sender: "desk@example.com".to_string(),
    }
}

pub(super) fn new_submission(owner: &str, redacted: bool) -> NewSubmission {
    let original = AssetRef(format!("images/{owner}/original.jpg"));
    let assets = if redacted {
        AssetRefs::with_redacted(original, AssetRef(format!("images/{owner}/redacted.jpg")))
    } else {
        AssetRefs::original_only(original)
    };
    NewSubmission {
        owner: Identity::new(owner),
        document_type: DocumentType::MedicalCertificate,
        file_name: "atestado.jpg".to_string(),
        assets,
        review_report: checklist_report(),
    }
}

pub(super) fn upload(owner: &str) -> DocumentUpload {
    DocumentUpload {
        owner: Identity::new(owner),
        document_type: DocumentType::MedicalCertificate,
        file_name: "atestado.jpg".to_string(),
        image: vec![0xff, 0xd8, 0xff, 0xe0],
        redacted_image: Some(vec![0xff, 0xd8, 0x00, 0x00]),
    }
}

/// Everything a test may want to poke at after driving the service.
pub(super) struct Harness<R> {
    pub(super) service: SubmissionService<R>,
    pub(super) repository: Arc<R>,
    pub(super) assets: InMemoryObjectStore,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) reviewer: Arc<StubReviewer>,
}

pub(super) fn harness_with<R>(
    repository: R,
    reviewer: StubReviewer,
    config: WorkflowConfig,
) -> Harness<R>
where
    R: SubmissionRepository + 'static,
{
    let repository = Arc::new(repository);
    let assets = InMemoryObjectStore::default();
    let notifier = Arc::new(RecordingNotifier::default());
    let reviewer = Arc::new(reviewer);
    let collaborators = Collaborators {
        reviewer: reviewer.clone(),
        assets: Arc::new(assets.clone()),
        notifier: notifier.clone(),
    };
    let service = SubmissionService::new(repository.clone(), collaborators, config)
        .with_clock(Arc::new(SteppingClock::new()));

    Harness {
        service,
        repository,
        assets,
        notifier,
        reviewer,
    }
}

pub(super) fn build_service() -> Harness<InMemorySubmissionRepository> {
    harness_with(
        InMemorySubmissionRepository::default(),
        StubReviewer::answering(checklist_report()),
        workflow_config(),
    )
}

/// Service over a fresh in-memory repository with the given object store.
pub(super) fn service_with_store(
    assets: Arc<dyn ObjectStore>,
) -> (
    SubmissionService<InMemorySubmissionRepository>,
    Arc<InMemorySubmissionRepository>,
    Arc<RecordingNotifier>,
) {
    let repository = Arc::new(InMemorySubmissionRepository::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let collaborators = Collaborators {
        reviewer: Arc::new(StubReviewer::answering(checklist_report())),
        assets,
        notifier: notifier.clone(),
    };
    let service = SubmissionService::new(repository.clone(), collaborators, workflow_config())
        .with_clock(Arc::new(SteppingClock::new()));
    (service, repository, notifier)
}

pub(super) fn role_directory() -> RoleDirectory<InMemoryRoleStore> {
    let store = InMemoryRoleStore::with_roles([
        (Identity::new(OWNER), Role::Collaborator),
        (Identity::new(OTHER_OWNER), Role::Collaborator),
        (Identity::new(SUPERVISOR), Role::Supervisor),
    ]);
    RoleDirectory::new(store, ADMIN)
}

pub(super) fn desk_state<R>(service: SubmissionService<R>) -> DeskState<R, InMemoryRoleStore>
where
    R: SubmissionRepository + 'static,
{
    DeskState {
        submissions: Arc::new(service),
        roles: Arc::new(role_directory()),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("valid json")
}

pub(super) async fn assert_error_status(response: Response, status: StatusCode) -> Value {
    assert_eq!(response.status(), status);
    let payload = read_json_body(response).await;
    assert!(payload.get("error").is_some(), "missing error field: {payload}");
    payload
}
