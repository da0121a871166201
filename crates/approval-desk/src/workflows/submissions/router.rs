use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use super::collaborators::{bounded, ExternalService};
use super::domain::{
    AssetRef, AuditEntry, DocumentType, ListScope, Submission, SubmissionId, SubmissionStatus,
};
use super::intake::DocumentUpload;
use super::repository::{RepositoryError, SubmissionRepository};
use super::review::ReviewReport;
use super::service::{SubmissionService, WorkflowError, WorkflowReceipt};
use super::summary::StatusTally;
use crate::workflows::access::{
    can_access, AccessTarget, Action, Actor, Identity, Role, RoleDirectory, RoleDirectoryError,
    RoleStore,
};

/// Uploads arrive base64 encoded, so the limit sits above the raw image size.
const UPLOAD_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Shared handler state: the workflow plus the role directory consulted before every call.
pub struct DeskState<R, D> {
    pub submissions: Arc<SubmissionService<R>>,
    pub roles: Arc<RoleDirectory<D>>,
}

impl<R, D> Clone for DeskState<R, D> {
    fn clone(&self) -> Self {
        Self {
            submissions: Arc::clone(&self.submissions),
            roles: Arc::clone(&self.roles),
        }
    }
}

/// Router builder exposing the submission and role endpoints.
pub fn desk_router<R, D>(state: DeskState<R, D>) -> Router
where
    R: SubmissionRepository + 'static,
    D: RoleStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/submissions",
            post(upload_handler::<R, D>).get(list_handler::<R, D>),
        )
        .route("/api/v1/submissions/summary", get(summary_handler::<R, D>))
        .route("/api/v1/submissions/:submission_id", get(detail_handler::<R, D>))
        .route(
            "/api/v1/submissions/:submission_id/status",
            post(transition_handler::<R, D>),
        )
        .route(
            "/api/v1/submissions/:submission_id/reveal",
            post(reveal_handler::<R, D>),
        )
        .route("/api/v1/roles", get(list_roles_handler::<R, D>))
        .route(
            "/api/v1/roles/:identity",
            put(set_role_handler::<R, D>).delete(delete_role_handler::<R, D>),
        )
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
        .with_state(state)
}

/// What callers see of a submission. The unredacted reference is withheld when a masked
/// variant exists; it is only handed out through the reveal endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionView {
    pub id: SubmissionId,
    pub owner: Identity,
    pub document_type: DocumentType,
    pub file_name: String,
    pub submitted_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    pub display_asset_ref: AssetRef,
    /// Where the display image can be fetched; absent when the object store could not say.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_asset_ref: Option<AssetRef>,
    pub redacted: bool,
    pub review_report: ReviewReport,
    pub audit_log: Vec<AuditEntry>,
}

impl From<&Submission> for SubmissionView {
    fn from(submission: &Submission) -> Self {
        Self {
            id: submission.id.clone(),
            owner: submission.owner.clone(),
            document_type: submission.document_type,
            file_name: submission.file_name.clone(),
            submitted_at: submission.submitted_at,
            status: submission.status,
            display_asset_ref: submission.display_asset_ref.clone(),
            display_url: None,
            original_asset_ref: (!submission.redacted)
                .then(|| submission.original_asset_ref.clone()),
            redacted: submission.redacted,
            review_report: submission.review_report.clone(),
            audit_log: submission.audit_log.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UploadRequest {
    pub document_type: DocumentType,
    pub file_name: String,
    pub image_base64: String,
    #[serde(default)]
    pub redacted_image_base64: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub owner: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TransitionRequest {
    pub status: SubmissionStatus,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RoleAssignment {
    pub role: Role,
}

/// Handler-level failure, rendered as `{ "error": .. }` with the matching status code.
#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthenticated,
    Forbidden,
    BadRequest(String),
    Workflow(WorkflowError),
    Roles(RoleDirectoryError),
}

impl From<WorkflowError> for ApiError {
    fn from(value: WorkflowError) -> Self {
        Self::Workflow(value)
    }
}

impl From<RoleDirectoryError> for ApiError {
    fn from(value: RoleDirectoryError) -> Self {
        Self::Roles(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "authentication required".to_string(),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "not allowed for this identity".to_string(),
            ),
            ApiError::BadRequest(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            ApiError::Workflow(error) => {
                let status = match &error {
                    WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    WorkflowError::InvalidTransition { .. }
                    | WorkflowError::ConcurrencyConflict { .. }
                    | WorkflowError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
                    WorkflowError::NotFound(_)
                    | WorkflowError::Repository(RepositoryError::NotFound) => {
                        StatusCode::NOT_FOUND
                    }
                    WorkflowError::ExternalService(_) => StatusCode::BAD_GATEWAY,
                    WorkflowError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, error.to_string())
            }
            ApiError::Roles(error) => {
                let status = match &error {
                    RoleDirectoryError::ProtectedIdentity(_) => StatusCode::FORBIDDEN,
                    RoleDirectoryError::MissingIdentity => StatusCode::UNPROCESSABLE_ENTITY,
                    RoleDirectoryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, error.to_string())
            }
        };

        if status.is_server_error() {
            warn!(%status, error = %message, "request failed");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Resolve the caller's role; anonymous callers stop here.
fn caller_role<R, D>(state: &DeskState<R, D>, actor: &Actor) -> Result<Option<Role>, ApiError>
where
    D: RoleStore,
{
    if !actor.authenticated {
        return Err(ApiError::Unauthenticated);
    }
    Ok(state.roles.role_of(&actor.identity)?)
}

fn permit(
    actor: &Actor,
    role: Option<Role>,
    action: Action,
    target: AccessTarget<'_>,
) -> Result<(), ApiError> {
    if can_access(actor, role, action, target) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

fn decode_image(field: &str, encoded: &str) -> Result<Vec<u8>, ApiError> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|err| ApiError::BadRequest(format!("{field} is not valid base64: {err}")))
}

/// View of a submission with its display URL resolved through the object store.
async fn present<R>(service: &SubmissionService<R>, submission: &Submission) -> SubmissionView
where
    R: SubmissionRepository + 'static,
{
    let mut view = SubmissionView::from(submission);
    match bounded(
        ExternalService::ObjectStore,
        service.config().storage_timeout,
        service.collaborators().assets.url(&submission.display_asset_ref),
    )
    .await
    {
        Ok(url) => view.display_url = Some(url),
        Err(error) => warn!(submission_id = %submission.id, %error, "display url unavailable"),
    }
    view
}

async fn receipt_body<R>(
    service: &SubmissionService<R>,
    receipt: &WorkflowReceipt,
) -> serde_json::Value
where
    R: SubmissionRepository + 'static,
{
    json!({
        "submission": present(service, &receipt.submission).await,
        "warnings": receipt.warnings(),
    })
}

fn list_scope(params: &ListParams, actor: &Actor) -> ListScope {
    if params
        .scope
        .as_deref()
        .is_some_and(|scope| scope.eq_ignore_ascii_case("all"))
    {
        return ListScope::All;
    }
    match params.owner.as_deref().map(Identity::new) {
        Some(owner) if !owner.is_empty() => ListScope::Owner(owner),
        _ => ListScope::Owner(actor.identity.clone()),
    }
}

fn scope_target(scope: &ListScope) -> AccessTarget<'_> {
    match scope {
        ListScope::Owner(owner) => AccessTarget::Collection(Some(owner)),
        ListScope::All => AccessTarget::Collection(None),
    }
}

pub(crate) async fn upload_handler<R, D>(
    State(state): State<DeskState<R, D>>,
    headers: HeaderMap,
    Json(request): Json<UploadRequest>,
) -> Result<Response, ApiError>
where
    R: SubmissionRepository + 'static,
    D: RoleStore + 'static,
{
    let actor = Actor::from_headers(&headers);
    let role = caller_role(&state, &actor)?;
    permit(
        &actor,
        role,
        Action::Create,
        AccessTarget::Collection(Some(&actor.identity)),
    )?;

    let image = decode_image("image_base64", &request.image_base64)?;
    let redacted_image = request
        .redacted_image_base64
        .as_deref()
        .map(|encoded| decode_image("redacted_image_base64", encoded))
        .transpose()?;

    let receipt = state
        .submissions
        .submit_document(DocumentUpload {
            owner: actor.identity.clone(),
            document_type: request.document_type,
            file_name: request.file_name,
            image,
            redacted_image,
        })
        .await?;

    let body = receipt_body(&state.submissions, &receipt).await;
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub(crate) async fn list_handler<R, D>(
    State(state): State<DeskState<R, D>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError>
where
    R: SubmissionRepository + 'static,
    D: RoleStore + 'static,
{
    let actor = Actor::from_headers(&headers);
    let role = caller_role(&state, &actor)?;
    let scope = list_scope(&params, &actor);
    permit(&actor, role, Action::View, scope_target(&scope))?;

    let submissions = state.submissions.list_submissions(&scope, &actor.identity)?;
    let mut views = Vec::with_capacity(submissions.len());
    for submission in &submissions {
        views.push(present(&state.submissions, submission).await);
    }
    Ok((StatusCode::OK, Json(views)).into_response())
}

pub(crate) async fn summary_handler<R, D>(
    State(state): State<DeskState<R, D>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError>
where
    R: SubmissionRepository + 'static,
    D: RoleStore + 'static,
{
    let actor = Actor::from_headers(&headers);
    let role = caller_role(&state, &actor)?;
    let scope = list_scope(&params, &actor);
    permit(&actor, role, Action::View, scope_target(&scope))?;

    let submissions = state.submissions.list_submissions(&scope, &actor.identity)?;
    let tally = StatusTally::from_submissions(&submissions);
    Ok((StatusCode::OK, Json(tally)).into_response())
}

pub(crate) async fn detail_handler<R, D>(
    State(state): State<DeskState<R, D>>,
    headers: HeaderMap,
    Path(submission_id): Path<String>,
) -> Result<Response, ApiError>
where
    R: SubmissionRepository + 'static,
    D: RoleStore + 'static,
{
    let actor = Actor::from_headers(&headers);
    let role = caller_role(&state, &actor)?;
    let submission = state.submissions.get(&SubmissionId(submission_id))?;
    permit(&actor, role, Action::View, AccessTarget::Submission(&submission))?;

    let view = present(&state.submissions, &submission).await;
    Ok((StatusCode::OK, Json(view)).into_response())
}

pub(crate) async fn transition_handler<R, D>(
    State(state): State<DeskState<R, D>>,
    headers: HeaderMap,
    Path(submission_id): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> Result<Response, ApiError>
where
    R: SubmissionRepository + 'static,
    D: RoleStore + 'static,
{
    let actor = Actor::from_headers(&headers);
    let role = caller_role(&state, &actor)?;
    let submission = state.submissions.get(&SubmissionId(submission_id))?;
    permit(
        &actor,
        role,
        Action::Transition,
        AccessTarget::Submission(&submission),
    )?;

    let receipt = state
        .submissions
        .transition_status(
            &submission.id,
            request.status,
            &actor.identity,
            request.comment.as_deref(),
        )
        .await?;

    let body = receipt_body(&state.submissions, &receipt).await;
    Ok((StatusCode::OK, Json(body)).into_response())
}

pub(crate) async fn reveal_handler<R, D>(
    State(state): State<DeskState<R, D>>,
    headers: HeaderMap,
    Path(submission_id): Path<String>,
) -> Result<Response, ApiError>
where
    R: SubmissionRepository + 'static,
    D: RoleStore + 'static,
{
    let actor = Actor::from_headers(&headers);
    let role = caller_role(&state, &actor)?;
    let submission = state.submissions.get(&SubmissionId(submission_id))?;
    permit(
        &actor,
        role,
        Action::RevealSensitive,
        AccessTarget::Submission(&submission),
    )?;

    // The URL is resolved first so a store failure leaves no reveal entry behind.
    let url = bounded(
        ExternalService::ObjectStore,
        state.submissions.config().storage_timeout,
        state
            .submissions
            .collaborators()
            .assets
            .url(&submission.original_asset_ref),
    )
    .await
    .map_err(WorkflowError::from)?;
    let original = state
        .submissions
        .reveal_sensitive(&submission.id, &actor.identity)?;

    let payload = json!({
        "submission_id": submission.id,
        "original_asset_ref": original,
        "url": url,
    });
    Ok((StatusCode::OK, Json(payload)).into_response())
}

pub(crate) async fn list_roles_handler<R, D>(
    State(state): State<DeskState<R, D>>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    R: SubmissionRepository + 'static,
    D: RoleStore + 'static,
{
    let actor = Actor::from_headers(&headers);
    let role = caller_role(&state, &actor)?;
    permit(&actor, role, Action::ManageRoles, AccessTarget::RoleCollection)?;

    let records = state.roles.list_roles()?;
    Ok((StatusCode::OK, Json(records)).into_response())
}

pub(crate) async fn set_role_handler<R, D>(
    State(state): State<DeskState<R, D>>,
    headers: HeaderMap,
    Path(identity): Path<String>,
    Json(assignment): Json<RoleAssignment>,
) -> Result<Response, ApiError>
where
    R: SubmissionRepository + 'static,
    D: RoleStore + 'static,
{
    let actor = Actor::from_headers(&headers);
    let role = caller_role(&state, &actor)?;
    let identity = Identity::new(identity);
    permit(
        &actor,
        role,
        Action::ManageRoles,
        AccessTarget::RoleRecord(&identity),
    )?;

    let record = state.roles.set_role(&identity, assignment.role)?;
    Ok((StatusCode::OK, Json(record)).into_response())
}

pub(crate) async fn delete_role_handler<R, D>(
    State(state): State<DeskState<R, D>>,
    headers: HeaderMap,
    Path(identity): Path<String>,
) -> Result<Response, ApiError>
where
    R: SubmissionRepository + 'static,
    D: RoleStore + 'static,
{
    let actor = Actor::from_headers(&headers);
    let role = caller_role(&state, &actor)?;
    let identity = Identity::new(identity);
    permit(
        &actor,
        role,
        Action::ManageRoles,
        AccessTarget::RoleRecord(&identity),
    )?;

    if state.roles.delete_role(&identity)? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        let payload = json!({ "error": format!("no role assigned to {identity}") });
        Ok((StatusCode::NOT_FOUND, Json(payload)).into_response())
    }
}
