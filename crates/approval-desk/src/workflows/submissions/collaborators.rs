//! Seams to the external services the workflow depends on: the content reviewer, the object
//! store holding uploaded images, and the e-mail notifier.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::domain::{AssetRef, DocumentType};
use super::review::ReviewReport;

/// Failure reported by an adapter; the workflow attaches which service it came from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CollaboratorFailure(pub String);

impl CollaboratorFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalService {
    ContentReviewer,
    ObjectStore,
    Notifier,
}

impl fmt::Display for ExternalService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExternalService::ContentReviewer => "content reviewer",
            ExternalService::ObjectStore => "object store",
            ExternalService::Notifier => "notifier",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExternalServiceError {
    #[error("{service} timed out after {timeout:?}")]
    Timeout {
        service: ExternalService,
        timeout: Duration,
    },
    #[error("{service} failed: {reason}")]
    Failed {
        service: ExternalService,
        reason: String,
    },
    #[error("content reviewer returned no usable output")]
    EmptyReview,
}

impl ExternalServiceError {
    pub fn service(&self) -> ExternalService {
        match self {
            ExternalServiceError::Timeout { service, .. }
            | ExternalServiceError::Failed { service, .. } => *service,
            ExternalServiceError::EmptyReview => ExternalService::ContentReviewer,
        }
    }
}

/// Await `call` for at most `limit`, folding timeouts and adapter failures into one error.
pub(crate) async fn bounded<T, F>(
    service: ExternalService,
    limit: Duration,
    call: F,
) -> Result<T, ExternalServiceError>
where
    F: Future<Output = Result<T, CollaboratorFailure>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(CollaboratorFailure(reason))) => {
            Err(ExternalServiceError::Failed { service, reason })
        }
        Err(_) => Err(ExternalServiceError::Timeout {
            service,
            timeout: limit,
        }),
    }
}

/// AI-backed analysis of an uploaded image. Output is not deterministic.
#[async_trait]
pub trait ContentReviewer: Send + Sync {
    async fn analyze(
        &self,
        image: &[u8],
        document_type: DocumentType,
    ) -> Result<ReviewReport, CollaboratorFailure>;
}

/// Path inside the object store. Segments are sanitized so uploads cannot escape their folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetPath(String);

impl AssetPath {
    /// `images/{owner}/{stamp}_{variant}{file}`; `variant` is empty for originals.
    pub fn for_upload(owner: &str, stamp: &str, variant: Option<&str>, file_name: &str) -> Self {
        let prefix = variant
            .map(|variant| format!("{}_", sanitize_segment(variant)))
            .unwrap_or_default();
        Self(format!(
            "images/{}/{}_{}{}",
            sanitize_segment(owner),
            sanitize_segment(stamp),
            prefix,
            sanitize_segment(file_name),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keep a single path segment: separators and parent references are replaced.
pub fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.replace("..", "_");
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// Binary asset storage. Writes never overwrite an existing path.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        path: &AssetPath,
        bytes: Vec<u8>,
        content_type: &mime::Mime,
    ) -> Result<AssetRef, CollaboratorFailure>;

    async fn url(&self, asset: &AssetRef) -> Result<String, CollaboratorFailure>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: mime::Mime,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

/// Outbound e-mail. Best effort: callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), CollaboratorFailure>;
}

/// The external services a `SubmissionService` talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub reviewer: Arc<dyn ContentReviewer>,
    pub assets: Arc<dyn ObjectStore>,
    pub notifier: Arc<dyn Notifier>,
}
