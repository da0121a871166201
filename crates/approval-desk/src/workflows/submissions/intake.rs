use tracing::{info, warn};

use super::collaborators::{
    bounded, sanitize_segment, AssetPath, Attachment, ExternalService, ExternalServiceError,
    Notification,
};
use super::domain::{AssetRefs, DocumentType, NewSubmission};
use super::repository::SubmissionRepository;
use super::review::ReviewReport;
use super::service::{SubmissionService, WorkflowError, WorkflowReceipt};
use crate::config::ReviewFailurePolicy;
use crate::workflows::access::Identity;

/// An image a collaborator uploads, with an optional masked variant.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub owner: Identity,
    pub document_type: DocumentType,
    pub file_name: String,
    pub image: Vec<u8>,
    /// Variant with sensitive regions (e.g. a diagnosis code) obscured.
    pub redacted_image: Option<Vec<u8>>,
}

impl DocumentUpload {
    fn content_type(&self) -> mime::Mime {
        mime_guess::from_path(&self.file_name).first_or_octet_stream()
    }
}

impl<R> SubmissionService<R>
where
    R: SubmissionRepository + 'static,
{
    /// Review, store and record an upload, then notify the supervisor inbox and the owner.
    ///
    /// Reviewer and storage failures abort before any record is persisted. An original already
    /// written when a later step fails stays in the object store unreferenced; the store has no
    /// delete. Notifications are best effort and reported on the receipt.
    pub async fn submit_document(
        &self,
        upload: DocumentUpload,
    ) -> Result<WorkflowReceipt, WorkflowError> {
        if upload.owner.is_empty() {
            return Err(WorkflowError::Validation(
                "owner identity is required".to_string(),
            ));
        }
        if upload.file_name.trim().is_empty() {
            return Err(WorkflowError::Validation("file name is required".to_string()));
        }
        if upload.image.is_empty() {
            return Err(WorkflowError::Validation("uploaded image is empty".to_string()));
        }
        if upload
            .redacted_image
            .as_ref()
            .is_some_and(|bytes| bytes.is_empty())
        {
            return Err(WorkflowError::Validation(
                "redacted image is empty".to_string(),
            ));
        }

        let review_report = self.review(&upload).await?;

        let content_type = upload.content_type();
        let file_name = sanitize_segment(&upload.file_name);
        let stamp = self.clock.now().format("%Y%m%dT%H%M%S%3f").to_string();
        let original_path = AssetPath::for_upload(upload.owner.as_str(), &stamp, None, &file_name);
        let original = bounded(
            ExternalService::ObjectStore,
            self.config.storage_timeout,
            self.collaborators
                .assets
                .put(&original_path, upload.image.clone(), &content_type),
        )
        .await?;

        let redacted = match &upload.redacted_image {
            Some(bytes) => {
                let path = AssetPath::for_upload(
                    upload.owner.as_str(),
                    &stamp,
                    Some("redacted"),
                    &file_name,
                );
                Some(
                    bounded(
                        ExternalService::ObjectStore,
                        self.config.storage_timeout,
                        self.collaborators.assets.put(&path, bytes.clone(), &content_type),
                    )
                    .await?,
                )
            }
            None => None,
        };

        let submission = self.create_submission(NewSubmission {
            owner: upload.owner.clone(),
            document_type: upload.document_type,
            file_name: file_name.clone(),
            assets: AssetRefs { original, redacted },
            review_report,
        })?;

        let mut notifications = Vec::with_capacity(2);
        match &self.config.supervisor_inbox {
            Some(inbox) => {
                let attachment_bytes = upload
                    .redacted_image
                    .clone()
                    .unwrap_or_else(|| upload.image.clone());
                let body = format!(
                    "Hello,\n\nA new {} was sent by {}.\n\nAutomated review:\n{}\n{}\n{}\n\nThis is an automated message.",
                    submission.document_type.label(),
                    submission.owner,
                    "-".repeat(50),
                    submission.review_report.summary(),
                    "-".repeat(50),
                );
                notifications.push(
                    self.notify(Notification {
                        to: inbox.clone(),
                        subject: format!("New document received from {}", submission.owner),
                        body,
                        attachment: Some(Attachment {
                            file_name: file_name.clone(),
                            content_type,
                            bytes: attachment_bytes,
                        }),
                    })
                    .await,
                );
            }
            None => warn!(
                submission_id = %submission.id,
                "no supervisor inbox configured; skipping supervisor e-mail"
            ),
        }

        notifications.push(
            self.notify(Notification {
                to: submission.owner.to_string(),
                subject: "Document submission confirmation".to_string(),
                body: format!(
                    "Hello,\n\nThis confirms that {} and its automated review were sent to your supervisor.\n\nThis is an automated message.",
                    submission.file_name
                ),
                attachment: None,
            })
            .await,
        );

        info!(
            submission_id = %submission.id,
            delivered = notifications.iter().filter(|n| n.delivered()).count(),
            "document intake complete"
        );

        Ok(WorkflowReceipt {
            submission,
            notifications,
        })
    }

    async fn review(&self, upload: &DocumentUpload) -> Result<ReviewReport, WorkflowError> {
        let result = bounded(
            ExternalService::ContentReviewer,
            self.config.review_timeout,
            self.collaborators
                .reviewer
                .analyze(&upload.image, upload.document_type),
        )
        .await
        .and_then(|report| {
            if report.is_empty() || report.is_unavailable() {
                Err(ExternalServiceError::EmptyReview)
            } else {
                Ok(report)
            }
        });

        match (result, self.config.review_failure_policy) {
            (Ok(report), _) => Ok(report),
            (Err(error), ReviewFailurePolicy::FailClosed) => {
                warn!(owner = %upload.owner, %error, "review failed; submission aborted");
                Err(error.into())
            }
            (Err(error), ReviewFailurePolicy::ProceedUnreviewed) => {
                warn!(owner = %upload.owner, %error, "review failed; storing unreviewed submission");
                Ok(ReviewReport::Unavailable {
                    reason: error.to_string(),
                })
            }
        }
    }
}
