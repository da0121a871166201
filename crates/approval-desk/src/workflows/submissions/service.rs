use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::collaborators::{
    bounded, Collaborators, ExternalService, ExternalServiceError, Notification,
};
use super::domain::{
    AssetRef, AuditEntry, AuditEvent, ListScope, NewSubmission, Submission, SubmissionId,
    SubmissionStatus,
};
use super::repository::{RepositoryError, SubmissionRepository};
use crate::config::WorkflowConfig;
use crate::workflows::access::Identity;

/// Source of "now" for submission and audit timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Delivery result for one outbound notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOutcome {
    pub recipient: String,
    pub error: Option<String>,
}

impl NotificationOutcome {
    pub fn delivered(&self) -> bool {
        self.error.is_none()
    }
}

/// Committed submission state plus what happened to the follow-up notifications.
#[derive(Debug, Clone)]
pub struct WorkflowReceipt {
    pub submission: Submission,
    pub notifications: Vec<NotificationOutcome>,
}

impl WorkflowReceipt {
    /// Human readable warnings for notifications that did not go out.
    pub fn warnings(&self) -> Vec<String> {
        self.notifications
            .iter()
            .filter_map(|outcome| {
                outcome
                    .error
                    .as_ref()
                    .map(|error| format!("notification to {} failed: {error}", outcome.recipient))
            })
            .collect()
    }
}

/// Sole writer of submission state after creation.
///
/// Authorization is not checked here; callers consult the access policy first.
pub struct SubmissionService<R> {
    repository: Arc<R>,
    pub(super) collaborators: Collaborators,
    pub(super) config: WorkflowConfig,
    pub(super) clock: Arc<dyn Clock>,
}

impl<R> SubmissionService<R>
where
    R: SubmissionRepository + 'static,
{
    pub fn new(repository: Arc<R>, collaborators: Collaborators, config: WorkflowConfig) -> Self {
        Self {
            repository,
            collaborators,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Persist a new pending submission with an empty audit log.
    pub fn create_submission(&self, new: NewSubmission) -> Result<Submission, WorkflowError> {
        if new.owner.is_empty() {
            return Err(WorkflowError::Validation(
                "owner identity is required".to_string(),
            ));
        }
        if new.file_name.trim().is_empty() {
            return Err(WorkflowError::Validation("file name is required".to_string()));
        }
        if new.assets.original.is_empty() {
            return Err(WorkflowError::Validation(
                "original asset reference is required".to_string(),
            ));
        }
        if new.assets.redacted.as_ref().is_some_and(AssetRef::is_empty) {
            return Err(WorkflowError::Validation(
                "redacted asset reference must not be blank".to_string(),
            ));
        }

        let submission = Submission::from_new(SubmissionId::generate(), new, self.clock.now());
        let stored = self.repository.insert(submission)?;
        info!(
            submission_id = %stored.id,
            owner = %stored.owner,
            document_type = stored.document_type.label(),
            redacted = stored.redacted,
            "submission created"
        );
        Ok(stored)
    }

    /// Insert records produced by the legacy migration as they are. Ids already present are
    /// skipped; returns how many were inserted.
    pub fn import_submissions(&self, submissions: Vec<Submission>) -> Result<usize, WorkflowError> {
        let mut imported = 0;
        for submission in submissions {
            let id = submission.id.clone();
            match self.repository.insert(submission) {
                Ok(_) => imported += 1,
                Err(RepositoryError::Conflict) => {
                    warn!(submission_id = %id, "submission already present; not imported")
                }
                Err(other) => return Err(other.into()),
            }
        }
        info!(imported, "migrated submissions imported");
        Ok(imported)
    }

    /// Most recent first.
    pub fn list_submissions(
        &self,
        scope: &ListScope,
        requester: &Identity,
    ) -> Result<Vec<Submission>, WorkflowError> {
        let mut submissions = match scope {
            ListScope::Owner(owner) => self.repository.by_owner(owner)?,
            ListScope::All => self.repository.all()?,
        };
        submissions.sort_by(|a, b| {
            b.submitted_at
                .cmp(&a.submitted_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        debug!(%requester, ?scope, count = submissions.len(), "listed submissions");
        Ok(submissions)
    }

    pub fn get(&self, id: &SubmissionId) -> Result<Submission, WorkflowError> {
        self.repository
            .fetch(id)?
            .ok_or_else(|| WorkflowError::NotFound(id.clone()))
    }

    /// Commit a status change together with its audit entry.
    ///
    /// Terminal submissions are rejected before any other argument is looked at.
    pub fn apply_transition(
        &self,
        id: &SubmissionId,
        new_status: SubmissionStatus,
        actor: &Identity,
        comment: Option<&str>,
    ) -> Result<Submission, WorkflowError> {
        let comment = comment
            .map(str::trim)
            .filter(|comment| !comment.is_empty())
            .map(str::to_string);

        let stored = self.mutate(id, |submission, now| {
            if submission.status.is_terminal() {
                return Err(WorkflowError::InvalidTransition {
                    id: submission.id.clone(),
                    status: submission.status,
                });
            }
            if actor.is_empty() {
                return Err(WorkflowError::Validation(
                    "actor identity is required".to_string(),
                ));
            }
            let event = match new_status {
                SubmissionStatus::Pending => {
                    return Err(WorkflowError::Validation(
                        "a submission cannot be moved back to pending".to_string(),
                    ))
                }
                SubmissionStatus::Rejected if comment.is_none() => {
                    return Err(WorkflowError::Validation(
                        "a rejection requires a comment".to_string(),
                    ))
                }
                SubmissionStatus::Rejected => AuditEvent::Rejected,
                SubmissionStatus::Approved => AuditEvent::Approved,
            };

            submission.status = new_status;
            submission.audit_log.push(AuditEntry {
                event,
                timestamp: now,
                actor: actor.clone(),
                comment: comment.clone(),
            });
            Ok(())
        })?;

        info!(
            submission_id = %stored.id,
            status = stored.status.label(),
            actor = %actor,
            "submission status changed"
        );
        Ok(stored)
    }

    /// Change status, then tell the owner. A failed notification does not undo the change.
    pub async fn transition_status(
        &self,
        id: &SubmissionId,
        new_status: SubmissionStatus,
        actor: &Identity,
        comment: Option<&str>,
    ) -> Result<WorkflowReceipt, WorkflowError> {
        let submission = self.apply_transition(id, new_status, actor, comment)?;

        let verb = match submission.status {
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::Pending => "updated",
        };
        let mut body = format!(
            "Hello,\n\nYour document {} sent on {} was {verb}.",
            submission.file_name,
            submission.submitted_at.format("%d/%m/%Y %H:%M"),
        );
        if let Some(comment) = submission
            .audit_log
            .last()
            .and_then(|entry| entry.comment.as_deref())
        {
            body.push_str(&format!("\n\nSupervisor comment: {comment}"));
        }
        body.push_str("\n\nThis is an automated message.");

        let outcome = self
            .notify(Notification {
                to: submission.owner.to_string(),
                subject: format!("Your document {} was {verb}", submission.file_name),
                body,
                attachment: None,
            })
            .await;

        Ok(WorkflowReceipt {
            submission,
            notifications: vec![outcome],
        })
    }

    /// Log the reveal and hand back the unredacted asset. Every call is logged.
    pub fn reveal_sensitive(
        &self,
        id: &SubmissionId,
        actor: &Identity,
    ) -> Result<AssetRef, WorkflowError> {
        let stored = self.mutate(id, |submission, now| {
            if !submission.redacted {
                return Err(WorkflowError::Validation(
                    "submission has no redacted variant to reveal".to_string(),
                ));
            }
            if actor.is_empty() {
                return Err(WorkflowError::Validation(
                    "actor identity is required".to_string(),
                ));
            }
            submission.audit_log.push(AuditEntry {
                event: AuditEvent::SensitiveRevealed,
                timestamp: now,
                actor: actor.clone(),
                comment: None,
            });
            Ok(())
        })?;

        info!(submission_id = %stored.id, actor = %actor, "sensitive asset revealed");
        Ok(stored.original_asset_ref)
    }

    /// Read-modify-write with optimistic retries on stale revisions.
    fn mutate<F>(&self, id: &SubmissionId, mut apply: F) -> Result<Submission, WorkflowError>
    where
        F: FnMut(&mut Submission, DateTime<Utc>) -> Result<(), WorkflowError>,
    {
        let attempts = self.config.max_conflict_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let mut submission = self.get(id)?;
            let expected = submission.revision;
            apply(&mut submission, self.clock.now())?;

            match self.repository.replace(submission, expected) {
                Ok(stored) => return Ok(stored),
                Err(RepositoryError::RevisionMismatch { found, .. }) => {
                    debug!(submission_id = %id, attempt, expected, found, "stale revision, retrying");
                }
                Err(RepositoryError::NotFound) => return Err(WorkflowError::NotFound(id.clone())),
                Err(other) => return Err(other.into()),
            }
        }

        warn!(submission_id = %id, attempts, "giving up after repeated write conflicts");
        Err(WorkflowError::ConcurrencyConflict {
            id: id.clone(),
            attempts,
        })
    }

    pub(super) async fn notify(&self, notification: Notification) -> NotificationOutcome {
        let recipient = notification.to.clone();
        let result = bounded(
            ExternalService::Notifier,
            self.config.notify_timeout,
            self.collaborators.notifier.send(notification),
        )
        .await;

        match result {
            Ok(()) => NotificationOutcome {
                recipient,
                error: None,
            },
            Err(error) => {
                warn!(%recipient, %error, "notification not delivered");
                NotificationOutcome {
                    recipient,
                    error: Some(error.to_string()),
                }
            }
        }
    }
}

/// Error raised by the submission workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("submission {id} is already {status} and cannot change")]
    InvalidTransition {
        id: SubmissionId,
        status: SubmissionStatus,
    },
    #[error("submission {0} not found")]
    NotFound(SubmissionId),
    #[error(transparent)]
    ExternalService(#[from] ExternalServiceError),
    #[error("submission {id} kept changing underneath us after {attempts} attempts")]
    ConcurrencyConflict { id: SubmissionId, attempts: u32 },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
