use approval_desk::config::AppConfig;
use approval_desk::error::AppError;
use approval_desk::workflows::access::{InMemoryRoleStore, RoleDirectory};
use approval_desk::workflows::submissions::{
    load_migrated, CollaboratorFailure, Collaborators, ComplianceChecklist, ContentReviewer,
    DeskState, DocumentType, FilesystemObjectStore, InMemorySubmissionRepository, Notification,
    Notifier, ObjectStore, ReviewReport, SubmissionService,
};
use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    /// Directory the filesystem object store writes under; served at `/assets`.
    pub(crate) assets_root: Arc<PathBuf>,
}

/// Reviewer used when no AI backend is wired in: every requirement is listed unchecked so the
/// supervisor verifies the document by hand.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ManualChecklistReviewer;

#[async_trait]
impl ContentReviewer for ManualChecklistReviewer {
    async fn analyze(
        &self,
        image: &[u8],
        document_type: DocumentType,
    ) -> Result<ReviewReport, CollaboratorFailure> {
        if image.is_empty() {
            return Err(CollaboratorFailure::new("nothing to review"));
        }
        Ok(ReviewReport::Checklist(ComplianceChecklist::pending_for(
            document_type,
            "verify by hand",
        )))
    }
}

/// Notifier that records outgoing mail and logs it instead of talking to an SMTP relay.
#[derive(Default, Clone)]
pub(crate) struct OutboxNotifier {
    sender: String,
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl OutboxNotifier {
    pub(crate) fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            sent: Arc::default(),
        }
    }

    pub(crate) fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn send(&self, notification: Notification) -> Result<(), CollaboratorFailure> {
        info!(
            from = %self.sender,
            to = %notification.to,
            subject = %notification.subject,
            attachment = notification.attachment.as_ref().map(|a| a.file_name.as_str()),
            "mail queued"
        );
        self.sent
            .lock()
            .map_err(|_| CollaboratorFailure::new("outbox lock poisoned"))?
            .push(notification);
        Ok(())
    }
}

pub(crate) type Desk = DeskState<InMemorySubmissionRepository, InMemoryRoleStore>;

/// Wire the workflow with the given object store and the offline reviewer and outbox.
pub(crate) fn build_desk(
    config: &AppConfig,
    assets: Arc<dyn ObjectStore>,
    notifier: OutboxNotifier,
) -> Desk {
    let collaborators = Collaborators {
        reviewer: Arc::new(ManualChecklistReviewer),
        assets,
        notifier: Arc::new(notifier),
    };
    let submissions = SubmissionService::new(
        Arc::new(InMemorySubmissionRepository::default()),
        collaborators,
        config.workflow.clone(),
    );
    let roles = RoleDirectory::new(
        InMemoryRoleStore::default(),
        config.roles.admin_email.as_str(),
    );

    DeskState {
        submissions: Arc::new(submissions),
        roles: Arc::new(roles),
    }
}

/// Insert the records of a `migrate --output` file into the desk's repository.
pub(crate) fn seed_desk(desk: &Desk, path: &Path) -> Result<usize, AppError> {
    let raw = std::fs::read_to_string(path)?;
    let document: serde_json::Value = serde_json::from_str(&raw)?;
    let submissions = load_migrated(document)?;
    Ok(desk.submissions.import_submissions(submissions)?)
}

pub(crate) fn filesystem_assets(config: &AppConfig) -> Arc<dyn ObjectStore> {
    Arc::new(FilesystemObjectStore::new(
        config.storage.root.clone(),
        config.storage.public_base_url.clone(),
    ))
}

pub(crate) fn parse_document_type(raw: &str) -> Result<DocumentType, String> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_ascii_lowercase()))
        .map_err(|_| {
            format!(
                "unknown document type '{raw}' (expected medical-certificate, reimbursement-receipt or other)"
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::{run_migration, MigrateArgs};
    use approval_desk::workflows::access::Identity;
    use approval_desk::workflows::submissions::{InMemoryObjectStore, ListScope};

    const LEGACY_EXPORT: &str = r#"{
        "a@x.com": { "envios": [
            { "nome_arquivo": "a.jpg", "data_envio": "2025-03-01T09:30:00.123456", "url_imagem": "images/a@x.com/a.jpg" }
        ] },
        "b@x.com": { "envios": [
            { "nome_arquivo": "b.jpg", "data_envio": "2025-03-02 08:00:00", "url_imagem": "images/b@x.com/b.jpg", "status": "Aprovado" }
        ] }
    }"#;

    fn offline_desk() -> Desk {
        let config = AppConfig::load().expect("defaults load");
        build_desk(
            &config,
            Arc::new(InMemoryObjectStore::default()),
            OutboxNotifier::new("desk@example.com"),
        )
    }

    #[test]
    fn migrated_file_seeds_the_desk_once() {
        let dir = tempfile::tempdir().expect("temp dir");
        let input = dir.path().join("legacy.json");
        let output = dir.path().join("migrated.json");
        std::fs::write(&input, LEGACY_EXPORT).expect("input written");
        run_migration(MigrateArgs {
            input,
            output: Some(output.clone()),
        })
        .expect("migration runs");

        let desk = offline_desk();
        assert_eq!(seed_desk(&desk, &output).expect("seeded"), 2);
        let listed = desk
            .submissions
            .list_submissions(&ListScope::All, &Identity::new("admin@localhost"))
            .expect("listed");
        let names: Vec<_> = listed.iter().map(|s| s.file_name.as_str()).collect();
        assert_eq!(names, vec!["b.jpg", "a.jpg"]);

        assert_eq!(seed_desk(&desk, &output).expect("reseeded"), 0);
    }

    #[test]
    fn raw_legacy_exports_are_not_seeded() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("legacy.json");
        std::fs::write(&path, LEGACY_EXPORT).expect("written");

        assert!(matches!(
            seed_desk(&offline_desk(), &path),
            Err(AppError::Migration(_))
        ));
    }

    #[tokio::test]
    async fn manual_reviewer_lists_every_requirement_unchecked() {
        let report = ManualChecklistReviewer
            .analyze(b"img", DocumentType::ReimbursementReceipt)
            .await
            .expect("review succeeds");
        match report {
            ReviewReport::Checklist(checklist) => {
                assert_eq!(
                    checklist.items.len(),
                    DocumentType::ReimbursementReceipt.requirements().len()
                );
                assert!(checklist.items.iter().all(|item| !item.satisfied));
            }
            other => panic!("expected checklist, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn outbox_keeps_sent_mail() {
        let outbox = OutboxNotifier::new("desk@example.com");
        outbox
            .send(Notification {
                to: "a@x.com".to_string(),
                subject: "hello".to_string(),
                body: "body".to_string(),
                attachment: None,
            })
            .await
            .expect("queued");
        assert_eq!(outbox.sent().len(), 1);
    }

    #[test]
    fn document_types_parse_from_cli_labels() {
        assert_eq!(
            parse_document_type("Medical-Certificate"),
            Ok(DocumentType::MedicalCertificate)
        );
        assert_eq!(parse_document_type("recibo"), Ok(DocumentType::ReimbursementReceipt));
        assert!(parse_document_type("passport").is_err());
    }
}
