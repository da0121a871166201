use crate::infra::{build_desk, parse_document_type, OutboxNotifier};
use approval_desk::config::AppConfig;
use approval_desk::error::AppError;
use approval_desk::workflows::access::{can_access, AccessTarget, Action, Actor, Identity, Role};
use approval_desk::workflows::submissions::{
    DocumentType, DocumentUpload, InMemoryObjectStore, ListScope, StatusTally, SubmissionStatus,
    WorkflowError,
};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Collaborator who uploads the document.
    #[arg(long, default_value = "collaborator@example.com")]
    pub(crate) owner: String,
    /// Supervisor who reviews it.
    #[arg(long, default_value = "supervisor@example.com")]
    pub(crate) supervisor: String,
    /// Kind of document (medical-certificate, reimbursement-receipt, other).
    #[arg(long, default_value = "medical-certificate", value_parser = parse_document_type)]
    pub(crate) document_type: DocumentType,
    /// Image to upload; a placeholder is used when omitted.
    #[arg(long)]
    pub(crate) image: Option<PathBuf>,
    /// Approve instead of rejecting at the end of the walkthrough.
    #[arg(long)]
    pub(crate) approve: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            owner: "collaborator@example.com".to_string(),
            supervisor: "supervisor@example.com".to_string(),
            document_type: DocumentType::MedicalCertificate,
            image: None,
            approve: false,
        }
    }
}

const PLACEHOLDER_IMAGE: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        owner,
        supervisor,
        document_type,
        image,
        approve,
    } = args;

    let mut config = AppConfig::load()?;
    config.workflow.supervisor_inbox = Some(supervisor.clone());

    let (image, file_name) = match image {
        Some(path) => {
            let bytes = std::fs::read(&path)?;
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.jpg".to_string());
            (bytes, name)
        }
        None => (PLACEHOLDER_IMAGE.to_vec(), "atestado.jpg".to_string()),
    };

    let assets = InMemoryObjectStore::default();
    let outbox = OutboxNotifier::new(config.workflow.mail_sender.clone());
    let desk = build_desk(&config, Arc::new(assets.clone()), outbox.clone());
    let collaborator = Actor::authenticated(owner.as_str());
    let reviewer = Actor::authenticated(supervisor.as_str());
    desk.roles.set_role(&collaborator.identity, Role::Collaborator)?;
    desk.roles.set_role(&reviewer.identity, Role::Supervisor)?;

    println!("Approval desk demo");
    println!(
        "\n1. {} uploads {} as a {}",
        collaborator.identity,
        file_name,
        document_type.label()
    );
    let receipt = match desk
        .submissions
        .submit_document(DocumentUpload {
            owner: collaborator.identity.clone(),
            document_type,
            file_name,
            // Stand-in for a masked copy of the upload.
            redacted_image: Some(image.iter().rev().copied().collect()),
            image,
        })
        .await
    {
        Ok(receipt) => receipt,
        Err(err) => {
            println!("  Upload rejected: {err}");
            return Ok(());
        }
    };
    let submission = receipt.submission;
    println!("  Submission {} is {}", submission.id, submission.status);
    println!("  Display image: {}", submission.display_asset_ref);
    println!("  Automated review:");
    for line in submission.review_report.summary().lines() {
        println!("    {line}");
    }
    println!("  {} object(s) stored", assets.len());

    let role = desk.roles.role_of(&collaborator.identity)?;
    let peeks = can_access(
        &collaborator,
        role,
        Action::RevealSensitive,
        AccessTarget::Submission(&submission),
    );
    println!(
        "\n2. Can the collaborator reveal the original? {}",
        if peeks { "yes" } else { "no" }
    );

    println!("\n3. {} reveals the original image", reviewer.identity);
    match desk
        .submissions
        .reveal_sensitive(&submission.id, &reviewer.identity)
    {
        Ok(original) => println!("  Original: {original}"),
        Err(err) => println!("  Reveal failed: {err}"),
    }

    println!("\n4. Decision");
    let decision = if approve {
        desk.submissions
            .transition_status(
                &submission.id,
                SubmissionStatus::Approved,
                &reviewer.identity,
                None,
            )
            .await
    } else {
        match desk
            .submissions
            .transition_status(
                &submission.id,
                SubmissionStatus::Rejected,
                &reviewer.identity,
                None,
            )
            .await
        {
            Err(WorkflowError::Validation(reason)) => {
                println!("  Rejection without a comment refused: {reason}")
            }
            Err(other) => println!("  Unexpected failure: {other}"),
            Ok(_) => println!("  Rejection without a comment was accepted"),
        }
        desk.submissions
            .transition_status(
                &submission.id,
                SubmissionStatus::Rejected,
                &reviewer.identity,
                Some("Physician stamp is not legible"),
            )
            .await
    };
    let decided = match decision {
        Ok(receipt) => {
            for warning in receipt.warnings() {
                println!("  Warning: {warning}");
            }
            receipt.submission
        }
        Err(err) => {
            println!("  Decision failed: {err}");
            return Ok(());
        }
    };
    println!("  Status is now {}", decided.status);

    println!("\nAudit log");
    for entry in &decided.audit_log {
        match &entry.comment {
            Some(comment) => println!(
                "- {} {} by {}: {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.description(),
                entry.actor,
                comment
            ),
            None => println!(
                "- {} {} by {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.description(),
                entry.actor
            ),
        }
    }

    let owner_identity = Identity::new(&owner);
    let listed = desk
        .submissions
        .list_submissions(&ListScope::Owner(owner_identity.clone()), &owner_identity)?;
    let tally = StatusTally::from_submissions(&listed);
    println!(
        "\nSummary for {}: {} total | {} pending | {} approved | {} rejected",
        owner_identity, tally.total, tally.pending, tally.approved, tally.rejected
    );

    println!("\nOutbox");
    for mail in outbox.sent() {
        println!("- to {}: {}", mail.to, mail.subject);
    }

    Ok(())
}
