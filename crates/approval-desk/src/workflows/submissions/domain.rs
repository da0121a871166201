use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::review::ReviewReport;
use crate::workflows::access::Identity;

/// Schema written by this service: one document per submission.
pub const CURRENT_SCHEMA_VERSION: u16 = 2;
/// Per-owner array documents produced before submissions had their own records.
pub const LEGACY_SCHEMA_VERSION: u16 = 1;

/// Identifier assigned once at creation; never re-derived from file name or timestamp.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

impl SubmissionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference into the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetRef(pub String);

impl AssetRef {
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of document uploaded; selects the compliance ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    #[serde(alias = "atestado", alias = "atestado-medico")]
    MedicalCertificate,
    #[serde(alias = "recibo", alias = "reembolso")]
    ReimbursementReceipt,
    Other,
}

impl DocumentType {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentType::MedicalCertificate => "medical-certificate",
            DocumentType::ReimbursementReceipt => "reimbursement-receipt",
            DocumentType::Other => "other",
        }
    }

    /// Requirements a reviewer checks for this kind of document.
    pub fn requirements(self) -> &'static [&'static str] {
        match self {
            DocumentType::MedicalCertificate => &[
                "Patient name matches the collaborator",
                "Issue date is present",
                "Leave period is stated",
                "Physician name and registration number are present",
                "Physician signature or stamp is present",
            ],
            DocumentType::ReimbursementReceipt => &[
                "Issuer is identified",
                "Issue date is present",
                "Total amount is present",
                "Purchased items or services are described",
            ],
            DocumentType::Other => &["Document is legible", "Issue date is present"],
        }
    }
}

/// Approval status; `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionStatus {
    #[serde(alias = "Em processo", alias = "pending")]
    Pending,
    #[serde(alias = "Aprovado", alias = "approved")]
    Approved,
    #[serde(alias = "Reprovado", alias = "rejected")]
    Rejected,
}

impl SubmissionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "Pending",
            SubmissionStatus::Approved => "Approved",
            SubmissionStatus::Rejected => "Rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, SubmissionStatus::Pending)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    Approved,
    Rejected,
    SensitiveRevealed,
}

impl AuditEvent {
    pub const fn description(self) -> &'static str {
        match self {
            AuditEvent::Approved => "Approved by supervisor",
            AuditEvent::Rejected => "Rejected by supervisor",
            AuditEvent::SensitiveRevealed => "sensitive info revealed",
        }
    }
}

/// One append-only audit log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event: AuditEvent,
    pub timestamp: DateTime<Utc>,
    pub actor: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl AuditEntry {
    pub fn description(&self) -> &'static str {
        self.event.description()
    }
}

/// Object store references for the uploaded image and its optional redacted variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRefs {
    pub original: AssetRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacted: Option<AssetRef>,
}

impl AssetRefs {
    pub fn original_only(original: AssetRef) -> Self {
        Self {
            original,
            redacted: None,
        }
    }

    pub fn with_redacted(original: AssetRef, redacted: AssetRef) -> Self {
        Self {
            original,
            redacted: Some(redacted),
        }
    }

    /// Reference shown by default: the redacted variant when one exists.
    pub fn display(&self) -> &AssetRef {
        self.redacted.as_ref().unwrap_or(&self.original)
    }
}

/// Input to `create_submission`.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub owner: Identity,
    pub document_type: DocumentType,
    pub file_name: String,
    pub assets: AssetRefs,
    pub review_report: ReviewReport,
}

/// A document a collaborator sent for review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub owner: Identity,
    pub document_type: DocumentType,
    pub file_name: String,
    pub submitted_at: DateTime<Utc>,
    pub display_asset_ref: AssetRef,
    pub original_asset_ref: AssetRef,
    pub redacted: bool,
    pub review_report: ReviewReport,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub audit_log: Vec<AuditEntry>,
    pub schema_version: u16,
    #[serde(default)]
    pub revision: u64,
}

impl Submission {
    pub(crate) fn from_new(
        id: SubmissionId,
        new: NewSubmission,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        let display_asset_ref = new.assets.display().clone();
        let redacted = display_asset_ref != new.assets.original;

        Self {
            id,
            owner: new.owner,
            document_type: new.document_type,
            file_name: new.file_name,
            submitted_at,
            display_asset_ref,
            original_asset_ref: new.assets.original,
            redacted,
            review_report: new.review_report,
            status: SubmissionStatus::Pending,
            audit_log: Vec::new(),
            schema_version: CURRENT_SCHEMA_VERSION,
            revision: 0,
        }
    }

    /// Entries recording status changes, oldest first.
    pub fn status_history(&self) -> impl Iterator<Item = &AuditEntry> {
        self.audit_log
            .iter()
            .filter(|entry| entry.event != AuditEvent::SensitiveRevealed)
    }

    pub fn reveal_count(&self) -> usize {
        self.audit_log
            .iter()
            .filter(|entry| entry.event == AuditEvent::SensitiveRevealed)
            .count()
    }
}

/// Which submissions a listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    Owner(Identity),
    All,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_status_labels_deserialize() {
        let parsed: Vec<SubmissionStatus> =
            serde_json::from_str(r#"["Em processo", "Aprovado", "Reprovado", "Pending"]"#)
                .expect("statuses parse");
        assert_eq!(
            parsed,
            vec![
                SubmissionStatus::Pending,
                SubmissionStatus::Approved,
                SubmissionStatus::Rejected,
                SubmissionStatus::Pending,
            ]
        );
    }

    #[test]
    fn display_ref_prefers_redacted_variant() {
        let assets = AssetRefs::with_redacted(
            AssetRef("images/a/original.jpg".to_string()),
            AssetRef("images/a/redacted.jpg".to_string()),
        );
        assert_eq!(assets.display().0, "images/a/redacted.jpg");
        assert_eq!(
            AssetRefs::original_only(AssetRef("x".to_string()))
                .display()
                .0,
            "x"
        );
    }

    #[test]
    fn document_type_uses_kebab_case() {
        let value = serde_json::to_value(DocumentType::MedicalCertificate).expect("serialize");
        assert_eq!(value, serde_json::json!("medical-certificate"));
        assert!(!DocumentType::ReimbursementReceipt.requirements().is_empty());
    }
}
