//! Document submissions: intake, review by a supervisor, and the audit trail around both.

pub mod collaborators;
pub mod domain;
pub mod intake;
pub mod legacy;
pub mod memory;
pub mod repository;
pub mod review;
pub mod router;
pub mod service;
pub mod storage;
pub mod summary;

#[cfg(test)]
mod tests;

pub use collaborators::{
    AssetPath, Attachment, CollaboratorFailure, Collaborators, ContentReviewer, ExternalService,
    ExternalServiceError, Notification, Notifier, ObjectStore,
};
pub use domain::{
    AssetRef, AssetRefs, AuditEntry, AuditEvent, DocumentType, ListScope, NewSubmission,
    Submission, SubmissionId, SubmissionStatus, CURRENT_SCHEMA_VERSION, LEGACY_SCHEMA_VERSION,
};
pub use intake::DocumentUpload;
pub use legacy::{
    load_migrated, migrate_collection, LegacyImportError, MigrationReport, SkippedEntry,
};
pub use memory::InMemorySubmissionRepository;
pub use repository::{RepositoryError, SubmissionRepository};
pub use review::{ChecklistItem, ComplianceChecklist, ReviewReport, Verdict};
pub use router::{desk_router, DeskState};
pub use service::{
    Clock, NotificationOutcome, SubmissionService, SystemClock, WorkflowError, WorkflowReceipt,
};
pub use storage::{FilesystemObjectStore, InMemoryObjectStore, StoredObject};
pub use summary::StatusTally;
