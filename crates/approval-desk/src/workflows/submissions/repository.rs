use super::domain::{Submission, SubmissionId};
use crate::workflows::access::Identity;

/// Storage abstraction for submission records, one record per submission.
///
/// `replace` is a compare-and-swap on `revision`: it only succeeds when the stored revision
/// still equals `expected_revision`, and the stored copy comes back with the revision bumped.
pub trait SubmissionRepository: Send + Sync {
    fn insert(&self, submission: Submission) -> Result<Submission, RepositoryError>;
    fn fetch(&self, id: &SubmissionId) -> Result<Option<Submission>, RepositoryError>;
    fn by_owner(&self, owner: &Identity) -> Result<Vec<Submission>, RepositoryError>;
    fn all(&self) -> Result<Vec<Submission>, RepositoryError>;
    fn replace(
        &self,
        submission: Submission,
        expected_revision: u64,
    ) -> Result<Submission, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stale write: expected revision {expected}, stored revision is {found}")]
    RevisionMismatch { expected: u64, found: u64 },
    #[error("submission owner cannot change")]
    OwnerChanged,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
