use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{Submission, SubmissionId};
use super::repository::{RepositoryError, SubmissionRepository};
use crate::workflows::access::Identity;

#[derive(Default)]
struct Records {
    by_id: HashMap<SubmissionId, Submission>,
    by_owner: HashMap<Identity, Vec<SubmissionId>>,
}

/// Process-local repository: one entry per submission plus an owner index.
#[derive(Default, Clone)]
pub struct InMemorySubmissionRepository {
    records: Arc<Mutex<Records>>,
}

impl InMemorySubmissionRepository {
    fn lock(&self) -> Result<MutexGuard<'_, Records>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|records| records.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SubmissionRepository for InMemorySubmissionRepository {
    fn insert(&self, submission: Submission) -> Result<Submission, RepositoryError> {
        let mut records = self.lock()?;
        if records.by_id.contains_key(&submission.id) {
            return Err(RepositoryError::Conflict);
        }
        records
            .by_owner
            .entry(submission.owner.clone())
            .or_default()
            .push(submission.id.clone());
        records
            .by_id
            .insert(submission.id.clone(), submission.clone());
        Ok(submission)
    }

    fn fetch(&self, id: &SubmissionId) -> Result<Option<Submission>, RepositoryError> {
        Ok(self.lock()?.by_id.get(id).cloned())
    }

    fn by_owner(&self, owner: &Identity) -> Result<Vec<Submission>, RepositoryError> {
        let records = self.lock()?;
        let ids = match records.by_owner.get(owner) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| records.by_id.get(id).cloned())
            .collect())
    }

    fn all(&self) -> Result<Vec<Submission>, RepositoryError> {
        Ok(self.lock()?.by_id.values().cloned().collect())
    }

    fn replace(
        &self,
        mut submission: Submission,
        expected_revision: u64,
    ) -> Result<Submission, RepositoryError> {
        let mut records = self.lock()?;
        let stored = records
            .by_id
            .get_mut(&submission.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.revision != expected_revision {
            return Err(RepositoryError::RevisionMismatch {
                expected: expected_revision,
                found: stored.revision,
            });
        }
        if stored.owner != submission.owner {
            return Err(RepositoryError::OwnerChanged);
        }
        submission.revision = expected_revision + 1;
        *stored = submission.clone();
        Ok(submission)
    }
}
