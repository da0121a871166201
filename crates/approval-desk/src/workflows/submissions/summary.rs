use serde::Serialize;

use super::domain::{Submission, SubmissionStatus};

/// Counts per status, as shown on the landing page for collaborators and supervisors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusTally {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

impl StatusTally {
    pub fn from_submissions<'a>(submissions: impl IntoIterator<Item = &'a Submission>) -> Self {
        submissions
            .into_iter()
            .fold(Self::default(), |mut tally, submission| {
                tally.total += 1;
                match submission.status {
                    SubmissionStatus::Pending => tally.pending += 1,
                    SubmissionStatus::Approved => tally.approved += 1,
                    SubmissionStatus::Rejected => tally.rejected += 1,
                }
                tally
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::submissions::domain::{
        AssetRef, AssetRefs, DocumentType, NewSubmission, SubmissionId,
    };
    use crate::workflows::submissions::review::ReviewReport;
    use chrono::Utc;

    fn with_status(status: SubmissionStatus) -> Submission {
        let mut submission = Submission::from_new(
            SubmissionId::generate(),
            NewSubmission {
                owner: "a@x.com".into(),
                document_type: DocumentType::Other,
                file_name: "doc.jpg".to_string(),
                assets: AssetRefs::original_only(AssetRef("images/a@x.com/doc.jpg".to_string())),
                review_report: ReviewReport::Narrative {
                    text: "ok".to_string(),
                },
            },
            Utc::now(),
        );
        submission.status = status;
        submission
    }

    #[test]
    fn counts_each_status() {
        let submissions = vec![
            with_status(SubmissionStatus::Pending),
            with_status(SubmissionStatus::Approved),
            with_status(SubmissionStatus::Rejected),
            with_status(SubmissionStatus::Rejected),
        ];

        let tally = StatusTally::from_submissions(&submissions);
        assert_eq!(
            tally,
            StatusTally {
                total: 4,
                pending: 1,
                approved: 1,
                rejected: 2,
            }
        );
    }

    #[test]
    fn empty_scope_is_all_zero() {
        let none: Vec<Submission> = Vec::new();
        assert_eq!(StatusTally::from_submissions(&none), StatusTally::default());
    }
}
