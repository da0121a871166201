//! Compliance reports produced by the content reviewer.
//!
//! Reviewers either answer with free text (older prompts) or with a JSON checklist. Both shapes
//! are accepted; anything empty is treated as "no usable output".

use serde::{Deserialize, Serialize};

use super::domain::DocumentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Compliant,
    NeedsReview,
    NonCompliant,
}

impl Verdict {
    pub const fn label(self) -> &'static str {
        match self {
            Verdict::Compliant => "compliant",
            Verdict::NeedsReview => "needs review",
            Verdict::NonCompliant => "non-compliant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub requirement: String,
    pub satisfied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceChecklist {
    pub items: Vec<ChecklistItem>,
    pub verdict: Verdict,
    /// Short supervisor-facing summary.
    #[serde(default)]
    pub summary: String,
}

impl ComplianceChecklist {
    /// Build a checklist whose verdict follows from the items: all satisfied means compliant.
    pub fn from_items(items: Vec<ChecklistItem>, summary: impl Into<String>) -> Self {
        let verdict = if !items.is_empty() && items.iter().all(|item| item.satisfied) {
            Verdict::Compliant
        } else {
            Verdict::NeedsReview
        };
        Self {
            items,
            verdict,
            summary: summary.into(),
        }
    }

    /// Every requirement of the ruleset, unchecked, with the same note.
    pub fn pending_for(document_type: DocumentType, note: &str) -> Self {
        let items = document_type
            .requirements()
            .iter()
            .map(|requirement| ChecklistItem {
                requirement: (*requirement).to_string(),
                satisfied: false,
                note: Some(note.to_string()),
            })
            .collect();
        Self::from_items(
            items,
            format!("{} awaiting manual verification", document_type.label()),
        )
    }

    pub fn unmet(&self) -> impl Iterator<Item = &ChecklistItem> {
        self.items.iter().filter(|item| !item.satisfied)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewReport {
    Narrative { text: String },
    Checklist(ComplianceChecklist),
    /// Stored only when intake proceeds without a review.
    Unavailable { reason: String },
}

impl ReviewReport {
    /// Interpret raw reviewer output. JSON checklists may be wrapped in a Markdown fence.
    /// Returns `None` when the output is empty.
    pub fn from_reviewer_output(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let candidate = strip_code_fence(trimmed);
        if candidate.starts_with('{') {
            if let Ok(checklist) = serde_json::from_str::<ComplianceChecklist>(candidate) {
                return Some(Self::Checklist(checklist));
            }
        }

        Some(Self::Narrative {
            text: trimmed.to_string(),
        })
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, ReviewReport::Unavailable { .. })
    }

    /// True when the report carries nothing a supervisor can use.
    pub fn is_empty(&self) -> bool {
        match self {
            ReviewReport::Narrative { text } => text.trim().is_empty(),
            ReviewReport::Checklist(checklist) => {
                checklist.items.is_empty() && checklist.summary.trim().is_empty()
            }
            ReviewReport::Unavailable { .. } => false,
        }
    }

    /// Plain-text rendering used in e-mails.
    pub fn summary(&self) -> String {
        match self {
            ReviewReport::Narrative { text } => text.clone(),
            ReviewReport::Checklist(checklist) => {
                let mut lines = Vec::with_capacity(checklist.items.len() + 2);
                lines.push(format!("Verdict: {}", checklist.verdict.label()));
                if !checklist.summary.is_empty() {
                    lines.push(checklist.summary.clone());
                }
                for item in &checklist.items {
                    let mark = if item.satisfied { "[x]" } else { "[ ]" };
                    match &item.note {
                        Some(note) => lines.push(format!("{mark} {} ({note})", item.requirement)),
                        None => lines.push(format!("{mark} {}", item.requirement)),
                    }
                }
                lines.join("\n")
            }
            ReviewReport::Unavailable { reason } => {
                format!("Automated review unavailable: {reason}")
            }
        }
    }
}

fn strip_code_fence(value: &str) -> &str {
    let Some(rest) = value.strip_prefix("```") else {
        return value;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_text_becomes_narrative() {
        let report = ReviewReport::from_reviewer_output("  Medical certificate, looks legit. ")
            .expect("usable output");
        assert_eq!(
            report,
            ReviewReport::Narrative {
                text: "Medical certificate, looks legit.".to_string()
            }
        );
    }

    #[test]
    fn fenced_json_becomes_checklist() {
        let raw = "```json\n{\"items\":[{\"requirement\":\"Issue date is present\",\"satisfied\":true}],\"verdict\":\"compliant\",\"summary\":\"ok\"}\n```";
        match ReviewReport::from_reviewer_output(raw) {
            Some(ReviewReport::Checklist(checklist)) => {
                assert_eq!(checklist.verdict, Verdict::Compliant);
                assert_eq!(checklist.items.len(), 1);
                assert!(checklist.items[0].note.is_none());
            }
            other => panic!("expected checklist, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_falls_back_to_narrative() {
        let report = ReviewReport::from_reviewer_output("{not json").expect("usable");
        assert!(matches!(report, ReviewReport::Narrative { .. }));
    }

    #[test]
    fn blank_output_is_unusable() {
        assert!(ReviewReport::from_reviewer_output(" \n ").is_none());
    }

    #[test]
    fn verdict_follows_items() {
        let pending = ComplianceChecklist::pending_for(DocumentType::MedicalCertificate, "check");
        assert_eq!(pending.verdict, Verdict::NeedsReview);
        assert_eq!(pending.unmet().count(), 5);

        let satisfied = ComplianceChecklist::from_items(
            vec![ChecklistItem {
                requirement: "Total amount is present".to_string(),
                satisfied: true,
                note: None,
            }],
            "receipt ok",
        );
        assert_eq!(satisfied.verdict, Verdict::Compliant);
        assert!(ReviewReport::Checklist(satisfied)
            .summary()
            .contains("[x] Total amount is present"));
    }
}
