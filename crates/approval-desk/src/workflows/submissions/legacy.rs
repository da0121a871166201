//! Reads the legacy per-collaborator export and converts it into one record per submission.
//!
//! The legacy layout is `{ "<owner email>": { "envios": [ ... ] } }`. Entries carried either a
//! free-text `descricao` or a structured `analise_ia`, and either a single `url_imagem` or the
//! `url_imagem_exibicao` / `url_imagem_original` pair.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::domain::{
    AssetRef, DocumentType, Submission, SubmissionId, SubmissionStatus, CURRENT_SCHEMA_VERSION,
    LEGACY_SCHEMA_VERSION,
};
use super::review::{ComplianceChecklist, ReviewReport};
use crate::workflows::access::Identity;

#[derive(Debug, Deserialize)]
struct LegacyOwnerDocument {
    #[serde(default)]
    envios: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct LegacyEntry {
    #[serde(default)]
    nome_arquivo: Option<String>,
    #[serde(default)]
    data_envio: Option<Value>,
    #[serde(default)]
    descricao: Option<String>,
    #[serde(default)]
    analise_ia: Option<Value>,
    #[serde(default)]
    url_imagem: Option<String>,
    #[serde(default)]
    url_imagem_exibicao: Option<String>,
    #[serde(default)]
    url_imagem_original: Option<String>,
    #[serde(default)]
    status: Option<SubmissionStatus>,
    #[serde(default)]
    tipo_documento: Option<DocumentType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub owner: String,
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub submissions: Vec<Submission>,
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum LegacyImportError {
    #[error("legacy export must be a JSON object keyed by collaborator e-mail")]
    NotAnObject,
    #[error("collaborator document for {owner} is malformed: {source}")]
    OwnerDocument {
        owner: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("migrated file must be a JSON array of submissions")]
    NotAList,
    #[error("record {index} is schema {found}; run the migration first")]
    Unmigrated { index: usize, found: u16 },
    #[error("record {index} is malformed: {source}")]
    Record {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Convert a whole legacy collection export.
pub fn migrate_collection(export: Value) -> Result<MigrationReport, LegacyImportError> {
    let Value::Object(owners) = export else {
        return Err(LegacyImportError::NotAnObject);
    };

    let mut report = MigrationReport::default();
    for (owner, document) in owners {
        let document: LegacyOwnerDocument =
            serde_json::from_value(document).map_err(|source| {
                LegacyImportError::OwnerDocument {
                    owner: owner.clone(),
                    source,
                }
            })?;
        let identity = Identity::new(&owner);

        for (index, raw) in document.envios.into_iter().enumerate() {
            match migrate_entry(&identity, raw) {
                Ok(submission) => report.submissions.push(submission),
                Err(reason) => report.skipped.push(SkippedEntry {
                    owner: owner.clone(),
                    index,
                    reason,
                }),
            }
        }
    }

    report
        .submissions
        .sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    Ok(report)
}

fn migrate_entry(owner: &Identity, raw: Value) -> Result<Submission, String> {
    if owner.is_empty() {
        return Err("collaborator key is blank".to_string());
    }
    let entry: LegacyEntry =
        serde_json::from_value(raw).map_err(|err| format!("unreadable entry: {err}"))?;

    let submitted_at = entry
        .data_envio
        .as_ref()
        .ok_or_else(|| "missing data_envio".to_string())
        .and_then(parse_timestamp)?;

    let (display, original) = match (
        entry.url_imagem_exibicao.filter(|url| !url.trim().is_empty()),
        entry.url_imagem_original.filter(|url| !url.trim().is_empty()),
        entry.url_imagem.filter(|url| !url.trim().is_empty()),
    ) {
        (Some(display), Some(original), _) => (display, original),
        (Some(single), None, _) | (None, Some(single), _) | (None, None, Some(single)) => {
            (single.clone(), single)
        }
        (None, None, None) => return Err("no image reference".to_string()),
    };

    let review_report = match (entry.analise_ia, entry.descricao) {
        (Some(structured), _) => report_from_value(structured),
        (None, Some(text)) => ReviewReport::from_reviewer_output(&text).unwrap_or(
            ReviewReport::Unavailable {
                reason: "legacy record had an empty description".to_string(),
            },
        ),
        (None, None) => ReviewReport::Unavailable {
            reason: "legacy record had no review".to_string(),
        },
    };

    let redacted = display != original;
    Ok(Submission {
        id: SubmissionId::generate(),
        owner: owner.clone(),
        document_type: entry.tipo_documento.unwrap_or(DocumentType::Other),
        file_name: entry
            .nome_arquivo
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "unnamed".to_string()),
        submitted_at,
        display_asset_ref: AssetRef(display),
        original_asset_ref: AssetRef(original),
        redacted,
        review_report,
        status: entry.status.unwrap_or(SubmissionStatus::Pending),
        audit_log: Vec::new(),
        schema_version: CURRENT_SCHEMA_VERSION,
        revision: 0,
    })
}

fn report_from_value(value: Value) -> ReviewReport {
    match value {
        Value::String(text) => {
            ReviewReport::from_reviewer_output(&text).unwrap_or(ReviewReport::Unavailable {
                reason: "legacy record had an empty analysis".to_string(),
            })
        }
        other => match serde_json::from_value::<ComplianceChecklist>(other.clone()) {
            Ok(checklist) => ReviewReport::Checklist(checklist),
            Err(_) => ReviewReport::Narrative {
                text: other.to_string(),
            },
        },
    }
}

/// Offset-less layouts written by the legacy uploader, read as UTC. `%.f` also accepts a
/// missing fraction.
const NAIVE_LAYOUTS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Accepts RFC 3339, naive ISO timestamps with or without microseconds (UTC), epoch seconds,
/// or `{ "seconds": .. }`.
fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, String> {
    let parsed = match value {
        Value::String(raw) => {
            let raw = raw.trim();
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NAIVE_LAYOUTS.iter().find_map(|layout| {
                        NaiveDateTime::parse_from_str(raw, layout)
                            .ok()
                            .map(|naive| naive.and_utc())
                    })
                })
        }
        Value::Number(number) => number
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        Value::Object(map) => map
            .get("seconds")
            .or_else(|| map.get("_seconds"))
            .and_then(Value::as_i64)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    };
    parsed.ok_or_else(|| format!("unrecognized data_envio {value}"))
}

/// Read the output of `migrate_collection` back, refusing anything not on the current schema.
pub fn load_migrated(document: Value) -> Result<Vec<Submission>, LegacyImportError> {
    let Value::Array(records) = document else {
        return Err(LegacyImportError::NotAList);
    };

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let found = schema_version_of(&record);
            if found != CURRENT_SCHEMA_VERSION {
                return Err(LegacyImportError::Unmigrated { index, found });
            }
            serde_json::from_value(record)
                .map_err(|source| LegacyImportError::Record { index, source })
        })
        .collect()
}

/// Schema version of a raw stored document: legacy entries have none.
pub fn schema_version_of(document: &Value) -> u16 {
    document
        .get("schema_version")
        .and_then(Value::as_u64)
        .and_then(|version| u16::try_from(version).ok())
        .unwrap_or(LEGACY_SCHEMA_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn migrates_plain_and_redacted_entries() {
        let export = json!({
            "A@X.com": {
                "envios": [
                    {
                        "nome_arquivo": "atestado.jpg",
                        "data_envio": "2025-03-01T09:30:00Z",
                        "descricao": "Medical certificate, 2 days of leave.",
                        "url_imagem": "https://storage/images/a@x.com/atestado.jpg",
                        "status": "Aprovado"
                    },
                    {
                        "nome_arquivo": "atestado2.jpg",
                        "data_envio": { "seconds": 1740000000 },
                        "analise_ia": {
                            "items": [{ "requirement": "Issue date is present", "satisfied": true }],
                            "verdict": "needs_review",
                            "summary": "diagnosis code hidden"
                        },
                        "url_imagem_exibicao": "https://storage/masked.jpg",
                        "url_imagem_original": "https://storage/original.jpg",
                        "tipo_documento": "medical-certificate"
                    }
                ]
            }
        });

        let report = migrate_collection(export).expect("migrates");
        assert!(report.skipped.is_empty());
        assert_eq!(report.submissions.len(), 2);

        let approved = report
            .submissions
            .iter()
            .find(|s| s.file_name == "atestado.jpg")
            .expect("first entry");
        assert_eq!(approved.owner.as_str(), "a@x.com");
        assert_eq!(approved.status, SubmissionStatus::Approved);
        assert!(!approved.redacted);
        assert!(matches!(
            approved.review_report,
            ReviewReport::Narrative { .. }
        ));
        assert_eq!(approved.schema_version, CURRENT_SCHEMA_VERSION);

        let masked = report
            .submissions
            .iter()
            .find(|s| s.file_name == "atestado2.jpg")
            .expect("second entry");
        assert!(masked.redacted);
        assert_eq!(masked.status, SubmissionStatus::Pending);
        assert_eq!(masked.document_type, DocumentType::MedicalCertificate);
        assert!(matches!(masked.review_report, ReviewReport::Checklist(_)));
        assert_ne!(approved.id, masked.id);
    }

    #[test]
    fn undated_and_imageless_entries_are_skipped() {
        let export = json!({
            "b@x.com": {
                "envios": [
                    { "nome_arquivo": "no-date.jpg", "url_imagem": "u" },
                    { "nome_arquivo": "no-image.jpg", "data_envio": "2025-01-01 08:00:00" }
                ]
            }
        });

        let report = migrate_collection(export).expect("migrates");
        assert!(report.submissions.is_empty());
        let reasons: Vec<_> = report.skipped.iter().map(|s| s.reason.as_str()).collect();
        assert_eq!(reasons, vec!["missing data_envio", "no image reference"]);
        assert_eq!(report.skipped[1].index, 1);
    }

    #[test]
    fn reads_naive_timestamps_with_microseconds() {
        let export = json!({
            "c@x.com": {
                "envios": [
                    { "nome_arquivo": "t.jpg", "data_envio": "2025-03-01T09:30:00.123456", "url_imagem": "a" },
                    { "nome_arquivo": "s.jpg", "data_envio": "2025-03-01 09:30:00.123456", "url_imagem": "b" },
                    { "nome_arquivo": "n.jpg", "data_envio": "2025-03-01T09:30:00", "url_imagem": "c" },
                    { "nome_arquivo": "x.jpg", "data_envio": "01/03/2025", "url_imagem": "d" }
                ]
            }
        });

        let report = migrate_collection(export).expect("migrates");
        assert_eq!(report.submissions.len(), 3);
        let expected = Utc
            .with_ymd_and_hms(2025, 3, 1, 9, 30, 0)
            .single()
            .expect("valid instant");
        for submission in &report.submissions {
            assert_eq!(submission.submitted_at.timestamp(), expected.timestamp());
        }
        let fractional = report
            .submissions
            .iter()
            .find(|s| s.file_name == "t.jpg")
            .expect("fractional entry");
        assert_eq!(fractional.submitted_at.timestamp_subsec_micros(), 123456);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].reason.starts_with("unrecognized data_envio"));
    }

    #[test]
    fn rejects_non_object_exports() {
        assert!(matches!(
            migrate_collection(json!([1, 2])),
            Err(LegacyImportError::NotAnObject)
        ));
    }

    #[test]
    fn migrated_output_loads_back() {
        let export = json!({
            "d@x.com": {
                "envios": [{
                    "nome_arquivo": "recibo.png",
                    "data_envio": "2025-02-01 10:00:00",
                    "url_imagem": "images/d@x.com/recibo.png",
                    "status": "Em processo"
                }]
            }
        });
        let report = migrate_collection(export).expect("migrates");
        let written = serde_json::to_value(&report.submissions).expect("serializes");

        let loaded = load_migrated(written).expect("loads");
        assert_eq!(loaded, report.submissions);
    }

    #[test]
    fn unmigrated_records_are_refused() {
        assert!(matches!(
            load_migrated(json!({ "a@x.com": { "envios": [] } })),
            Err(LegacyImportError::NotAList)
        ));
        assert!(matches!(
            load_migrated(json!([{ "nome_arquivo": "x.jpg", "descricao": "old" }])),
            Err(LegacyImportError::Unmigrated { index: 0, found: 1 })
        ));
        assert!(matches!(
            load_migrated(json!([{ "schema_version": 2, "id": 7 }])),
            Err(LegacyImportError::Record { index: 0, .. })
        ));
    }

    #[test]
    fn detects_schema_versions() {
        assert_eq!(schema_version_of(&json!({ "descricao": "x" })), 1);
        assert_eq!(schema_version_of(&json!({ "schema_version": 2 })), 2);
    }
}
