//! Deduplication manager.
//!
//! A fingerprint is SHA-256 over the stable id, the normalized case
//! number, and the whitespace-normalized content hash. Within a run an
//! in-memory set catches resubmissions before any stage runs; across runs
//! the store decides between unchanged, update, and insert.

use std::sync::Arc;
use std::sync::Mutex;

use rustc_hash::FxHashSet;
use sha2::{Digest, Sha256};

use crate::source::RawRecord;
use crate::store::dao::{DocumentDao, StoreError};
use crate::store::models::StoredRecord;
use crate::util::text::{content_hash, hex_digest, normalize_case_number};

/// Separator between fingerprint components, so `("ab", "c")` and
/// `("a", "bc")` cannot collide structurally.
const FIELD_SEPARATOR: u8 = 0x1f;

/// What to do with a record, decided before any stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupAction {
    /// Same fingerprint already seen in this run.
    SkipDuplicate,
    /// Stored row exists with the same content hash.
    SkipUnchanged,
    /// Stored row exists with a different content hash.
    UpdateExisting,
    /// No stored row.
    InsertNew,
}

impl DedupAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DedupAction::SkipDuplicate => "skip_duplicate",
            DedupAction::SkipUnchanged => "skip_unchanged",
            DedupAction::UpdateExisting => "update_existing",
            DedupAction::InsertNew => "insert_new",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DedupAssessment {
    pub action: DedupAction,
    pub fingerprint: String,
    pub content_hash: String,
    /// The stored row, when one exists; carried forward so persistence can
    /// merge the prior blob without a second lookup.
    pub existing: Option<StoredRecord>,
}

/// Deterministic fingerprint over (stable id, normalized case number,
/// content hash).
#[must_use]
pub fn fingerprint(record: &RawRecord) -> String {
    let hash = content_hash(&record.content);
    fingerprint_parts(
        &record.source_id,
        record.case_number.as_deref().unwrap_or_default(),
        &hash,
    )
}

fn fingerprint_parts(stable_id: &str, case_number: &str, content_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stable_id.as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(normalize_case_number(case_number).as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(content_hash.as_bytes());
    hex_digest(&hasher.finalize())
}

pub struct DeduplicationManager {
    dao: Arc<dyn DocumentDao>,
    seen: Mutex<FxHashSet<String>>,
}

impl DeduplicationManager {
    #[must_use]
    pub fn new(dao: Arc<dyn DocumentDao>) -> Self {
        Self {
            dao,
            seen: Mutex::new(FxHashSet::default()),
        }
    }

    /// Assess a record before any stage runs.
    pub async fn assess(&self, record: &RawRecord) -> Result<DedupAssessment, StoreError> {
        let hash = content_hash(&record.content);
        let print = fingerprint_parts(
            &record.source_id,
            record.case_number.as_deref().unwrap_or_default(),
            &hash,
        );

        {
            let mut seen = self.seen.lock().expect("dedup seen-set lock");
            if !seen.insert(print.clone()) {
                return Ok(DedupAssessment {
                    action: DedupAction::SkipDuplicate,
                    fingerprint: print,
                    content_hash: hash,
                    existing: None,
                });
            }
        }

        let existing = self.dao.get_by_internal_id(&record.internal_id).await?;
        let action = match &existing {
            Some(stored) if stored.content_hash == hash => DedupAction::SkipUnchanged,
            Some(_) => DedupAction::UpdateExisting,
            None => DedupAction::InsertNew,
        };

        Ok(DedupAssessment {
            action,
            fingerprint: print,
            content_hash: hash,
            existing,
        })
    }

    /// Forget every fingerprint seen so far. Called at the start of each
    /// run so the duplicate window is scoped to one run, not to the
    /// lifetime of the manager.
    pub fn reset(&self) {
        self.seen.lock().expect("dedup seen-set lock").clear();
    }

    /// Number of distinct fingerprints seen this run.
    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen.lock().expect("dedup seen-set lock").len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::source::SourceRecord;
    use crate::store::dao::mock::MockDocumentDao;

    fn raw(internal_id: &str, case_number: &str, content: &str) -> RawRecord {
        RawRecord::from_source(
            SourceRecord {
                internal_id: Some(internal_id.to_string()),
                source_id: Some(internal_id.to_string()),
                case_number: Some(case_number.to_string()),
                content: Some(content.to_string()),
                ..SourceRecord::default()
            },
            Utc::now(),
        )
        .expect("valid record")
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let record = raw("A-1", "2:22-cv-00001", "some body text");
        assert_eq!(fingerprint(&record), fingerprint(&record));
    }

    #[test]
    fn whitespace_only_changes_keep_the_fingerprint() {
        let a = raw("A-1", "2:22-cv-00001", "some body text");
        let b = raw("A-1", "2:22-cv-00001", "some\n  body\t text ");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn single_character_change_flips_the_fingerprint() {
        let a = raw("A-1", "2:22-cv-00001", "some body text");
        let b = raw("A-1", "2:22-cv-00001", "some body texts");
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn distinct_source_ids_fingerprint_apart() {
        let a = raw("A-1", "2:22-cv-00001", "same content");
        let b = raw("B-2", "2:22-cv-00001", "same content");
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[tokio::test]
    async fn first_sight_is_insert_new() {
        let dao = Arc::new(MockDocumentDao::new());
        let manager = DeduplicationManager::new(dao);
        let assessment = manager
            .assess(&raw("A-1", "2:22-cv-00001", "body"))
            .await
            .expect("assess");
        assert_eq!(assessment.action, DedupAction::InsertNew);
        assert!(assessment.existing.is_none());
    }

    #[tokio::test]
    async fn same_record_twice_in_one_run_is_a_duplicate() {
        let dao = Arc::new(MockDocumentDao::new());
        let manager = DeduplicationManager::new(dao);
        let record = raw("A-1", "2:22-cv-00001", "body");

        let first = manager.assess(&record).await.expect("assess");
        assert_eq!(first.action, DedupAction::InsertNew);

        let second = manager.assess(&record).await.expect("assess");
        assert_eq!(second.action, DedupAction::SkipDuplicate);
        assert_eq!(manager.seen_count(), 1);
    }

    #[tokio::test]
    async fn reset_opens_a_new_duplicate_window() {
        let dao = Arc::new(MockDocumentDao::new());
        let manager = DeduplicationManager::new(dao);
        let record = raw("A-1", "2:22-cv-00001", "body");

        manager.assess(&record).await.expect("assess");
        manager.reset();
        assert_eq!(manager.seen_count(), 0);

        let after_reset = manager.assess(&record).await.expect("assess");
        assert_ne!(after_reset.action, DedupAction::SkipDuplicate);
    }

    #[tokio::test]
    async fn stored_row_with_same_hash_is_unchanged() {
        let dao = Arc::new(MockDocumentDao::new());
        let record = raw("A-1", "2:22-cv-00001", "body");
        let stored = StoredRecord {
            internal_id: "A-1".to_string(),
            kind: "opinion".to_string(),
            case_number: Some("2:22-cv-00001".to_string()),
            jurisdiction_id: None,
            content: "body".to_string(),
            content_hash: content_hash("body"),
            metadata_blob: json!({}),
            updated_at: Utc::now(),
        };
        dao.upsert_record(&stored).await.expect("seed row");

        let manager = DeduplicationManager::new(dao);
        let assessment = manager.assess(&record).await.expect("assess");
        assert_eq!(assessment.action, DedupAction::SkipUnchanged);
        assert!(assessment.existing.is_some());
    }

    #[tokio::test]
    async fn stored_row_with_different_hash_is_an_update() {
        let dao = Arc::new(MockDocumentDao::new());
        let stored = StoredRecord {
            internal_id: "A-1".to_string(),
            kind: "opinion".to_string(),
            case_number: Some("2:22-cv-00001".to_string()),
            jurisdiction_id: None,
            content: "old body".to_string(),
            content_hash: content_hash("old body"),
            metadata_blob: json!({}),
            updated_at: Utc::now(),
        };
        dao.upsert_record(&stored).await.expect("seed row");

        let manager = DeduplicationManager::new(dao);
        let assessment = manager
            .assess(&raw("A-1", "2:22-cv-00001", "new body"))
            .await
            .expect("assess");
        assert_eq!(assessment.action, DedupAction::UpdateExisting);
    }
}
