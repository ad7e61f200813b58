//! Persistence access. One trait, a Postgres implementation, and an
//! in-memory mock used throughout the test suite.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::source::SourceFilter;
use crate::store::models::{RunLedgerRow, StoredRecord, UpsertAction, UpsertOutcome};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("row-level failure for {internal_id}: {message}")]
    Row {
        internal_id: String,
        message: String,
    },
}

/// Data access for stored documents and the run ledger.
#[async_trait]
pub trait DocumentDao: Send + Sync {
    async fn get_by_internal_id(
        &self,
        internal_id: &str,
    ) -> Result<Option<StoredRecord>, StoreError>;

    /// Idempotent upsert keyed by `internal_id`: equal `content_hash` is a
    /// no-op reported `unchanged`; a differing hash updates content, blob
    /// and `updated_at`; a missing row inserts. One transaction per record.
    async fn upsert_record(&self, record: &StoredRecord) -> Result<UpsertOutcome, StoreError>;

    async fn list_records(
        &self,
        filter: &SourceFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredRecord>, StoreError>;

    async fn insert_run_ledger(&self, row: &RunLedgerRow) -> Result<(), StoreError>;
}

pub struct PgDocumentDao {
    pool: PgPool,
}

impl PgDocumentDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS documents (
                id BIGSERIAL PRIMARY KEY,
                internal_id TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                case_number TEXT,
                jurisdiction_id TEXT,
                content TEXT NOT NULL DEFAULT '',
                content_hash TEXT NOT NULL,
                metadata_blob JSONB NOT NULL DEFAULT '{}'::JSONB,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS enrichment_runs (
                run_id UUID PRIMARY KEY,
                started_at TIMESTAMPTZ NOT NULL,
                finished_at TIMESTAMPTZ NOT NULL,
                records_attempted BIGINT NOT NULL,
                records_new BIGINT NOT NULL,
                records_updated BIGINT NOT NULL,
                records_unchanged BIGINT NOT NULL,
                records_errored BIGINT NOT NULL,
                report_blob JSONB NOT NULL
            );
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<StoredRecord, sqlx::Error> {
        Ok(StoredRecord {
            internal_id: row.try_get("internal_id")?,
            kind: row.try_get("kind")?,
            case_number: row.try_get("case_number")?,
            jurisdiction_id: row.try_get("jurisdiction_id")?,
            content: row.try_get("content")?,
            content_hash: row.try_get("content_hash")?,
            metadata_blob: row.try_get("metadata_blob")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl DocumentDao for PgDocumentDao {
    async fn get_by_internal_id(
        &self,
        internal_id: &str,
    ) -> Result<Option<StoredRecord>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT internal_id, kind, case_number, jurisdiction_id,
                   content, content_hash, metadata_blob, updated_at
            FROM documents
            WHERE internal_id = $1
            ",
        )
        .bind(internal_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(Self::record_from_row)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn upsert_record(&self, record: &StoredRecord) -> Result<UpsertOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            "SELECT id, content_hash FROM documents WHERE internal_id = $1 FOR UPDATE",
        )
        .bind(&record.internal_id)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            None => {
                let row = sqlx::query(
                    r"
                    INSERT INTO documents
                        (internal_id, kind, case_number, jurisdiction_id,
                         content, content_hash, metadata_blob, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    RETURNING id
                    ",
                )
                .bind(&record.internal_id)
                .bind(&record.kind)
                .bind(&record.case_number)
                .bind(&record.jurisdiction_id)
                .bind(&record.content)
                .bind(&record.content_hash)
                .bind(&record.metadata_blob)
                .bind(record.updated_at)
                .fetch_one(&mut *tx)
                .await?;
                UpsertOutcome {
                    action: UpsertAction::New,
                    row_id: row.try_get("id")?,
                }
            }
            Some(row) => {
                let row_id: i64 = row.try_get("id")?;
                let stored_hash: String = row.try_get("content_hash")?;
                if stored_hash == record.content_hash {
                    UpsertOutcome {
                        action: UpsertAction::Unchanged,
                        row_id,
                    }
                } else {
                    sqlx::query(
                        r"
                        UPDATE documents
                        SET kind = $2, case_number = $3, jurisdiction_id = $4,
                            content = $5, content_hash = $6, metadata_blob = $7,
                            updated_at = $8
                        WHERE id = $1
                        ",
                    )
                    .bind(row_id)
                    .bind(&record.kind)
                    .bind(&record.case_number)
                    .bind(&record.jurisdiction_id)
                    .bind(&record.content)
                    .bind(&record.content_hash)
                    .bind(&record.metadata_blob)
                    .bind(Utc::now())
                    .execute(&mut *tx)
                    .await?;
                    UpsertOutcome {
                        action: UpsertAction::Updated,
                        row_id,
                    }
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn list_records(
        &self,
        filter: &SourceFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        // Dynamic filters are bound positionally; absent filters bind NULL
        // and collapse in the WHERE clause.
        let jurisdictions: Option<Vec<String>> = if filter.jurisdictions.is_empty() {
            None
        } else {
            Some(filter.jurisdictions.iter().cloned().collect())
        };
        let query_like = filter.query.as_ref().map(|q| format!("%{q}%"));

        let rows = sqlx::query(
            r"
            SELECT internal_id, kind, case_number, jurisdiction_id,
                   content, content_hash, metadata_blob, updated_at
            FROM documents
            WHERE ($1::TEXT[] IS NULL OR jurisdiction_id = ANY($1))
              AND ($2::TEXT IS NULL OR kind = $2)
              AND ($3::TIMESTAMPTZ IS NULL OR updated_at >= $3)
              AND ($4::TIMESTAMPTZ IS NULL OR updated_at < $4)
              AND ($5::TEXT IS NULL OR content ILIKE $5)
            ORDER BY id
            LIMIT $6 OFFSET $7
            ",
        )
        .bind(jurisdictions)
        .bind(&filter.kind)
        .bind(filter.date_start)
        .bind(filter.date_end)
        .bind(query_like)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(Self::record_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn insert_run_ledger(&self, row: &RunLedgerRow) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO enrichment_runs
                (run_id, started_at, finished_at, records_attempted,
                 records_new, records_updated, records_unchanged,
                 records_errored, report_blob)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(row.run_id)
        .bind(row.started_at)
        .bind(row.finished_at)
        .bind(row.records_attempted)
        .bind(row.records_new)
        .bind(row.records_updated)
        .bind(row.records_unchanged)
        .bind(row.records_errored)
        .bind(&row.report_blob)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub mod mock {
    //! In-memory DAO with the same upsert semantics as Postgres.

    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;

    use super::{
        DocumentDao, RunLedgerRow, SourceFilter, StoreError, StoredRecord, UpsertAction,
        UpsertOutcome,
    };
    use async_trait::async_trait;

    #[derive(Default)]
    struct MockState {
        rows: BTreeMap<String, (i64, StoredRecord)>,
        next_id: i64,
        ledger: Vec<RunLedgerRow>,
        upsert_calls: usize,
        fail_internal_ids: HashSet<String>,
    }

    #[derive(Default)]
    pub struct MockDocumentDao {
        state: Mutex<MockState>,
    }

    impl MockDocumentDao {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every upsert for the given internal id fail, to exercise
        /// row-level error isolation.
        pub fn fail_upserts_for(&self, internal_id: &str) {
            self.state
                .lock()
                .expect("mock state lock")
                .fail_internal_ids
                .insert(internal_id.to_string());
        }

        #[must_use]
        pub fn upsert_calls(&self) -> usize {
            self.state.lock().expect("mock state lock").upsert_calls
        }

        #[must_use]
        pub fn row_count(&self) -> usize {
            self.state.lock().expect("mock state lock").rows.len()
        }

        #[must_use]
        pub fn ledger_rows(&self) -> usize {
            self.state.lock().expect("mock state lock").ledger.len()
        }

        #[must_use]
        pub fn stored(&self, internal_id: &str) -> Option<StoredRecord> {
            self.state
                .lock()
                .expect("mock state lock")
                .rows
                .get(internal_id)
                .map(|(_, record)| record.clone())
        }
    }

    #[async_trait]
    impl DocumentDao for MockDocumentDao {
        async fn get_by_internal_id(
            &self,
            internal_id: &str,
        ) -> Result<Option<StoredRecord>, StoreError> {
            Ok(self
                .state
                .lock()
                .expect("mock state lock")
                .rows
                .get(internal_id)
                .map(|(_, record)| record.clone()))
        }

        async fn upsert_record(
            &self,
            record: &StoredRecord,
        ) -> Result<UpsertOutcome, StoreError> {
            let mut state = self.state.lock().expect("mock state lock");
            state.upsert_calls += 1;

            if state.fail_internal_ids.contains(&record.internal_id) {
                return Err(StoreError::Row {
                    internal_id: record.internal_id.clone(),
                    message: "injected failure".to_string(),
                });
            }

            if let Some((row_id, existing)) = state.rows.get(&record.internal_id) {
                let row_id = *row_id;
                if existing.content_hash == record.content_hash {
                    return Ok(UpsertOutcome {
                        action: UpsertAction::Unchanged,
                        row_id,
                    });
                }
                state
                    .rows
                    .insert(record.internal_id.clone(), (row_id, record.clone()));
                return Ok(UpsertOutcome {
                    action: UpsertAction::Updated,
                    row_id,
                });
            }

            state.next_id += 1;
            let row_id = state.next_id;
            state
                .rows
                .insert(record.internal_id.clone(), (row_id, record.clone()));
            Ok(UpsertOutcome {
                action: UpsertAction::New,
                row_id,
            })
        }

        async fn list_records(
            &self,
            filter: &SourceFilter,
            limit: usize,
            offset: usize,
        ) -> Result<Vec<StoredRecord>, StoreError> {
            let state = self.state.lock().expect("mock state lock");
            let mut rows: Vec<(i64, StoredRecord)> = state
                .rows
                .values()
                .filter(|(_, record)| {
                    (filter.jurisdictions.is_empty()
                        || record
                            .jurisdiction_id
                            .as_ref()
                            .is_some_and(|j| filter.jurisdictions.contains(j)))
                        && filter.kind.as_ref().is_none_or(|k| &record.kind == k)
                })
                .cloned()
                .collect();
            rows.sort_by_key(|(row_id, _)| *row_id);
            Ok(rows
                .into_iter()
                .skip(offset)
                .take(limit)
                .map(|(_, record)| record)
                .collect())
        }

        async fn insert_run_ledger(&self, row: &RunLedgerRow) -> Result<(), StoreError> {
            self.state
                .lock()
                .expect("mock state lock")
                .ledger
                .push(row.clone());
            Ok(())
        }
    }

}
