// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite-backed implementation of the `StateStore` and `QueueStore`
//! ports (§4.1, §4.2), sharing one `SqlitePool` between both.
//!
//! Every mutating queue operation runs inside a hand-managed `BEGIN
//! IMMEDIATE` transaction (I4) rather than `sqlx::Transaction`'s default
//! `BEGIN DEFERRED`, since SQLite only escalates a deferred transaction to
//! a write lock on its first write statement — too late to prevent two
//! concurrent claims from both passing the readiness check before either
//! has written its `inflight` row.

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use pipeline_domain::error::{PipelineError, Result};
use pipeline_domain::repositories::{QueueStore, StateStore};
use pipeline_domain::value_objects::{ArtifactValue, DocId, QueueName};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::infrastructure::repositories::schema;

fn now_secs() -> f64 {
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    d.as_secs_f64()
}

fn sql_err(e: sqlx::Error) -> PipelineError {
    PipelineError::store(e.to_string())
}

/// Durable state + queue store over one SQLite database file, opened in
/// WAL mode so readers never block writers on already-committed data
/// (§4.1 "Write-ahead logging is enabled").
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        schema::create_database_if_missing(database_url).await.map_err(sql_err)?;

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(sql_err)?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await
            .map_err(sql_err)?;

        schema::ensure_schema(&pool).await.map_err(sql_err)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Destructive classic-mode claim (§9 Open Question #1): same
    /// readiness predicate and tie-break as
    /// [`QueueStore::queue_claim_intersection`], but additionally removes
    /// the claimed document's rows from every participating op queue.
    /// Not reachable through [`QueueStore`]; no stage definition in this
    /// workspace uses it (see `DESIGN.md`).
    #[doc(hidden)]
    pub async fn queue_pop_intersection(
        &self,
        op_queue_names: &[QueueName],
        done_queue: &QueueName,
    ) -> Result<Option<DocId>> {
        let mut conn = self.pool.acquire().await.map_err(sql_err)?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await.map_err(sql_err)?;

        let candidate = match select_classic_candidate(&mut conn, op_queue_names, done_queue).await {
            Ok(c) => c,
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        };

        let Some(doc_id) = candidate else {
            sqlx::query("ROLLBACK").execute(&mut *conn).await.map_err(sql_err)?;
            return Ok(None);
        };

        for q in op_queue_names {
            if let Err(e) = sqlx::query("DELETE FROM queue_items WHERE queue_name = ? AND doc_id = ?")
                .bind(q.as_str())
                .bind(doc_id.get())
                .execute(&mut *conn)
                .await
            {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(sql_err(e));
            }
        }

        if let Err(e) = insert_inflight(&mut conn, done_queue, doc_id).await {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            return Err(e);
        }

        sqlx::query("COMMIT").execute(&mut *conn).await.map_err(sql_err)?;
        Ok(Some(doc_id))
    }

    /// Lists every artifact name stored for a document, in sorted order
    /// (§4.1's `list_files`). Not part of the `StateStore` port since no
    /// stage in this workspace needs it, but kept as a store-level
    /// convenience per the public contract in `spec.md` §4.1.
    pub async fn list_files(&self, doc_id: DocId) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM files WHERE doc_id = ? ORDER BY name ASC")
            .bind(doc_id.get())
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err)?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("name")).collect())
    }

    /// Counts stored artifacts, optionally restricted to one name across
    /// all documents (§4.1's `count_files`).
    pub async fn count_files(&self, name: Option<&str>) -> Result<i64> {
        let count: i64 = match name {
            Some(n) => sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE name = ?")
                .bind(n)
                .fetch_one(&self.pool)
                .await
                .map_err(sql_err)?,
            None => sqlx::query_scalar("SELECT COUNT(*) FROM files")
                .fetch_one(&self.pool)
                .await
                .map_err(sql_err)?,
        };
        Ok(count)
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get_abstract(&self, doc_id: DocId) -> Result<String> {
        let row = sqlx::query("SELECT abstract FROM abs WHERE doc_id = ?")
            .bind(doc_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;

        match row {
            Some(r) => Ok(r.get::<String, _>("abstract")),
            None => Err(PipelineError::input_missing(doc_id.get(), "abstract")),
        }
    }

    async fn put_abstract(&self, doc_id: DocId, text: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO abs (doc_id, abstract) VALUES (?, ?)
             ON CONFLICT(doc_id) DO UPDATE SET abstract = excluded.abstract",
        )
        .bind(doc_id.get())
        .bind(text)
        .execute(&self.pool)
        .await
        .map_err(sql_err)?;
        Ok(())
    }

    async fn get(&self, doc_id: DocId, name: &str) -> Result<Option<ArtifactValue>> {
        let row = sqlx::query("SELECT content FROM files WHERE doc_id = ? AND name = ?")
            .bind(doc_id.get())
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;

        let Some(row) = row else { return Ok(None) };
        let content: String = row.get("content");

        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(value) => Ok(Some(ArtifactValue::Json(value))),
            Err(_) => Ok(Some(ArtifactValue::Text(content))),
        }
    }

    async fn put(&self, doc_id: DocId, name: &str, value: ArtifactValue) -> Result<()> {
        let content = match value {
            ArtifactValue::Json(v) => serde_json::to_string(&v)?,
            ArtifactValue::Text(s) => s,
        };

        sqlx::query(
            "INSERT INTO files (doc_id, name, content) VALUES (?, ?, ?)
             ON CONFLICT(doc_id, name) DO UPDATE SET content = excluded.content",
        )
        .bind(doc_id.get())
        .bind(name)
        .bind(content)
        .execute(&self.pool)
        .await
        .map_err(sql_err)?;
        Ok(())
    }

    async fn has(&self, doc_id: DocId, name: &str) -> Result<bool> {
        let row: Option<i64> = sqlx::query_scalar("SELECT 1 FROM files WHERE doc_id = ? AND name = ? LIMIT 1")
            .bind(doc_id.get())
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;
        Ok(row.is_some())
    }

    async fn all_doc_ids(&self) -> Result<Vec<DocId>> {
        let rows: Vec<i64> = sqlx::query_scalar("SELECT doc_id FROM abs ORDER BY doc_id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err)?;
        Ok(rows.into_iter().map(DocId::new).collect())
    }
}

/// Selects the classic-mode claim candidate without committing, per the
/// readiness predicate of §4.2: intersection over `op_queue_names`,
/// excluding `done_queue` and `done_queue`'s inflight set, tie-broken by
/// the smallest `MAX(id)` across the participating queues (approximate
/// FIFO, §9 Open Question #2).
async fn select_classic_candidate(
    conn: &mut sqlx::SqliteConnection,
    op_queue_names: &[QueueName],
    done_queue: &QueueName,
) -> Result<Option<DocId>> {
    if op_queue_names.is_empty() {
        return Ok(None);
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "WITH candidates AS (
            SELECT doc_id, MAX(id) AS max_id
            FROM queue_items
            WHERE queue_name IN (",
    );
    {
        let mut sep = qb.separated(", ");
        for q in op_queue_names {
            sep.push_bind(q.as_str());
        }
    }
    qb.push(") GROUP BY doc_id HAVING COUNT(DISTINCT queue_name) = ");
    qb.push_bind(op_queue_names.len() as i64);
    qb.push(
        ")
        SELECT c.doc_id AS doc_id FROM candidates c
        WHERE NOT EXISTS (SELECT 1 FROM queue_done WHERE queue_name = ",
    );
    qb.push_bind(done_queue.as_str());
    qb.push(" AND doc_id = c.doc_id)
        AND NOT EXISTS (SELECT 1 FROM queue_inflight WHERE stage_name = ");
    qb.push_bind(done_queue.as_str());
    qb.push(
        " AND doc_id = c.doc_id)
        ORDER BY c.max_id ASC
        LIMIT 1",
    );

    let row = qb.build().fetch_optional(&mut *conn).await.map_err(sql_err)?;
    Ok(row.map(|r| DocId::new(r.get::<i64, _>("doc_id"))))
}

/// Selects the pass-through-mode claim candidate: intersection over
/// `source_done_queues`' done sets, tie-broken by earliest `MIN(created_at)`
/// across the participating sources.
async fn select_done_candidate(
    conn: &mut sqlx::SqliteConnection,
    source_done_queues: &[QueueName],
    done_queue: &QueueName,
) -> Result<Option<DocId>> {
    if source_done_queues.is_empty() {
        return Ok(None);
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "WITH candidates AS (
            SELECT doc_id, MIN(created_at) AS min_created
            FROM queue_done
            WHERE queue_name IN (",
    );
    {
        let mut sep = qb.separated(", ");
        for q in source_done_queues {
            sep.push_bind(q.as_str());
        }
    }
    qb.push(") GROUP BY doc_id HAVING COUNT(DISTINCT queue_name) = ");
    qb.push_bind(source_done_queues.len() as i64);
    qb.push(
        ")
        SELECT c.doc_id AS doc_id FROM candidates c
        WHERE NOT EXISTS (SELECT 1 FROM queue_done WHERE queue_name = ",
    );
    qb.push_bind(done_queue.as_str());
    qb.push(" AND doc_id = c.doc_id)
        AND NOT EXISTS (SELECT 1 FROM queue_inflight WHERE stage_name = ");
    qb.push_bind(done_queue.as_str());
    qb.push(
        " AND doc_id = c.doc_id)
        ORDER BY c.min_created ASC
        LIMIT 1",
    );

    let row = qb.build().fetch_optional(&mut *conn).await.map_err(sql_err)?;
    Ok(row.map(|r| DocId::new(r.get::<i64, _>("doc_id"))))
}

async fn insert_inflight(conn: &mut sqlx::SqliteConnection, stage_name: &QueueName, doc_id: DocId) -> Result<()> {
    sqlx::query(
        "INSERT INTO queue_inflight (stage_name, doc_id, started_at) VALUES (?, ?, ?)
         ON CONFLICT(stage_name, doc_id) DO NOTHING",
    )
    .bind(stage_name.as_str())
    .bind(doc_id.get())
    .bind(now_secs())
    .execute(&mut *conn)
    .await
    .map_err(sql_err)?;
    Ok(())
}

#[async_trait]
impl QueueStore for SqliteStateStore {
    async fn queue_append(&self, queue_name: &QueueName, doc_id: DocId) -> Result<()> {
        sqlx::query(
            "INSERT INTO queue_items (queue_name, doc_id, created_at) VALUES (?, ?, ?)
             ON CONFLICT(queue_name, doc_id) DO NOTHING",
        )
        .bind(queue_name.as_str())
        .bind(doc_id.get())
        .bind(now_secs())
        .execute(&self.pool)
        .await
        .map_err(sql_err)?;
        Ok(())
    }

    async fn queue_requeue_many(&self, queue_names: &[QueueName], doc_id: DocId) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(sql_err)?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await.map_err(sql_err)?;

        for q in queue_names {
            let res = async {
                sqlx::query("DELETE FROM queue_items WHERE queue_name = ? AND doc_id = ?")
                    .bind(q.as_str())
                    .bind(doc_id.get())
                    .execute(&mut *conn)
                    .await?;
                sqlx::query("INSERT INTO queue_items (queue_name, doc_id, created_at) VALUES (?, ?, ?)")
                    .bind(q.as_str())
                    .bind(doc_id.get())
                    .bind(now_secs())
                    .execute(&mut *conn)
                    .await
            }
            .await;

            if let Err(e) = res {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(sql_err(e));
            }
        }

        sqlx::query("COMMIT").execute(&mut *conn).await.map_err(sql_err)?;
        Ok(())
    }

    async fn queue_claim_intersection(
        &self,
        op_queue_names: &[QueueName],
        done_queue: &QueueName,
    ) -> Result<Option<DocId>> {
        let mut conn = self.pool.acquire().await.map_err(sql_err)?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await.map_err(sql_err)?;

        let candidate = match select_classic_candidate(&mut conn, op_queue_names, done_queue).await {
            Ok(c) => c,
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        };

        let Some(doc_id) = candidate else {
            sqlx::query("ROLLBACK").execute(&mut *conn).await.map_err(sql_err)?;
            return Ok(None);
        };

        if let Err(e) = insert_inflight(&mut conn, done_queue, doc_id).await {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            return Err(e);
        }

        sqlx::query("COMMIT").execute(&mut *conn).await.map_err(sql_err)?;
        Ok(Some(doc_id))
    }

    async fn queue_claim_done_intersection(
        &self,
        source_done_queues: &[QueueName],
        done_queue: &QueueName,
    ) -> Result<Option<DocId>> {
        let mut conn = self.pool.acquire().await.map_err(sql_err)?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await.map_err(sql_err)?;

        let candidate = match select_done_candidate(&mut conn, source_done_queues, done_queue).await {
            Ok(c) => c,
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        };

        let Some(doc_id) = candidate else {
            sqlx::query("ROLLBACK").execute(&mut *conn).await.map_err(sql_err)?;
            return Ok(None);
        };

        if let Err(e) = insert_inflight(&mut conn, done_queue, doc_id).await {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            return Err(e);
        }

        sqlx::query("COMMIT").execute(&mut *conn).await.map_err(sql_err)?;
        Ok(Some(doc_id))
    }

    async fn queue_inflight_remove(&self, queue_names: &[QueueName], doc_id: DocId) -> Result<()> {
        for q in queue_names {
            sqlx::query("DELETE FROM queue_inflight WHERE stage_name = ? AND doc_id = ?")
                .bind(q.as_str())
                .bind(doc_id.get())
                .execute(&self.pool)
                .await
                .map_err(sql_err)?;
        }
        Ok(())
    }

    async fn queue_inflight_clear(&self, queue_names: &[QueueName]) -> Result<()> {
        for q in queue_names {
            sqlx::query("DELETE FROM queue_inflight WHERE stage_name = ?")
                .bind(q.as_str())
                .execute(&self.pool)
                .await
                .map_err(sql_err)?;
        }
        Ok(())
    }

    async fn queue_mark_done(&self, done_queue: &QueueName, doc_id: DocId) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(sql_err)?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await.map_err(sql_err)?;

        let res: std::result::Result<(), sqlx::Error> = async {
            sqlx::query("DELETE FROM queue_inflight WHERE stage_name = ? AND doc_id = ?")
                .bind(done_queue.as_str())
                .bind(doc_id.get())
                .execute(&mut *conn)
                .await?;

            sqlx::query(
                "INSERT INTO queue_done (queue_name, doc_id, created_at) VALUES (?, ?, ?)
                 ON CONFLICT(queue_name, doc_id) DO NOTHING",
            )
            .bind(done_queue.as_str())
            .bind(doc_id.get())
            .bind(now_secs())
            .execute(&mut *conn)
            .await?;

            Ok(())
        }
        .await;

        if let Err(e) = res {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            return Err(sql_err(e));
        }

        sqlx::query("COMMIT").execute(&mut *conn).await.map_err(sql_err)?;
        Ok(())
    }

    async fn queue_done_has(&self, done_queue: &QueueName, doc_id: DocId) -> Result<bool> {
        let row: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM queue_done WHERE queue_name = ? AND doc_id = ? LIMIT 1")
                .bind(done_queue.as_str())
                .bind(doc_id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(sql_err)?;
        Ok(row.is_some())
    }

    async fn queue_done_add(&self, done_queue: &QueueName, doc_id: DocId) -> Result<()> {
        sqlx::query(
            "INSERT INTO queue_done (queue_name, doc_id, created_at) VALUES (?, ?, ?)
             ON CONFLICT(queue_name, doc_id) DO NOTHING",
        )
        .bind(done_queue.as_str())
        .bind(doc_id.get())
        .bind(now_secs())
        .execute(&self.pool)
        .await
        .map_err(sql_err)?;
        Ok(())
    }

    async fn queue_done_clear(&self, done_queue: &QueueName) -> Result<()> {
        sqlx::query("DELETE FROM queue_done WHERE queue_name = ?")
            .bind(done_queue.as_str())
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    async fn queue_done_list(&self, done_queue: &QueueName) -> Result<Vec<DocId>> {
        let rows: Vec<i64> =
            sqlx::query_scalar("SELECT doc_id FROM queue_done WHERE queue_name = ? ORDER BY created_at ASC")
                .bind(done_queue.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(sql_err)?;
        Ok(rows.into_iter().map(DocId::new).collect())
    }

    async fn queue_done_count_in(&self, done_queue: &QueueName, doc_ids: &[DocId]) -> Result<usize> {
        const CHUNK: usize = 500;
        let mut total = 0usize;

        for chunk in doc_ids.chunks(CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT COUNT(*) FROM queue_done WHERE queue_name = ");
            qb.push_bind(done_queue.as_str());
            qb.push(" AND doc_id IN (");
            {
                let mut sep = qb.separated(", ");
                for d in chunk {
                    sep.push_bind(d.get());
                }
            }
            qb.push(")");

            let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await.map_err(sql_err)?;
            total += count as usize;
        }

        Ok(total)
    }

    async fn queue_inflight_count(&self, queue_name: &QueueName) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_inflight WHERE stage_name = ?")
            .bind(queue_name.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(sql_err)?;
        Ok(count as usize)
    }

    async fn queue_seed_from_done(&self, source_done_queue: &QueueName, target_queue: &QueueName) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO queue_items (queue_name, doc_id, created_at)
             SELECT ?, doc_id, created_at FROM queue_done WHERE queue_name = ?
             ON CONFLICT(queue_name, doc_id) DO NOTHING",
        )
        .bind(target_queue.as_str())
        .bind(source_done_queue.as_str())
        .execute(&self.pool)
        .await
        .map_err(sql_err)?;

        let _ = result.rows_affected();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    async fn temp_store() -> SqliteStateStore {
        let temp = NamedTempFile::new().unwrap();
        let path = temp.path().to_str().unwrap().to_string();
        drop(temp);
        SqliteStateStore::connect(&format!("sqlite://{path}")).await.unwrap()
    }

    #[tokio::test]
    async fn abstract_roundtrip_and_missing() {
        let store = temp_store().await;
        let doc = DocId::new(1);

        assert!(matches!(
            store.get_abstract(doc).await,
            Err(PipelineError::InputMissing { .. })
        ));

        store.put_abstract(doc, "A. B.").await.unwrap();
        assert_eq!(store.get_abstract(doc).await.unwrap(), "A. B.");

        let ids = store.all_doc_ids().await.unwrap();
        assert_eq!(ids, vec![doc]);
    }

    #[tokio::test]
    async fn artifact_json_and_text_roundtrip() {
        let store = temp_store().await;
        let doc = DocId::new(1);

        store
            .put(doc, "qw.json", ArtifactValue::Json(serde_json::json!({"a": 1})))
            .await
            .unwrap();
        let got = store.get(doc, "qw.json").await.unwrap().unwrap();
        assert_eq!(got, ArtifactValue::Json(serde_json::json!({"a": 1})));

        store.put(doc, "note.txt", ArtifactValue::Text("hello".into())).await.unwrap();
        let got = store.get(doc, "note.txt").await.unwrap().unwrap();
        assert_eq!(got, ArtifactValue::Text("hello".into()));

        assert!(store.has(doc, "qw.json").await.unwrap());
        assert!(!store.has(doc, "missing").await.unwrap());
        assert!(store.get(doc, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn queue_append_is_idempotent() {
        let store = temp_store().await;
        let q = QueueName::new("op_a");
        store.queue_append(&q, DocId::new(1)).await.unwrap();
        store.queue_append(&q, DocId::new(1)).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_items WHERE queue_name = ? AND doc_id = ?")
            .bind(q.as_str())
            .bind(1i64)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn three_way_classic_intersection_claim() {
        let store = temp_store().await;
        let a = QueueName::new("op_a");
        let b = QueueName::new("op_b");
        let s = QueueName::new("stage_c");

        store.queue_append(&a, DocId::new(1)).await.unwrap();
        // doc 1 is not yet ready: only present in op_a
        assert_eq!(store.queue_claim_intersection(&[a.clone(), b.clone()], &s).await.unwrap(), None);

        store.queue_append(&b, DocId::new(1)).await.unwrap();
        let claimed = store.queue_claim_intersection(&[a.clone(), b.clone()], &s).await.unwrap();
        assert_eq!(claimed, Some(DocId::new(1)));

        // already inflight, not claimable again
        assert_eq!(store.queue_claim_intersection(&[a, b], &s).await.unwrap(), None);
    }

    #[tokio::test]
    async fn mark_done_clears_inflight_and_sets_done() {
        let store = temp_store().await;
        let q = QueueName::new("op_a");
        let s = QueueName::new("stage_x");
        store.queue_append(&q, DocId::new(7)).await.unwrap();
        store.queue_claim_intersection(&[q.clone()], &s).await.unwrap();

        store.queue_mark_done(&s, DocId::new(7)).await.unwrap();
        assert!(store.queue_done_has(&s, DocId::new(7)).await.unwrap());

        // idempotent mark-done
        store.queue_mark_done(&s, DocId::new(7)).await.unwrap();
        assert_eq!(store.queue_done_list(&s).await.unwrap(), vec![DocId::new(7)]);
    }

    #[tokio::test]
    async fn inflight_clear_restores_eligibility() {
        let store = temp_store().await;
        let q = QueueName::new("op_x");
        let s = QueueName::new("stage_x");
        store.queue_append(&q, DocId::new(3)).await.unwrap();
        store.queue_claim_intersection(&[q.clone()], &s).await.unwrap();

        assert_eq!(store.queue_claim_intersection(&[q.clone()], &s).await.unwrap(), None);

        store.queue_inflight_clear(&[s.clone()]).await.unwrap();
        assert_eq!(store.queue_claim_intersection(&[q], &s).await.unwrap(), Some(DocId::new(3)));
    }

    #[tokio::test]
    async fn inflight_count_reflects_claims_and_mark_done() {
        let store = temp_store().await;
        let q = QueueName::new("op_a");
        let s = QueueName::new("stage_x");
        store.queue_append(&q, DocId::new(1)).await.unwrap();
        store.queue_append(&q, DocId::new(2)).await.unwrap();

        store.queue_claim_intersection(&[q.clone()], &s).await.unwrap();
        assert_eq!(store.queue_inflight_count(&s).await.unwrap(), 1);

        store.queue_claim_intersection(&[q.clone()], &s).await.unwrap();
        assert_eq!(store.queue_inflight_count(&s).await.unwrap(), 2);

        store.queue_mark_done(&s, DocId::new(1)).await.unwrap();
        assert_eq!(store.queue_inflight_count(&s).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn pass_through_mode_intersection() {
        let store = temp_store().await;
        let done_a = QueueName::new("done_of_a");
        let done_b = QueueName::new("done_of_b");
        let z = QueueName::new("stage_z");

        for d in [1, 2, 3] {
            store.queue_done_add(&done_a, DocId::new(d)).await.unwrap();
        }
        for d in [2, 3, 4] {
            store.queue_done_add(&done_b, DocId::new(d)).await.unwrap();
        }

        let mut claimed = Vec::new();
        while let Some(d) = store
            .queue_claim_done_intersection(&[done_a.clone(), done_b.clone()], &z)
            .await
            .unwrap()
        {
            claimed.push(d.get());
        }
        claimed.sort();
        assert_eq!(claimed, vec![2, 3]);
    }

    #[tokio::test]
    async fn destructive_pop_removes_op_queue_rows() {
        let store = temp_store().await;
        let q = QueueName::new("op_a");
        let s = QueueName::new("stage_c");
        store.queue_append(&q, DocId::new(5)).await.unwrap();

        let popped = store.queue_pop_intersection(&[q.clone()], &s).await.unwrap();
        assert_eq!(popped, Some(DocId::new(5)));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_items WHERE queue_name = ?")
            .bind(q.as_str())
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn seed_from_done_copies_into_op_queue() {
        let store = temp_store().await;
        let done_a = QueueName::new("done_of_a");
        let op_b = QueueName::new("op_for_b");

        store.queue_done_add(&done_a, DocId::new(1)).await.unwrap();
        store.queue_done_add(&done_a, DocId::new(2)).await.unwrap();

        store.queue_seed_from_done(&done_a, &op_b).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_items WHERE queue_name = ?")
            .bind(op_b.as_str())
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 2);
    }
}
