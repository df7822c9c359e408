//! SQLite storage implementation with connection pooling
//!
//! One database file holds lessons, chapters, chunk embeddings, and the
//! chat interaction log. Vectors are persisted as JSON text columns; there
//! is no vector index, matching the exhaustive-scan retrieval model.
//! Replacing a lesson's embeddings is delete-then-insert inside a single
//! transaction so concurrent scans never observe a half-replaced lesson.

use crate::error::{LecternError, Result};
use crate::storage::{DocumentSource, EmbeddingStore, InteractionStore};
use crate::types::{
    ChapterId, ChatInteraction, CompletionOutcome, EmbeddingRecord, InteractionId,
    InteractionStatus, LessonDocument, LessonId, Page, TextChunk, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use deadpool_sqlite::{Config, Pool, Runtime};
use rusqlite::params;
use std::path::Path;
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chapters (
    id         INTEGER PRIMARY KEY,
    title      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS lessons (
    id         INTEGER PRIMARY KEY,
    chapter_id INTEGER NOT NULL REFERENCES chapters(id),
    title      TEXT NOT NULL,
    content    TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS lesson_embeddings (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    lesson_id     INTEGER NOT NULL,
    chunk_text    TEXT NOT NULL,
    chunk_index   INTEGER NOT NULL,
    embedding     TEXT NOT NULL,
    chapter_id    INTEGER NOT NULL,
    lesson_title  TEXT NOT NULL,
    chapter_title TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_lesson_embeddings_lesson
    ON lesson_embeddings(lesson_id);

CREATE TABLE IF NOT EXISTS chat_interactions (
    id                    TEXT PRIMARY KEY,
    user_id               INTEGER NOT NULL,
    question              TEXT NOT NULL,
    status                TEXT NOT NULL,
    response              TEXT,
    error_detail          TEXT,
    confidence_score      REAL,
    retrieved_chunk_count INTEGER,
    related_chapter_ids   TEXT NOT NULL DEFAULT '[]',
    question_timestamp    TEXT NOT NULL,
    response_timestamp    TEXT,
    created_at            TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_interactions_user_time
    ON chat_interactions(user_id, question_timestamp DESC);
";

/// Pooled SQLite store backing embeddings, interactions, and lesson reads
pub struct SqliteStore {
    pool: Pool,
}

/// Fixed-width UTC timestamp so lexicographic order matches chronological
fn to_sql_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_sql_ts(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn conversion_err(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, message.into())
}

fn interaction_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatInteraction> {
    let id_str: String = row.get(0)?;
    let status_str: String = row.get(3)?;
    let related_json: String = row.get(8)?;
    let question_ts: String = row.get(9)?;
    let response_ts: Option<String> = row.get(10)?;
    let created_at: String = row.get(11)?;

    let related_ids: Vec<i64> = serde_json::from_str(&related_json)
        .map_err(|e| conversion_err(8, format!("bad chapter id list: {e}")))?;

    Ok(ChatInteraction {
        id: InteractionId::from_string(&id_str)
            .map_err(|e| conversion_err(0, format!("bad interaction id: {e}")))?,
        user_id: UserId(row.get(1)?),
        question: row.get(2)?,
        status: InteractionStatus::parse(&status_str)
            .ok_or_else(|| conversion_err(3, format!("unknown status '{status_str}'")))?,
        response: row.get(4)?,
        error_detail: row.get(5)?,
        confidence_score: row.get(6)?,
        retrieved_chunk_count: row.get::<_, Option<i64>>(7)?.map(|n| n as u32),
        related_chapter_ids: related_ids.into_iter().map(ChapterId).collect(),
        question_timestamp: from_sql_ts(9, question_ts)?,
        response_timestamp: response_ts.map(|ts| from_sql_ts(10, ts)).transpose()?,
        created_at: from_sql_ts(11, created_at)?,
    })
}

const INTERACTION_COLUMNS: &str = "id, user_id, question, status, response, error_detail, \
     confidence_score, retrieved_chunk_count, related_chapter_ids, \
     question_timestamp, response_timestamp, created_at";

impl SqliteStore {
    /// Open (or create) the database file and build the connection pool
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();
        info!("opening lectern store at {}", path_str);

        let config = Config::new(path_str);
        let pool = config
            .create_pool(Runtime::Tokio1)
            .map_err(|e| LecternError::Database(format!("failed to create pool: {e}")))?;

        Ok(Self { pool })
    }

    /// Create tables and indexes; safe to call repeatedly
    pub async fn init_schema(&self) -> Result<()> {
        self.interact(|conn| {
            // WAL lets scans proceed while a lesson is being replaced
            conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
                .map_err(|e| LecternError::Database(format!("failed to enable WAL: {e}")))?;
            conn.execute_batch(SCHEMA)
                .map_err(|e| LecternError::Database(format!("schema creation failed: {e}")))
        })
        .await
    }

    /// Insert or update a chapter row
    pub async fn put_chapter(&self, id: ChapterId, title: &str) -> Result<()> {
        let title = title.to_string();
        self.interact(move |conn| {
            conn.execute(
                "INSERT INTO chapters (id, title) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET title = excluded.title",
                params![id.0, title],
            )
            .map_err(|e| LecternError::Database(format!("failed to upsert chapter: {e}")))?;
            Ok(())
        })
        .await
    }

    /// Insert or update a lesson row
    pub async fn put_lesson(
        &self,
        id: LessonId,
        chapter_id: ChapterId,
        title: &str,
        content: &str,
    ) -> Result<()> {
        let title = title.to_string();
        let content = content.to_string();
        self.interact(move |conn| {
            conn.execute(
                "INSERT INTO lessons (id, chapter_id, title, content) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     chapter_id = excluded.chapter_id,
                     title = excluded.title,
                     content = excluded.content",
                params![id.0, chapter_id.0, title, content],
            )
            .map_err(|e| LecternError::Database(format!("failed to upsert lesson: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn interact<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
    {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| LecternError::Database(format!("failed to get connection: {e}")))?;

        conn.interact(move |conn| {
            // SQLite gives up immediately under write contention unless a
            // busy timeout is set on the connection
            conn.busy_timeout(std::time::Duration::from_secs(5))
                .map_err(|e| LecternError::Database(format!("failed to set busy timeout: {e}")))?;
            f(conn)
        })
        .await
        .map_err(|e| LecternError::Database(format!("pool interaction failed: {e}")))?
    }
}

#[async_trait]
impl EmbeddingStore for SqliteStore {
    async fn replace_for_lesson(
        &self,
        document: &LessonDocument,
        chunks: &[TextChunk],
        vectors: &[Vec<f32>],
    ) -> Result<usize> {
        if chunks.len() != vectors.len() {
            return Err(LecternError::Inconsistency(format!(
                "embedding count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        let document = document.clone();
        let lesson_id = document.lesson_id;
        let rows: Vec<(String, usize, String)> = chunks
            .iter()
            .zip(vectors.iter())
            .map(|(chunk, vector)| {
                Ok((
                    chunk.text.clone(),
                    chunk.index,
                    serde_json::to_string(vector)?,
                ))
            })
            .collect::<Result<_>>()?;
        let created_at = to_sql_ts(Utc::now());

        let inserted = self
            .interact(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(|e| LecternError::Database(format!("failed to begin tx: {e}")))?;

                tx.execute(
                    "DELETE FROM lesson_embeddings WHERE lesson_id = ?1",
                    params![document.lesson_id.0],
                )
                .map_err(|e| {
                    LecternError::Database(format!("failed to delete old embeddings: {e}"))
                })?;

                {
                    let mut stmt = tx
                        .prepare(
                            "INSERT INTO lesson_embeddings
                                (lesson_id, chunk_text, chunk_index, embedding,
                                 chapter_id, lesson_title, chapter_title, created_at)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        )
                        .map_err(|e| {
                            LecternError::Database(format!("failed to prepare insert: {e}"))
                        })?;

                    for (text, index, embedding_json) in &rows {
                        stmt.execute(params![
                            document.lesson_id.0,
                            text,
                            *index as i64,
                            embedding_json,
                            document.chapter_id.0,
                            document.lesson_title,
                            document.chapter_title,
                            created_at,
                        ])
                        .map_err(|e| {
                            LecternError::Database(format!("failed to insert embedding: {e}"))
                        })?;
                    }
                }

                tx.commit()
                    .map_err(|e| LecternError::Database(format!("failed to commit: {e}")))?;
                Ok(rows.len())
            })
            .await?;

        debug!(
            "replaced embeddings for lesson {}: {} records",
            lesson_id, inserted
        );
        Ok(inserted)
    }

    async fn scan_all(&self) -> Result<Vec<EmbeddingRecord>> {
        self.interact(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, lesson_id, chunk_text, chunk_index, embedding,
                            chapter_id, lesson_title, chapter_title, created_at
                     FROM lesson_embeddings
                     ORDER BY id",
                )
                .map_err(|e| LecternError::Database(format!("failed to prepare scan: {e}")))?;

            let records = stmt
                .query_map([], |row| {
                    let embedding_json: String = row.get(4)?;
                    let vector: Vec<f32> = serde_json::from_str(&embedding_json)
                        .map_err(|e| conversion_err(4, format!("bad embedding column: {e}")))?;
                    let created_at: String = row.get(8)?;

                    Ok(EmbeddingRecord {
                        id: row.get(0)?,
                        lesson_id: LessonId(row.get(1)?),
                        chunk_text: row.get(2)?,
                        chunk_index: row.get::<_, i64>(3)? as usize,
                        vector,
                        chapter_id: ChapterId(row.get(5)?),
                        lesson_title: row.get(6)?,
                        chapter_title: row.get(7)?,
                        created_at: from_sql_ts(8, created_at)?,
                    })
                })
                .and_then(|mapped| mapped.collect::<rusqlite::Result<Vec<_>>>())
                .map_err(|e| LecternError::Database(format!("failed to scan embeddings: {e}")))?;

            Ok(records)
        })
        .await
    }

    async fn count_for_lesson(&self, lesson_id: LessonId) -> Result<usize> {
        self.interact(move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM lesson_embeddings WHERE lesson_id = ?1",
                    params![lesson_id.0],
                    |row| row.get(0),
                )
                .map_err(|e| LecternError::Database(format!("failed to count embeddings: {e}")))?;
            Ok(count as usize)
        })
        .await
    }

    async fn delete_for_lesson(&self, lesson_id: LessonId) -> Result<usize> {
        self.interact(move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM lesson_embeddings WHERE lesson_id = ?1",
                    params![lesson_id.0],
                )
                .map_err(|e| LecternError::Database(format!("failed to delete embeddings: {e}")))?;
            Ok(deleted)
        })
        .await
    }
}

#[async_trait]
impl InteractionStore for SqliteStore {
    async fn insert_pending(&self, interaction: &ChatInteraction) -> Result<()> {
        let interaction = interaction.clone();
        self.interact(move |conn| {
            let related = serde_json::to_string(
                &interaction
                    .related_chapter_ids
                    .iter()
                    .map(|c| c.0)
                    .collect::<Vec<i64>>(),
            )?;

            conn.execute(
                &format!(
                    "INSERT INTO chat_interactions ({INTERACTION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    interaction.id.to_string(),
                    interaction.user_id.0,
                    interaction.question,
                    interaction.status.as_str(),
                    interaction.response,
                    interaction.error_detail,
                    interaction.confidence_score,
                    interaction.retrieved_chunk_count.map(|n| n as i64),
                    related,
                    to_sql_ts(interaction.question_timestamp),
                    interaction.response_timestamp.map(to_sql_ts),
                    to_sql_ts(interaction.created_at),
                ],
            )
            .map_err(|e| LecternError::Database(format!("failed to insert interaction: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn mark_completed(&self, id: InteractionId, outcome: &CompletionOutcome) -> Result<()> {
        let outcome = outcome.clone();
        self.interact(move |conn| {
            let related = serde_json::to_string(
                &outcome
                    .related_chapter_ids
                    .iter()
                    .map(|c| c.0)
                    .collect::<Vec<i64>>(),
            )?;

            let updated = conn
                .execute(
                    "UPDATE chat_interactions
                     SET status = 'completed',
                         response = ?1,
                         confidence_score = ?2,
                         retrieved_chunk_count = ?3,
                         related_chapter_ids = ?4,
                         response_timestamp = ?5
                     WHERE id = ?6 AND status = 'pending'",
                    params![
                        outcome.response,
                        outcome.confidence_score,
                        outcome.retrieved_chunk_count as i64,
                        related,
                        to_sql_ts(outcome.response_timestamp),
                        id.to_string(),
                    ],
                )
                .map_err(|e| {
                    LecternError::Database(format!("failed to complete interaction: {e}"))
                })?;

            if updated == 0 {
                return Err(LecternError::Inconsistency(format!(
                    "interaction {id} is not pending"
                )));
            }
            Ok(())
        })
        .await
    }

    async fn mark_failed(
        &self,
        id: InteractionId,
        error_detail: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let error_detail = error_detail.to_string();
        self.interact(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE chat_interactions
                     SET status = 'failed',
                         error_detail = ?1,
                         confidence_score = 0,
                         retrieved_chunk_count = 0,
                         related_chapter_ids = '[]',
                         response_timestamp = ?2
                     WHERE id = ?3 AND status = 'pending'",
                    params![error_detail, to_sql_ts(at), id.to_string()],
                )
                .map_err(|e| LecternError::Database(format!("failed to fail interaction: {e}")))?;

            if updated == 0 {
                return Err(LecternError::Inconsistency(format!(
                    "interaction {id} is not pending"
                )));
            }
            Ok(())
        })
        .await
    }

    async fn get(&self, id: InteractionId) -> Result<Option<ChatInteraction>> {
        self.interact(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {INTERACTION_COLUMNS} FROM chat_interactions WHERE id = ?1"
                ))
                .map_err(|e| LecternError::Database(format!("failed to prepare get: {e}")))?;

            match stmt.query_row(params![id.to_string()], interaction_from_row) {
                Ok(interaction) => Ok(Some(interaction)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(LecternError::Database(format!(
                    "failed to fetch interaction: {e}"
                ))),
            }
        })
        .await
    }

    async fn history(
        &self,
        user_id: UserId,
        page: usize,
        size: usize,
    ) -> Result<Page<ChatInteraction>> {
        self.interact(move |conn| {
            let total: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM chat_interactions WHERE user_id = ?1",
                    params![user_id.0],
                    |row| row.get(0),
                )
                .map_err(|e| LecternError::Database(format!("failed to count history: {e}")))?;

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {INTERACTION_COLUMNS} FROM chat_interactions
                     WHERE user_id = ?1
                     ORDER BY question_timestamp DESC
                     LIMIT ?2 OFFSET ?3"
                ))
                .map_err(|e| LecternError::Database(format!("failed to prepare history: {e}")))?;

            let items = stmt
                .query_map(
                    params![user_id.0, size as i64, (page * size) as i64],
                    interaction_from_row,
                )
                .and_then(|mapped| mapped.collect::<rusqlite::Result<Vec<_>>>())
                .map_err(|e| LecternError::Database(format!("failed to fetch history: {e}")))?;

            Ok(Page {
                items,
                page,
                size,
                total_items: total as u64,
            })
        })
        .await
    }
}

#[async_trait]
impl DocumentSource for SqliteStore {
    async fn fetch(&self, lesson_id: LessonId) -> Result<Option<LessonDocument>> {
        self.interact(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT l.id, l.title, l.content, c.id, c.title
                     FROM lessons l JOIN chapters c ON c.id = l.chapter_id
                     WHERE l.id = ?1",
                )
                .map_err(|e| LecternError::Database(format!("failed to prepare fetch: {e}")))?;

            let result = stmt.query_row(params![lesson_id.0], |row| {
                Ok(LessonDocument {
                    lesson_id: LessonId(row.get(0)?),
                    lesson_title: row.get(1)?,
                    content: row.get(2)?,
                    chapter_id: ChapterId(row.get(3)?),
                    chapter_title: row.get(4)?,
                })
            });

            match result {
                Ok(document) => Ok(Some(document)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(LecternError::Database(format!(
                    "failed to fetch lesson: {e}"
                ))),
            }
        })
        .await
    }

    async fn list_lesson_ids(&self) -> Result<Vec<LessonId>> {
        self.interact(|conn| {
            let mut stmt = conn
                .prepare("SELECT id FROM lessons ORDER BY id")
                .map_err(|e| LecternError::Database(format!("failed to prepare list: {e}")))?;

            let ids = stmt
                .query_map([], |row| Ok(LessonId(row.get(0)?)))
                .and_then(|mapped| mapped.collect::<rusqlite::Result<Vec<_>>>())
                .map_err(|e| LecternError::Database(format!("failed to list lessons: {e}")))?;
            Ok(ids)
        })
        .await
    }
}
