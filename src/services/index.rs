//! Lesson indexing: chunk, embed, and store lesson content
//!
//! Re-embedding a lesson is destructive-and-replace; the whole operation is
//! idempotent. Same-lesson reindex runs are serialized through a per-lesson
//! mutex so the store's delete-then-insert is never interleaved for one
//! lesson, while different lessons index concurrently.

use crate::chunking::chunk_text;
use crate::config::RagConfig;
use crate::error::{LecternError, Result};
use crate::providers::EmbeddingProvider;
use crate::storage::{DocumentSource, EmbeddingStore};
use crate::types::LessonId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Service that turns lesson content into searchable embeddings
pub struct IndexService {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn EmbeddingStore>,
    documents: Arc<dyn DocumentSource>,
    config: RagConfig,
    lesson_locks: Mutex<HashMap<LessonId, Arc<tokio::sync::Mutex<()>>>>,
}

impl IndexService {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn EmbeddingStore>,
        documents: Arc<dyn DocumentSource>,
        config: RagConfig,
    ) -> Self {
        Self {
            provider,
            store,
            documents,
            config,
            lesson_locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, lesson_id: LessonId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.lesson_locks.lock().expect("lesson lock map poisoned");
        locks.entry(lesson_id).or_default().clone()
    }

    /// (Re)index one lesson's content, returning the number of chunks
    /// created
    ///
    /// `chunk_size`/`chunk_overlap` default to the configured values.
    /// A lesson with blank content is cleared to zero chunks, not an error.
    pub async fn embed_lesson(
        &self,
        lesson_id: LessonId,
        chunk_size: Option<usize>,
        chunk_overlap: Option<usize>,
    ) -> Result<usize> {
        info!("starting embedding run for lesson {lesson_id}");

        let document = self
            .documents
            .fetch(lesson_id)
            .await?
            .ok_or(LecternError::LessonNotFound(lesson_id.0))?;

        let chunk_size = chunk_size.unwrap_or(self.config.chunk_size);
        let chunk_overlap = chunk_overlap.unwrap_or(self.config.chunk_overlap);
        let chunks = chunk_text(&document.content, chunk_size, chunk_overlap)?;
        if chunks.is_empty() {
            warn!("lesson {lesson_id} has no content to embed");
            return Ok(0);
        }
        debug!("generated {} chunks for lesson {lesson_id}", chunks.len());

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.provider.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(LecternError::Inconsistency(format!(
                "embedding count mismatch: expected {}, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        // Serialize same-lesson replacements; the store's transaction keeps
        // each replace atomic for concurrent scans
        let lock = self.lock_for(lesson_id);
        let _guard = lock.lock().await;
        let created = self
            .store
            .replace_for_lesson(&document, &chunks, &vectors)
            .await?;

        info!("created {created} embeddings for lesson {lesson_id}");
        Ok(created)
    }

    /// Reindex every known lesson with the configured chunk parameters
    ///
    /// Per-lesson failures are logged and skipped; returns the total number
    /// of chunks created across the lessons that succeeded.
    pub async fn embed_all_lessons(&self) -> Result<usize> {
        let lesson_ids = self.documents.list_lesson_ids().await?;
        let mut total = 0;

        for lesson_id in &lesson_ids {
            match self.embed_lesson(*lesson_id, None, None).await {
                Ok(created) => total += created,
                Err(e) => warn!("failed to embed lesson {lesson_id}: {e}"),
            }
        }

        info!(
            "embedded {total} total chunks across {} lessons",
            lesson_ids.len()
        );
        Ok(total)
    }
}
