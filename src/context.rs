//! Renders retrieved chunks into a prompt-ready context block and derives
//! per-query chapter attributions
//!
//! Context blocks carry a `[Source N - Chapter > Lesson]` label so the
//! completion model can cite where material came from. Attribution uses
//! rank-based decay: earlier (more similar) chunks contribute more weight
//! to their owning chapter than later ones.

use crate::types::{ChapterAttribution, ChapterId, ScoredEmbedding};

/// Placeholder emitted when retrieval found nothing above threshold, so the
/// downstream prompt is always well-formed
pub const NO_CONTEXT_PLACEHOLDER: &str = "No relevant context found in the course materials.";

/// Minimum weight a retrieved chunk contributes to its chapter
const MIN_RANK_WEIGHT: f32 = 0.1;

/// Weight lost per rank position
const RANK_DECAY: f32 = 0.1;

/// Render retrieved chunks, in rank order, into a labeled context block
pub fn build_context(chunks: &[ScoredEmbedding]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT_PLACEHOLDER.to_string();
    }

    let mut context = String::new();
    for (i, scored) in chunks.iter().enumerate() {
        context.push_str(&format!(
            "[Source {} - {} > {}]\n",
            i + 1,
            scored.record.chapter_title,
            scored.record.lesson_title
        ));
        context.push_str(&scored.record.chunk_text);
        context.push_str("\n\n");
    }

    context.trim().to_string()
}

struct ChapterTally {
    chapter_id: ChapterId,
    title: String,
    total_weight: f32,
}

/// Derive ranked chapter relevance from the retrieved chunks
///
/// Each chunk at rank `i` contributes `max(0.1, 1.0 - 0.1 * i)` to its
/// chapter's total; totals are normalized by the maximum so the chapter
/// holding the top-ranked chunk scores 1.0. Chapters tie-break in
/// first-seen order.
pub fn attribute_chapters(chunks: &[ScoredEmbedding]) -> Vec<ChapterAttribution> {
    if chunks.is_empty() {
        return Vec::new();
    }

    let mut tallies: Vec<ChapterTally> = Vec::new();
    for (i, scored) in chunks.iter().enumerate() {
        let weight = f32::max(MIN_RANK_WEIGHT, 1.0 - RANK_DECAY * i as f32);
        let chapter_id = scored.record.chapter_id;

        match tallies.iter_mut().find(|t| t.chapter_id == chapter_id) {
            Some(tally) => tally.total_weight += weight,
            None => tallies.push(ChapterTally {
                chapter_id,
                title: scored.record.chapter_title.clone(),
                total_weight: weight,
            }),
        }
    }

    let max_weight = tallies
        .iter()
        .map(|t| t.total_weight)
        .fold(f32::MIN, f32::max)
        .max(f32::EPSILON);

    let mut attributions: Vec<ChapterAttribution> = tallies
        .into_iter()
        .map(|t| ChapterAttribution {
            chapter_id: t.chapter_id,
            chapter_title: t.title,
            relevance_score: f32::min(1.0, t.total_weight / max_weight),
        })
        .collect();

    attributions.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    attributions
}
