//! Caption processing: turns raw WebVTT caption tracks into normalized,
//! timestamped transcript segments and derived text artifacts.
//!
//! Normalization guarantees the segment invariants the rest of the pipeline
//! relies on: indices are 0-based and dense, chronological and index order
//! agree, `end_time > start_time`, and adjacent segments never overlap.

pub mod vtt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use lessonvault_shared::{LessonVaultError, Result, TrackKind, TranscriptSegment};

use vtt::Cue;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One downloaded caption track, body included.
#[derive(Debug, Clone)]
pub struct CaptionTrack {
    pub kind: TrackKind,
    pub lang: String,
    /// Raw WebVTT body.
    pub body: String,
}

/// All caption tracks staged for one item.
#[derive(Debug, Clone, Default)]
pub struct CaptionSet {
    pub tracks: Vec<CaptionTrack>,
}

impl CaptionSet {
    /// Pick the best track: a manually authored one wins over auto-generated.
    pub fn best_track(&self) -> Option<&CaptionTrack> {
        self.tracks
            .iter()
            .find(|t| t.kind == TrackKind::Manual)
            .or_else(|| self.tracks.first())
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Result of processing one item's captions.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedTranscript {
    pub segments: Vec<TranscriptSegment>,
    /// Segment texts joined by single spaces.
    pub full_text: String,
    pub word_count: usize,
}

/// The processed transcript JSON artifact written to the object store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptArtifact {
    pub content_id: String,
    pub source_id: String,
    pub segments: Vec<TranscriptSegment>,
    pub full_text: String,
    pub word_count: usize,
}

impl TranscriptArtifact {
    pub fn new(source_id: &str, content_id: &str, processed: &ProcessedTranscript) -> Self {
        Self {
            content_id: content_id.to_string(),
            source_id: source_id.to_string(),
            segments: processed.segments.clone(),
            full_text: processed.full_text.clone(),
            word_count: processed.word_count,
        }
    }
}

/// Companion plain-text artifact: segment texts in index order, one per line.
pub fn plain_text(processed: &ProcessedTranscript) -> String {
    processed
        .segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Processing
// ---------------------------------------------------------------------------

/// Process a caption set into a normalized transcript.
///
/// Returns [`LessonVaultError::NoTranscript`] when the set has no tracks —
/// a skippable outcome, not a failure.
pub fn process(captions: &CaptionSet) -> Result<ProcessedTranscript> {
    let track = captions.best_track().ok_or(LessonVaultError::NoTranscript)?;

    debug!(kind = ?track.kind, lang = %track.lang, "processing caption track");

    let cues = vtt::parse_vtt(&track.body)?;
    let segments = normalize(cues);

    let full_text = segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let word_count = full_text.split_whitespace().count();

    Ok(ProcessedTranscript {
        segments,
        full_text,
        word_count,
    })
}

/// Normalize raw cues into ordered, non-overlapping segments:
/// sort chronologically, merge identical-text continuations, clip each cue's
/// end to the next cue's start, drop cues left empty or zero-width, then
/// assign dense indices.
fn normalize(mut cues: Vec<Cue>) -> Vec<TranscriptSegment> {
    cues.retain(|c| !c.text.is_empty());
    cues.sort_by(|a, b| a.start.total_cmp(&b.start));

    // Styling-induced repetition: the same text emitted again as the caption
    // window scrolls. Merge the repeat into the previous cue's span.
    let mut merged: Vec<Cue> = Vec::with_capacity(cues.len());
    for cue in cues {
        match merged.last_mut() {
            Some(prev) if prev.text == cue.text => {
                prev.end = prev.end.max(cue.end);
            }
            _ => merged.push(cue),
        }
    }

    // Clip overlaps against the following cue's start.
    for i in 0..merged.len().saturating_sub(1) {
        let next_start = merged[i + 1].start;
        if merged[i].end > next_start {
            merged[i].end = next_start;
        }
    }

    merged
        .into_iter()
        .filter(|c| c.end > c.start)
        .enumerate()
        .map(|(index, c)| TranscriptSegment {
            index,
            start_time: c.start,
            end_time: c.end,
            text: c.text,
        })
        .collect()
}
