//! WebVTT cue parsing.
//!
//! Accepts the subset of WebVTT produced by caption exporters: an optional
//! `WEBVTT` header, optional cue identifiers, `HH:MM:SS.mmm` or `MM:SS.mmm`
//! timings, inline styling tags, and NOTE/STYLE blocks (ignored).

use std::sync::OnceLock;

use regex::Regex;

use lessonvault_shared::{LessonVaultError, Result};

/// One raw cue before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    /// Seconds from media start.
    pub start: f64,
    pub end: f64,
    pub text: String,
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

/// Parse a WebVTT timestamp (`HH:MM:SS.mmm` or `MM:SS.mmm`) to seconds.
pub fn parse_timestamp(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    let (h, m, sec) = match parts.as_slice() {
        [h, m, s] => (h.parse::<f64>().ok()?, m.parse::<f64>().ok()?, *s),
        [m, s] => (0.0, m.parse::<f64>().ok()?, *s),
        _ => return None,
    };
    // Some exporters write comma decimals (SRT habit).
    let seconds = sec.replace(',', ".").parse::<f64>().ok()?;
    Some(h * 3600.0 + m * 60.0 + seconds)
}

/// Strip styling tags and collapse whitespace in cue text.
fn clean_text(raw: &str) -> String {
    let without_tags = tag_re().replace_all(raw, "");
    without_tags.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a WebVTT document into raw cues, in document order.
///
/// Cues with unparseable timings are skipped; a document with a timing line
/// but no parseable cues at all is reported as a caption error.
pub fn parse_vtt(body: &str) -> Result<Vec<Cue>> {
    let mut cues = Vec::new();
    let mut saw_timing_line = false;
    let mut lines = body.lines().peekable();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();

        // Skip header, blanks, metadata blocks, and cue identifiers; only
        // lines containing an arrow start a cue.
        if !trimmed.contains("-->") {
            continue;
        }
        saw_timing_line = true;

        let mut halves = trimmed.splitn(2, "-->");
        let start = halves.next().and_then(parse_timestamp);
        // The end half may carry cue settings ("00:05.000 line:90%").
        let end = halves
            .next()
            .map(|s| s.trim())
            .and_then(|s| s.split_whitespace().next())
            .and_then(parse_timestamp);

        let (Some(start), Some(end)) = (start, end) else {
            continue;
        };

        // Gather text lines until the next blank line.
        let mut text_lines = Vec::new();
        while let Some(next) = lines.peek() {
            if next.trim().is_empty() {
                break;
            }
            text_lines.push(lines.next().unwrap_or_default());
        }

        let text = clean_text(&text_lines.join(" "));
        cues.push(Cue { start, end, text });
    }

    if cues.is_empty() && saw_timing_line {
        return Err(LessonVaultError::caption(
            "document contains timing lines but no parseable cues",
        ));
    }

    Ok(cues)
}
