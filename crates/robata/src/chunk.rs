//! # Text Chunking
//!
//! Splits a body of text into ordered, bounded-length chunks ahead of batch
//! dispatch.
//!
//! ## Splitting priority
//!
//! 1. Paragraph breaks (`'\n'`). Whitespace-only paragraphs are dropped.
//! 2. Greedy accumulation of paragraphs while the running chunk stays within
//!    the effective maximum.
//! 3. Sentence boundaries (`。？！.?!`) inside oversized paragraphs.
//! 4. A hard cut at exactly the effective maximum when no sentence boundary
//!    exists in the scan window.
//!
//! All lengths are counted in characters, not bytes, so CJK input is budgeted
//! the same as ASCII.
//!
//! The effective maximum is 90% of the caller-supplied limit; the remaining
//! 10% absorbs downstream prompt framing so a chunk near the boundary is not
//! truncated by the backend.

use crate::error::ChunkError;

/// Fraction of the caller-supplied maximum actually used per chunk.
pub const SAFETY_MARGIN: f64 = 0.9;

/// Sentence terminators recognized when subdividing an oversized paragraph.
const SENTENCE_TERMINATORS: [char; 6] = ['。', '？', '！', '.', '?', '!'];

/// Splits `text` into ordered chunks of at most `max_length * 0.9` characters.
///
/// Order is significant: downstream aggregation reassembles results by the
/// index each chunk holds in the returned vector.
///
/// # Errors
///
/// Returns [`ChunkError::InvalidMaxLength`] when `max_length` is zero. This is
/// checked before any dispatch so a misconfigured budget fails the whole batch
/// up front.
///
/// # Examples
///
/// ```
/// use robata::chunk::split_text;
///
/// let chunks = split_text("first paragraph\nsecond paragraph", 1024).unwrap();
/// assert_eq!(chunks, vec!["first paragraph\nsecond paragraph".to_string()]);
/// ```
pub fn split_text(text: &str, max_length: usize) -> Result<Vec<String>, ChunkError> {
    if max_length == 0 {
        return Err(ChunkError::InvalidMaxLength(max_length));
    }
    // Clamped to one character so the hard-cut path always makes progress.
    let effective_max = ((max_length as f64 * SAFETY_MARGIN).floor() as usize).max(1);

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for paragraph in text.split('\n') {
        if paragraph.trim().is_empty() {
            continue;
        }
        let paragraph_len = char_count(paragraph);
        let separator = usize::from(!current.is_empty());

        if current_len + separator + paragraph_len <= effective_max {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(paragraph);
            current_len += separator + paragraph_len;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if paragraph_len <= effective_max {
            current = paragraph.to_string();
            current_len = paragraph_len;
        } else {
            // The last sub-chunk stays open so it can still absorb following
            // short paragraphs.
            let mut sub_chunks = split_long_paragraph(paragraph, effective_max);
            let tail = sub_chunks.pop().unwrap_or_default();
            chunks.extend(sub_chunks);
            current_len = char_count(&tail);
            current = tail;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    Ok(chunks)
}

/// Subdivides a paragraph longer than `effective_max` characters.
///
/// Scans the first `effective_max` characters for the last sentence
/// terminator and cuts immediately after it; with no terminator in the window,
/// cuts at exactly `effective_max` characters.
fn split_long_paragraph(paragraph: &str, effective_max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = paragraph;

    loop {
        // Byte offset of the character one past the scan window; `None` means
        // the remainder already fits.
        let window_end = match remaining.char_indices().nth(effective_max) {
            Some((byte_idx, _)) => byte_idx,
            None => break,
        };
        let window = &remaining[..window_end];

        let cut = window
            .char_indices()
            .filter(|(_, c)| SENTENCE_TERMINATORS.contains(c))
            .next_back()
            .map(|(byte_idx, c)| byte_idx + c.len_utf8())
            .unwrap_or(window.len());

        chunks.push(remaining[..cut].to_string());
        remaining = &remaining[cut..];
    }

    if !remaining.is_empty() {
        chunks.push(remaining.to_string());
    }

    chunks
}

#[inline]
fn char_count(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert_eq!(split_text("", 100).unwrap(), Vec::<String>::new());
        assert_eq!(split_text("\n  \n\t\n", 100).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_zero_max_length_is_rejected() {
        assert_eq!(
            split_text("anything", 0),
            Err(ChunkError::InvalidMaxLength(0))
        );
    }

    #[test]
    fn test_short_text_is_a_single_identical_chunk() {
        let text = "a short paragraph";
        let chunks = split_text(text, 100).unwrap();
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_blank_paragraphs_are_dropped_on_merge() {
        let chunks = split_text("first\n\n   \nsecond", 100).unwrap();
        assert_eq!(chunks, vec!["first\nsecond".to_string()]);
    }

    #[test]
    fn test_paragraphs_accumulate_greedily_within_budget() {
        // effective_max = 9: "aa\nbb\ncc" is 8 chars and fits in one chunk
        let chunks = split_text("aa\nbb\ncc", 10).unwrap();
        assert_eq!(chunks, vec!["aa\nbb\ncc".to_string()]);

        // effective_max = 5: "aa\nbb" fits, "cc" overflows and starts fresh
        let chunks = split_text("aa\nbb\ncc", 6).unwrap();
        assert_eq!(chunks, vec!["aa\nbb".to_string(), "cc".to_string()]);
    }

    #[test]
    fn test_sentence_window_scenario() {
        // max_length 20 -> effective_max 18; every cut must land just after a
        // sentence terminator inside the 18 character window
        let text = "Sentence one. Sentence two. Sentence three.";
        let chunks = split_text(text, 20).unwrap();

        assert_eq!(
            chunks,
            vec![
                "Sentence one.".to_string(),
                " Sentence two.".to_string(),
                " Sentence three.".to_string(),
            ]
        );
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 18);
            assert!(chunk.ends_with('.'));
        }
        // Round trip: no characters lost inside a paragraph split
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_terminator_free_run_degrades_to_hard_cuts() {
        let text = "a".repeat(25);
        let chunks = split_text(&text, 10).unwrap();

        let lengths: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(lengths, vec![9, 9, 7]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_full_width_terminators_are_recognized() {
        // 12 characters against effective_max 9 forces one sentence cut
        let text = "你好世界。今天天气很好。";
        let chunks = split_text(text, 10).unwrap();

        assert_eq!(
            chunks,
            vec!["你好世界。".to_string(), "今天天气很好。".to_string()]
        );
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_tail_of_split_paragraph_absorbs_next_paragraph() {
        // First paragraph splits; its short tail then merges with "end"
        let text = format!("{}{}\nend", "x".repeat(9), "y".repeat(3));
        let chunks = split_text(&text, 10).unwrap();

        assert_eq!(
            chunks,
            vec!["x".repeat(9), "yyy\nend".to_string()]
        );
    }

    #[test]
    fn test_round_trip_preserves_paragraph_content() {
        let text = "alpha\nbeta\n\ngamma\ndelta";
        let chunks = split_text(text, 12).unwrap();

        // Rejoining with the consumed separator reconstructs the normalized
        // input (blank paragraphs removed)
        assert_eq!(chunks.join("\n"), "alpha\nbeta\ngamma\ndelta");
    }

    #[test]
    fn test_every_chunk_respects_effective_max() {
        let text =
            "第一段内容比较长，需要被切分。这里还有第二句。\n短段落\nAnother paragraph that is quite long. It has two sentences.";
        let max_length = 20;
        let chunks = split_text(text, max_length).unwrap();

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(
                chunk.chars().count() <= 18,
                "chunk exceeded effective max: {chunk:?}"
            );
        }
    }
}
