//! Text statistics.

use crate::models::TextStatistics;

/// Count paragraphs, words and characters of `text`.
///
/// A paragraph is a maximal run of non-blank lines; runs are separated by one
/// or more lines that are empty or whitespace-only. Words are
/// whitespace-delimited tokens. Characters are Unicode scalar values.
pub fn text_statistics(text: &str) -> TextStatistics {
    let mut paragraphs = 0;
    let mut in_paragraph = false;
    for line in text.lines() {
        let blank = line.trim().is_empty();
        if !blank && !in_paragraph {
            paragraphs += 1;
        }
        in_paragraph = !blank;
    }

    TextStatistics {
        paragraphs,
        words: text.split_whitespace().count(),
        characters: text.chars().count(),
    }
}
