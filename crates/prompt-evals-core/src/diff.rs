//! Word-level diff between a prompt and its revision, for display only.

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Added,
    Removed,
    Unchanged,
}

/// A run of text with a single diff kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSegment {
    pub kind: DiffKind,
    pub text: String,
}

/// Diff `old` against `new` word by word. Adjacent changes of the same kind
/// are merged, so the unchanged and removed segments spell `old` and the
/// unchanged and added segments spell `new`.
pub fn word_diff(old: &str, new: &str) -> Vec<DiffSegment> {
    let diff = TextDiff::from_words(old, new);
    let mut segments: Vec<DiffSegment> = Vec::new();

    for change in diff.iter_all_changes() {
        let kind = match change.tag() {
            ChangeTag::Equal => DiffKind::Unchanged,
            ChangeTag::Delete => DiffKind::Removed,
            ChangeTag::Insert => DiffKind::Added,
        };
        match segments.last_mut() {
            Some(last) if last.kind == kind => last.text.push_str(change.value()),
            _ => segments.push(DiffSegment {
                kind,
                text: change.value().to_string(),
            }),
        }
    }
    segments
}

/// Number of added or removed segments.
pub fn changed_segments(segments: &[DiffSegment]) -> usize {
    segments
        .iter()
        .filter(|s| s.kind != DiffKind::Unchanged)
        .count()
}

/// Plain-text rendering: `[-removed-]` and `{+added+}`.
pub fn render_word_diff(segments: &[DiffSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment.kind {
            DiffKind::Unchanged => out.push_str(&segment.text),
            DiffKind::Removed => {
                out.push_str("[-");
                out.push_str(&segment.text);
                out.push_str("-]");
            }
            DiffKind::Added => {
                out.push_str("{+");
                out.push_str(&segment.text);
                out.push_str("+}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spell(segments: &[DiffSegment], skip: DiffKind) -> String {
        segments
            .iter()
            .filter(|s| s.kind != skip)
            .map(|s| s.text.as_str())
            .collect()
    }

    #[test]
    fn test_segments_rebuild_both_sides() {
        let old = "Answer with the number.";
        let new = "Answer with just the number, nothing else.";
        let segments = word_diff(old, new);
        assert_eq!(spell(&segments, DiffKind::Added), old);
        assert_eq!(spell(&segments, DiffKind::Removed), new);
        assert!(segments
            .iter()
            .any(|s| s.kind == DiffKind::Added && s.text.contains("just")));
    }

    #[test]
    fn test_identical_text_is_one_unchanged_segment() {
        let segments = word_diff("same words here", "same words here");
        assert_eq!(
            segments,
            vec![DiffSegment {
                kind: DiffKind::Unchanged,
                text: "same words here".to_string()
            }]
        );
        assert_eq!(changed_segments(&segments), 0);
    }

    #[test]
    fn test_adjacent_segments_never_share_a_kind() {
        let segments = word_diff("a b c d e", "a x y d z");
        for pair in segments.windows(2) {
            assert_ne!(pair[0].kind, pair[1].kind);
        }
    }

    #[test]
    fn test_render_marks_changes() {
        let segments = vec![
            DiffSegment {
                kind: DiffKind::Unchanged,
                text: "Be ".into(),
            },
            DiffSegment {
                kind: DiffKind::Removed,
                text: "brief".into(),
            },
            DiffSegment {
                kind: DiffKind::Added,
                text: "terse".into(),
            },
        ];
        assert_eq!(render_word_diff(&segments), "Be [-brief-]{+terse+}");
    }

    #[test]
    fn test_empty_old_prompt_is_all_added() {
        let segments = word_diff("", "New prompt");
        assert_eq!(spell(&segments, DiffKind::Removed), "New prompt");
        assert!(segments.iter().all(|s| s.kind == DiffKind::Added));
    }
}
