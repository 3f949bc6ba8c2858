//! Line-level difference between two configurations.

use std::fmt;

use serde::Serialize;

/// Direction of a changed line, seen from the active configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    /// Present only in the expected configuration.
    Added,
    /// Present only in the active configuration.
    Removed,
}

/// One changed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaLine {
    /// Direction of the change.
    pub kind: DeltaKind,
    /// Line text without trailing whitespace.
    pub text: String,
}

impl DeltaLine {
    fn new(kind: DeltaKind, text: &str) -> Self {
        Self {
            kind,
            text: text.to_owned(),
        }
    }

    /// Whether the line carries no directive.
    #[must_use]
    pub fn is_comment_or_blank(&self) -> bool {
        let trimmed = self.text.trim_start();
        trimmed.is_empty() || trimmed.starts_with('#')
    }
}

impl fmt::Display for DeltaLine {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.kind {
            DeltaKind::Added => '+',
            DeltaKind::Removed => '-',
        };
        write!(formatter, "{marker}{}", self.text)
    }
}

/// Longest-common-subsequence diff of `active` against `expected`.
///
/// Trailing whitespace is ignored. Within a run of changes, removals are
/// listed before additions.
pub(crate) fn line_delta(expected: &str, active: &str) -> Vec<DeltaLine> {
    let new: Vec<&str> = expected.lines().map(str::trim_end).collect();
    let old: Vec<&str> = active.lines().map(str::trim_end).collect();

    // suffix[i][j] holds the LCS length of old[i..] and new[j..].
    let width = new.len() + 1;
    let mut suffix = vec![0_usize; (old.len() + 1) * width];
    for (i, old_line) in old.iter().enumerate().rev() {
        for (j, new_line) in new.iter().enumerate().rev() {
            suffix[i * width + j] = if old_line == new_line {
                suffix[(i + 1) * width + j + 1] + 1
            } else {
                suffix[(i + 1) * width + j].max(suffix[i * width + j + 1])
            };
        }
    }

    let mut delta = Vec::new();
    let (mut i, mut j) = (0, 0);
    while let (Some(old_line), Some(new_line)) = (old.get(i), new.get(j)) {
        if old_line == new_line {
            i += 1;
            j += 1;
        } else if suffix[(i + 1) * width + j] >= suffix[i * width + j + 1] {
            delta.push(DeltaLine::new(DeltaKind::Removed, old_line));
            i += 1;
        } else {
            delta.push(DeltaLine::new(DeltaKind::Added, new_line));
            j += 1;
        }
    }
    delta.extend(
        old.iter()
            .skip(i)
            .map(|line| DeltaLine::new(DeltaKind::Removed, line)),
    );
    delta.extend(
        new.iter()
            .skip(j)
            .map(|line| DeltaLine::new(DeltaKind::Added, line)),
    );
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(delta: &[DeltaLine]) -> Vec<String> {
        delta.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn identical_text_has_no_delta() {
        let text = "span=1,1,0,esf,b8zs\nbchan=1-23\ndchan=24\n";
        assert!(line_delta(text, text).is_empty());
    }

    #[test]
    fn trailing_whitespace_is_ignored() {
        assert!(line_delta("bchan=1-23\n", "bchan=1-23   \n").is_empty());
    }

    #[test]
    fn reports_replaced_lines() {
        let active = "span=1,1,0,esf,b8zs\nbchan=1-23\ndchan=24\n";
        let expected = "span=1,1,0,esf,b8zs\nbchan=1-22\ndchan=24\n";
        assert_eq!(
            rendered(&line_delta(expected, active)),
            ["-bchan=1-23", "+bchan=1-22"]
        );
    }

    #[test]
    fn reports_appended_and_dropped_tails() {
        assert_eq!(
            rendered(&line_delta("a\nb\nc\n", "a\n")),
            ["+b", "+c"]
        );
        assert_eq!(rendered(&line_delta("", "a\nb\n")), ["-a", "-b"]);
    }

    #[test]
    fn recognises_comment_lines() {
        assert!(DeltaLine::new(DeltaKind::Added, "  # generated").is_comment_or_blank());
        assert!(DeltaLine::new(DeltaKind::Removed, "").is_comment_or_blank());
        assert!(!DeltaLine::new(DeltaKind::Added, "dchan=24").is_comment_or_blank());
    }
}
