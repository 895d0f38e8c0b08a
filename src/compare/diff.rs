//! Side-by-side line diff
//!
//! Produces aligned line pairs for two definitions. Replaced runs are
//! paired line by line as `Modified`; whatever is left over on either side
//! becomes `Deleted` or `Inserted`.

use serde::Serialize;
use similar::{DiffOp, TextDiff};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineChange {
    Unchanged,
    Modified,
    Inserted,
    Deleted,
}

/// One aligned row; a side is `None` where it has no line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffLine {
    pub left_number: Option<usize>,
    pub left: Option<String>,
    pub right_number: Option<usize>,
    pub right: Option<String>,
    pub change: LineChange,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffStats {
    pub unchanged: usize,
    pub modified: usize,
    pub inserted: usize,
    pub deleted: usize,
}

impl DiffStats {
    pub fn of(lines: &[DiffLine]) -> Self {
        let mut stats = Self::default();
        for line in lines {
            match line.change {
                LineChange::Unchanged => stats.unchanged += 1,
                LineChange::Modified => stats.modified += 1,
                LineChange::Inserted => stats.inserted += 1,
                LineChange::Deleted => stats.deleted += 1,
            }
        }
        stats
    }

    pub fn is_identical(&self) -> bool {
        self.modified == 0 && self.inserted == 0 && self.deleted == 0
    }
}

fn strip_eol(line: &str) -> String {
    line.trim_end_matches(['\n', '\r']).to_string()
}

fn row(
    left: Option<(usize, &str)>,
    right: Option<(usize, &str)>,
    change: LineChange,
) -> DiffLine {
    DiffLine {
        left_number: left.map(|(i, _)| i + 1),
        left: left.map(|(_, l)| strip_eol(l)),
        right_number: right.map(|(i, _)| i + 1),
        right: right.map(|(_, r)| strip_eol(r)),
        change,
    }
}

/// Align `left` and `right` line by line
pub fn line_diff(left: &str, right: &str) -> Vec<DiffLine> {
    let diff = TextDiff::from_lines(left, right);
    let old = diff.old_slices();
    let new = diff.new_slices();
    let mut lines = Vec::new();

    for op in diff.ops() {
        match *op {
            DiffOp::Equal {
                old_index,
                new_index,
                len,
            } => {
                for k in 0..len {
                    lines.push(row(
                        Some((old_index + k, old[old_index + k])),
                        Some((new_index + k, new[new_index + k])),
                        LineChange::Unchanged,
                    ));
                }
            }
            DiffOp::Delete {
                old_index, old_len, ..
            } => {
                for i in old_index..old_index + old_len {
                    lines.push(row(Some((i, old[i])), None, LineChange::Deleted));
                }
            }
            DiffOp::Insert {
                new_index, new_len, ..
            } => {
                for j in new_index..new_index + new_len {
                    lines.push(row(None, Some((j, new[j])), LineChange::Inserted));
                }
            }
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => {
                let paired = old_len.min(new_len);
                for k in 0..paired {
                    lines.push(row(
                        Some((old_index + k, old[old_index + k])),
                        Some((new_index + k, new[new_index + k])),
                        LineChange::Modified,
                    ));
                }
                for i in old_index + paired..old_index + old_len {
                    lines.push(row(Some((i, old[i])), None, LineChange::Deleted));
                }
                for j in new_index + paired..new_index + new_len {
                    lines.push(row(None, Some((j, new[j])), LineChange::Inserted));
                }
            }
        }
    }

    lines
}

/// Unified diff text with three lines of context
pub fn unified_diff(left: &str, right: &str, left_label: &str, right_label: &str) -> String {
    TextDiff::from_lines(left, right)
        .unified_diff()
        .context_radius(3)
        .header(left_label, right_label)
        .to_string()
}
