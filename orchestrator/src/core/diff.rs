//! Unified diff inspection.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

const DIFF_HEADER: &str = "diff --git ";

/// Line and file counts for a diff, similar to `git diff --numstat` totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSummary {
    pub changed_files: usize,
    pub additions: usize,
    pub deletions: usize,
}

impl PatchSummary {
    pub fn changed_lines(&self) -> usize {
        self.additions + self.deletions
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    #[error("diff must start with a `diff --git ` header")]
    MissingHeader,
}

/// True when the first non-blank line is a `diff --git ` header.
pub fn is_unified_diff(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .is_some_and(|line| line.starts_with(DIFF_HEADER))
}

/// Accept an empty diff or a well-formed unified diff.
pub fn check_diff(text: &str) -> Result<(), DiffError> {
    if text.trim().is_empty() || is_unified_diff(text) {
        return Ok(());
    }
    Err(DiffError::MissingHeader)
}

pub fn summarize_unified_diff(text: &str) -> PatchSummary {
    let mut files = BTreeSet::new();
    let mut summary = PatchSummary::default();

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(DIFF_HEADER) {
            if let Some(path) = rest.split_whitespace().nth(1) {
                files.insert(path.strip_prefix("b/").unwrap_or(path).to_string());
            }
            continue;
        }
        if let Some(path) = line.strip_prefix("+++ b/") {
            files.insert(path.to_string());
            continue;
        }
        if line.starts_with("+++") || line.starts_with("---") || line.starts_with("@@") {
            continue;
        }
        if line.starts_with('+') {
            summary.additions += 1;
        } else if line.starts_with('-') {
            summary.deletions += 1;
        }
    }

    summary.changed_files = files.len();
    summary
}

/// Repo-relative paths the diff creates, in first-seen order.
pub fn find_new_files(text: &str) -> Vec<String> {
    let mut new_files: Vec<String> = Vec::new();
    let mut pending_new = false;
    for line in text.lines() {
        if line.starts_with(DIFF_HEADER) {
            pending_new = false;
            continue;
        }
        if line.starts_with("--- /dev/null") || line.starts_with("new file mode") {
            pending_new = true;
            continue;
        }
        if let Some(path) = line.strip_prefix("+++ b/") {
            if pending_new && !new_files.iter().any(|known| known == path) {
                new_files.push(path.to_string());
            }
            pending_new = false;
        }
    }
    new_files
}
