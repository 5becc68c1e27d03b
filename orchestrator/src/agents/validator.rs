//! Static diff validator with size guards.

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use crate::agents::Validator;
use crate::core::diff::{PatchSummary, check_diff, find_new_files, summarize_unified_diff};
use crate::io::config::ValidatorConfig;
use crate::model::{Finding, ValidationReport, Warning};

pub const INVALID_DIFF: &str = "INVALID_DIFF";
pub const SIZE_GUARD: &str = "SIZE_GUARD";
pub const NEW_FILE: &str = "NEW_FILE";

/// Checks diff shape and size without running any tooling.
///
/// Lint and test metrics are always zero; the numstat-style counts are
/// added to the metrics map.
#[derive(Debug, Clone, Default)]
pub struct DiffValidator {
    config: ValidatorConfig,
}

impl DiffValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    fn size_guard(&self, summary: &PatchSummary, new_files: usize) -> Option<Finding> {
        if !self.config.size_guards {
            return None;
        }
        let mut reasons = Vec::new();
        if summary.changed_lines() > self.config.max_changed_lines {
            reasons.push(format!(
                "changed lines {} exceeds limit {}",
                summary.changed_lines(),
                self.config.max_changed_lines
            ));
        }
        if new_files > self.config.max_new_files {
            reasons.push(format!(
                "new files {new_files} exceeds limit {}",
                self.config.max_new_files
            ));
        }
        if reasons.is_empty() {
            return None;
        }
        Some(Finding {
            code: SIZE_GUARD.to_string(),
            file: String::new(),
            line: None,
            message: format!("Diff size guard triggered: {}", reasons.join("; ")),
        })
    }
}

impl Validator for DiffValidator {
    fn validate(&self, diff: &str, base_ref: &str, feature_ref: &str) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();

        if let Err(err) = check_diff(diff) {
            report.fatal.push(Finding {
                code: INVALID_DIFF.to_string(),
                file: String::new(),
                line: None,
                message: err.to_string(),
            });
            return Ok(report);
        }

        let summary = summarize_unified_diff(diff);
        let new_files = find_new_files(diff);
        report
            .fatal
            .extend(self.size_guard(&summary, new_files.len()));
        report.warnings = new_files
            .into_iter()
            .map(|path| Warning {
                code: NEW_FILE.to_string(),
                message: format!("new file {path}"),
                file: path,
            })
            .collect();

        let extra = &mut report.metrics.extra;
        extra.insert("changed_files".into(), Value::from(summary.changed_files));
        extra.insert("additions".into(), Value::from(summary.additions));
        extra.insert("deletions".into(), Value::from(summary.deletions));

        debug!(
            base_ref,
            feature_ref,
            fatal = report.fatal.len(),
            warnings = report.warnings.len(),
            "validated diff"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_file_diff(path: &str, lines: usize) -> String {
        let mut diff = format!(
            "diff --git a/{path} b/{path}\nnew file mode 100644\n--- /dev/null\n+++ b/{path}\n@@ -0,0 +1,{lines} @@\n"
        );
        for i in 0..lines {
            diff.push_str(&format!("+line {i}\n"));
        }
        diff
    }

    #[test]
    fn clean_diff_reports_metrics_and_new_file_warnings() {
        let report = DiffValidator::default()
            .validate(&new_file_diff("docs/a.md", 3), "main", "feature")
            .expect("report");
        assert!(!report.has_fatal());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].file, "docs/a.md");
        assert_eq!(report.metrics.extra["additions"], Value::from(3));
        assert_eq!(report.metrics.tests_failed, 0);
    }

    #[test]
    fn empty_diff_is_clean() {
        let report = DiffValidator::default()
            .validate("", "main", "feature")
            .expect("report");
        assert!(!report.has_fatal());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn malformed_diff_is_fatal() {
        let report = DiffValidator::default()
            .validate("just text", "main", "feature")
            .expect("report");
        assert_eq!(report.fatal[0].code, INVALID_DIFF);
    }

    #[test]
    fn size_guards_trip_on_limits() {
        let validator = DiffValidator::new(ValidatorConfig {
            size_guards: true,
            max_changed_lines: 2,
            max_new_files: 50,
        });
        let report = validator
            .validate(&new_file_diff("a.txt", 3), "main", "feature")
            .expect("report");
        assert_eq!(report.fatal.len(), 1);
        assert_eq!(report.fatal[0].code, SIZE_GUARD);
        assert!(report.fatal[0].message.contains("changed lines 3 exceeds limit 2"));
    }

    #[test]
    fn size_guards_can_be_disabled() {
        let validator = DiffValidator::new(ValidatorConfig {
            size_guards: false,
            max_changed_lines: 1,
            max_new_files: 1,
        });
        let report = validator
            .validate(&new_file_diff("a.txt", 3), "main", "feature")
            .expect("report");
        assert!(!report.has_fatal());
    }
}
