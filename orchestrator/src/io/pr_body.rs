//! Pull request title and body rendering.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;
use serde_json::Value;

use crate::model::{StepRecord, ValidationReport};

const PR_BODY_TEMPLATE: &str = include_str!("templates/pr_body.md");

const FALLBACK_TITLE: &str = "Automated update";

/// `"<step title> (<repo>)"`, or the bare title when `repo` is empty.
pub fn pr_title(step_title: &str, repo: &str) -> String {
    let title = step_title.trim();
    let title = if title.is_empty() { FALLBACK_TITLE } else { title };
    let repo = repo.trim();
    if repo.is_empty() {
        title.to_string()
    } else {
        format!("{title} ({repo})")
    }
}

#[derive(Debug, Serialize)]
struct MetricRow {
    name: String,
    value: Value,
}

fn metric_rows(report: &ValidationReport) -> Vec<MetricRow> {
    let metrics = &report.metrics;
    let mut rows = vec![
        MetricRow {
            name: "lint_errors".to_string(),
            value: metrics.lint_errors.into(),
        },
        MetricRow {
            name: "tests_run".to_string(),
            value: metrics.tests_run.into(),
        },
        MetricRow {
            name: "tests_failed".to_string(),
            value: metrics.tests_failed.into(),
        },
    ];
    rows.extend(metrics.extra.iter().map(|(name, value)| MetricRow {
        name: name.clone(),
        value: value.clone(),
    }));
    rows
}

/// Template engine wrapper around minijinja.
pub struct PrBodyRenderer {
    env: Environment<'static>,
}

impl PrBodyRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("pr_body", PR_BODY_TEMPLATE)
            .expect("pr body template should be valid");
        Self { env }
    }

    pub fn render(&self, step: &StepRecord, report: &ValidationReport) -> Result<String> {
        let template = self.env.get_template("pr_body")?;
        let title = step.title.trim();
        let rendered = template.render(context! {
            title => if title.is_empty() { FALLBACK_TITLE } else { title },
            body => Some(step.body.trim()).filter(|s| !s.is_empty()),
            fatal => report.fatal.len(),
            warnings => report.warnings.len(),
            metrics => metric_rows(report),
        })?;
        Ok(rendered)
    }
}

impl Default for PrBodyRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Finding, StepInput};
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn title_includes_repo_when_present() {
        assert_eq!(pr_title("Add route", "org/repo"), "Add route (org/repo)");
        assert_eq!(pr_title("Add route", ""), "Add route");
        assert_eq!(pr_title("  ", "org/repo"), "Automated update (org/repo)");
        assert_eq!(pr_title("", ""), "Automated update");
    }

    #[test]
    fn body_lists_validation_counts_and_metrics() {
        let step = StepRecord::from_input(
            "run-1",
            0,
            StepInput::titled("Add route", "Expose /healthz"),
            Utc::now(),
        );
        let mut report = ValidationReport::placeholder(&step.id);
        report.fatal.push(Finding {
            code: "SIZE_GUARD".into(),
            file: "*".into(),
            line: None,
            message: "too big".into(),
        });
        report.metrics.extra.insert("additions".into(), json!(12));

        let body = PrBodyRenderer::new().render(&step, &report).expect("render");
        assert!(body.starts_with("## Step: Add route\n\nExpose /healthz\n"));
        assert!(body.contains("## Validation"));
        assert!(body.contains("Fatal issues: 1"));
        assert!(body.contains("Warnings: 0"));
        assert!(body.contains("| tests_run | 0 |"));
        assert!(body.contains("| additions | 12 |"));
    }

    #[test]
    fn empty_body_is_skipped() {
        let step = StepRecord::from_input("run-1", 0, StepInput::titled("T", ""), Utc::now());
        let body = PrBodyRenderer::new()
            .render(&step, &ValidationReport::placeholder(&step.id))
            .expect("render");
        assert!(body.starts_with("## Step: T\n\n## Validation"));
    }
}
