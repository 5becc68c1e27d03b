//! Version-control clients: branch management, patch application, and pull
//! requests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use crate::core::branch::validate_branch_name;
use crate::core::diff::{PatchSummary, check_diff, summarize_unified_diff};
use crate::io::git::Git;

/// Pull request handle returned by the hosting side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
}

/// VCS operations the engine needs.
pub trait VcsClient: Send + Sync {
    /// Make sure `feature_ref` exists, branching from `base_ref` if needed.
    fn ensure_branch(&self, base_ref: &str, feature_ref: &str) -> Result<()>;

    /// Apply `diff` on top of `feature_ref`.
    fn apply_patch(&self, feature_ref: &str, diff: &str) -> Result<PatchSummary>;

    /// Open a pull request for `head` against `base`, or update the open one.
    fn create_or_update_pr(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest>;

    fn update_pr_body(&self, pr_number: u64, body: &str) -> Result<()>;
}

/// A call recorded by [`DryRunVcs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcsCall {
    EnsureBranch {
        base: String,
        feature: String,
    },
    ApplyPatch {
        feature: String,
        bytes: usize,
    },
    CreateOrUpdatePr {
        title: String,
        head: String,
        base: String,
    },
    UpdatePrBody {
        number: u64,
    },
}

#[derive(Debug, Default)]
struct DryRunState {
    calls: Vec<VcsCall>,
    prs_by_head: BTreeMap<String, u64>,
    bodies: BTreeMap<u64, String>,
}

/// VCS client that touches nothing and records every call.
///
/// Pull requests are numbered 1, 2, ... per client.
#[derive(Debug, Default)]
pub struct DryRunVcs {
    state: Mutex<DryRunState>,
}

impl DryRunVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<VcsCall> {
        self.lock().calls.clone()
    }

    pub fn pr_body(&self, number: u64) -> Option<String> {
        self.lock().bodies.get(&number).cloned()
    }

    /// Number of `create_or_update_pr` calls that opened a new pull request.
    pub fn created_prs(&self) -> usize {
        self.lock().prs_by_head.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DryRunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VcsClient for DryRunVcs {
    fn ensure_branch(&self, base_ref: &str, feature_ref: &str) -> Result<()> {
        validate_branch_name(base_ref)?;
        validate_branch_name(feature_ref)?;
        self.lock().calls.push(VcsCall::EnsureBranch {
            base: base_ref.to_string(),
            feature: feature_ref.to_string(),
        });
        Ok(())
    }

    fn apply_patch(&self, feature_ref: &str, diff: &str) -> Result<PatchSummary> {
        validate_branch_name(feature_ref)?;
        check_diff(diff)?;
        self.lock().calls.push(VcsCall::ApplyPatch {
            feature: feature_ref.to_string(),
            bytes: diff.len(),
        });
        Ok(summarize_unified_diff(diff))
    }

    fn create_or_update_pr(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest> {
        validate_branch_name(head)?;
        validate_branch_name(base)?;
        let mut state = self.lock();
        state.calls.push(VcsCall::CreateOrUpdatePr {
            title: title.to_string(),
            head: head.to_string(),
            base: base.to_string(),
        });
        let next = state.prs_by_head.len() as u64 + 1;
        let number = *state.prs_by_head.entry(head.to_string()).or_insert(next);
        state.bodies.insert(number, body.to_string());
        Ok(PullRequest {
            number,
            url: format!("https://example.test/pr/{number}"),
        })
    }

    fn update_pr_body(&self, pr_number: u64, body: &str) -> Result<()> {
        let mut state = self.lock();
        if !state.bodies.contains_key(&pr_number) {
            return Err(anyhow!("pull request #{pr_number} not found"));
        }
        state.calls.push(VcsCall::UpdatePrBody { number: pr_number });
        state.bodies.insert(pr_number, body.to_string());
        Ok(())
    }
}

const PULLS_DIR: &str = ".orchestrator/pulls";

/// VCS client backed by a local git checkout.
///
/// Patches are applied and committed on the feature branch. Pull requests
/// are markdown files under `.orchestrator/pulls/<n>.md` in the checkout.
#[derive(Debug)]
pub struct LocalGitVcs {
    git: Git,
    // Serializes checkout/apply/commit sequences.
    lock: Mutex<()>,
}

impl LocalGitVcs {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            git: Git::new(workdir),
            lock: Mutex::new(()),
        }
    }

    fn pulls_dir(&self) -> PathBuf {
        self.git.workdir().join(PULLS_DIR)
    }

    fn pull_path(&self, number: u64) -> PathBuf {
        self.pulls_dir().join(format!("{number}.md"))
    }

    fn find_pr_for_head(&self, head: &str) -> Result<Option<u64>> {
        for number in existing_pulls(&self.pulls_dir())? {
            let path = self.pull_path(number);
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read pull request {}", path.display()))?;
            let (header, _) = split_pull(&contents);
            if header.lines().any(|line| line == format!("head: {head}")) {
                return Ok(Some(number));
            }
        }
        Ok(None)
    }
}

impl VcsClient for LocalGitVcs {
    #[instrument(skip_all, fields(base_ref, feature_ref))]
    fn ensure_branch(&self, base_ref: &str, feature_ref: &str) -> Result<()> {
        validate_branch_name(base_ref)?;
        validate_branch_name(feature_ref)?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.git.branch_exists(feature_ref)? {
            debug!(feature_ref, "feature branch already exists");
            return Ok(());
        }
        self.git.create_branch(feature_ref, base_ref)
    }

    #[instrument(skip_all, fields(feature_ref, bytes = diff.len()))]
    fn apply_patch(&self, feature_ref: &str, diff: &str) -> Result<PatchSummary> {
        validate_branch_name(feature_ref)?;
        check_diff(diff)?;
        if diff.trim().is_empty() {
            debug!("empty diff, nothing to apply");
            return Ok(PatchSummary::default());
        }
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.git.checkout_branch(feature_ref)?;
        let current = self.git.current_branch()?;
        if current != feature_ref {
            return Err(anyhow!(
                "checked out `{current}` instead of feature branch `{feature_ref}`"
            ));
        }
        self.git
            .apply_to_index(diff)
            .with_context(|| format!("apply patch to {feature_ref}"))?;
        self.git
            .commit_staged(&format!("orchestrator: apply patch to {feature_ref}"))?;
        Ok(summarize_unified_diff(diff))
    }

    #[instrument(skip_all, fields(head, base))]
    fn create_or_update_pr(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest> {
        validate_branch_name(head)?;
        validate_branch_name(base)?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let dir = self.pulls_dir();
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

        let number = match self.find_pr_for_head(head)? {
            Some(number) => number,
            None => existing_pulls(&dir)?.last().map_or(1, |last| last + 1),
        };
        let path = self.pull_path(number);
        let contents = format!("# {title}\nhead: {head}\nbase: {base}\n\n{body}\n");
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        info!(number, path = %path.display(), "recorded pull request");
        Ok(PullRequest {
            number,
            url: format!("file://{}", path.display()),
        })
    }

    #[instrument(skip_all, fields(pr_number))]
    fn update_pr_body(&self, pr_number: u64, body: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.pull_path(pr_number);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("read pull request {}", path.display()))?;
        let (header, _) = split_pull(&contents);
        fs::write(&path, format!("{header}\n\n{body}\n"))
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

/// Pull request numbers present in `dir`, ascending.
fn existing_pulls(dir: &Path) -> Result<Vec<u64>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut numbers = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("list {}", dir.display()))? {
        let path = entry.context("read pulls entry")?.path();
        if let Some(number) = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<u64>().ok())
        {
            numbers.push(number);
        }
    }
    numbers.sort_unstable();
    Ok(numbers)
}

fn split_pull(contents: &str) -> (&str, &str) {
    contents.split_once("\n\n").unwrap_or((contents.trim_end(), ""))
}
