//! Feature branch naming and git ref validation.

use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use rand::RngCore;
use regex::Regex;

pub const DEFAULT_FEATURE_BRANCH_PREFIX: &str = "autogen/feature";

static BRANCH_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/-]{0,254}$").expect("branch pattern is valid")
});

/// Derive a feature branch name: `<prefix>-<8 hex>`, or the bare suffix when
/// `prefix` is empty.
pub fn derive_feature_branch<R: RngCore + ?Sized>(prefix: &str, rng: &mut R) -> String {
    let suffix = format!("{:08x}", rng.next_u32());
    if prefix.is_empty() {
        suffix
    } else {
        format!("{prefix}-{suffix}")
    }
}

/// Reject ref names that are unsafe to hand to git or a hosting API.
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!("branch name must be provided"));
    }
    if !BRANCH_CHARS.is_match(name) || name.contains("//") || name.contains("..") {
        return Err(anyhow!(
            "branch name '{name}' contains unsupported characters or structure"
        ));
    }
    Ok(())
}
