//! Change proposal validation.
//!
//! A proposal is accepted only if it looks like a unified diff: it starts
//! with a recognized header and changes at least one line in each direction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProposalError {
    #[error("proposal is empty")]
    Empty,

    #[error("proposal does not start with a diff header (got '{0}')")]
    MissingHeader(String),

    #[error("proposal has no added lines")]
    NoAdditions,

    #[error("proposal has no removed lines")]
    NoRemovals,
}

/// A unified diff that passed [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProposal {
    diff: String,
}

impl ChangeProposal {
    pub fn diff(&self) -> &str {
        &self.diff
    }

    pub fn into_diff(self) -> String {
        self.diff
    }

    /// Paths named by `+++ b/...` lines.
    pub fn touched_files(&self) -> Vec<&str> {
        self.diff
            .lines()
            .filter_map(|l| l.strip_prefix("+++ "))
            .map(|p| p.trim().strip_prefix("b/").unwrap_or(p.trim()))
            .filter(|p| *p != "/dev/null")
            .collect()
    }
}

const HEADERS: [&str; 2] = ["diff --git ", "--- "];

/// Validate raw generator output.
///
/// Leading blank lines are ignored. The first remaining line must begin with
/// `diff --git ` or `--- `; there must be a `+` line that is not a `+++`
/// header and a `-` line that is not a `---` header.
pub fn validate(raw: &str) -> Result<ChangeProposal, ProposalError> {
    let body = raw.trim_start_matches(['\n', '\r']);
    let first = body.lines().next().ok_or(ProposalError::Empty)?;
    if first.trim().is_empty() {
        return Err(ProposalError::Empty);
    }
    if !HEADERS.iter().any(|h| first.starts_with(h)) {
        let shown: String = first.chars().take(40).collect();
        return Err(ProposalError::MissingHeader(shown));
    }

    let mut added = false;
    let mut removed = false;
    for line in body.lines() {
        if line.starts_with('+') && !line.starts_with("+++") {
            added = true;
        } else if line.starts_with('-') && !line.starts_with("---") {
            removed = true;
        }
    }
    if !added {
        return Err(ProposalError::NoAdditions);
    }
    if !removed {
        return Err(ProposalError::NoRemovals);
    }

    let mut diff = body.to_string();
    if !diff.ends_with('\n') {
        diff.push('\n');
    }
    Ok(ChangeProposal { diff })
}
