//! Query expansion: `<repo>@<revspec> [<repo>@<revspec> ...]`
//!
//! Each whitespace separated pair becomes one task descriptor. Duplicate
//! pairs are kept: the user-visible contract is one row per pair evaluated.
//! Repository existence is checked by the store when the job is persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, StorageError};

/// One unit of work requested by a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Repository token as written in the query (id or name)
    pub repository: String,
    /// Revision specifier, validated by [`RevisionSpec::parse`]
    pub revision_specifier: String,
}

/// Splits a search expression into task descriptors.
pub struct QueryExpander;

impl QueryExpander {
    pub fn expand(query: &str) -> Result<Vec<TaskSpec>> {
        let mut specs = Vec::new();

        for token in query.split_whitespace() {
            let (repo, revspec) = token.split_once('@').ok_or_else(|| {
                StorageError::invalid_query(format!("expected <repo>@<revspec>, got {:?}", token))
            })?;

            if repo.is_empty() {
                return Err(StorageError::invalid_query(format!(
                    "missing repository in {:?}",
                    token
                )));
            }
            if revspec.contains('@') {
                return Err(StorageError::invalid_query(format!(
                    "more than one '@' in {:?}",
                    token
                )));
            }
            RevisionSpec::parse(revspec)?;

            specs.push(TaskSpec {
                repository: repo.to_string(),
                revision_specifier: revspec.to_string(),
            });
        }

        if specs.is_empty() {
            return Err(StorageError::invalid_query("query is empty"));
        }

        Ok(specs)
    }
}

/// One `:`-separated element of a revision specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionPart {
    /// Branch, tag or commit name; resolves to exactly one revision
    Exact(String),
    /// `*<glob>`: every ref whose name matches
    Include(String),
    /// `*!<glob>`: drop refs matched by earlier globs
    Exclude(String),
}

/// Parsed revision specifier, e.g. `main:*refs/heads/release-*:*!*-rc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionSpec {
    parts: Vec<RevisionPart>,
}

impl RevisionSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        if spec.is_empty() {
            return Err(StorageError::invalid_query("empty revision specifier"));
        }

        let mut parts = Vec::new();
        for raw in spec.split(':') {
            if let Some(bad) = raw.chars().find(|c| is_forbidden(*c)) {
                return Err(StorageError::invalid_query(format!(
                    "invalid character {:?} in revision specifier {:?}",
                    bad, spec
                )));
            }

            let part = if let Some(glob) = raw.strip_prefix("*!") {
                RevisionPart::Exclude(glob.to_string())
            } else if let Some(glob) = raw.strip_prefix('*') {
                RevisionPart::Include(glob.to_string())
            } else {
                RevisionPart::Exact(raw.to_string())
            };

            let empty = match &part {
                RevisionPart::Exact(s) | RevisionPart::Include(s) | RevisionPart::Exclude(s) => {
                    s.is_empty()
                }
            };
            if empty {
                return Err(StorageError::invalid_query(format!(
                    "empty element in revision specifier {:?}",
                    spec
                )));
            }
            parts.push(part);
        }

        if parts.iter().all(|p| matches!(p, RevisionPart::Exclude(_))) {
            return Err(StorageError::invalid_query(format!(
                "revision specifier {:?} only excludes",
                spec
            )));
        }

        Ok(Self { parts })
    }

    pub fn parts(&self) -> &[RevisionPart] {
        &self.parts
    }
}

impl fmt::Display for RevisionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .parts
            .iter()
            .map(|p| match p {
                RevisionPart::Exact(s) => s.clone(),
                RevisionPart::Include(s) => format!("*{}", s),
                RevisionPart::Exclude(s) => format!("*!{}", s),
            })
            .collect();
        write!(f, "{}", rendered.join(":"))
    }
}

fn is_forbidden(c: char) -> bool {
    c.is_control() || c.is_whitespace() || matches!(c, '\\' | '[' | '?')
}
