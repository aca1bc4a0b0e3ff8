//! Revision specifier resolution
//!
//! A specifier is `:`-separated parts. Exact names resolve to exactly one
//! commit. `*glob` parts fan out to every ref whose name matches, `*!glob`
//! parts remove refs from that fan-out. Glob patterns follow `git --glob`:
//! `refs/` is implied when missing and a pattern without `*` matches the
//! whole namespace below it (`*heads/release` == `refs/heads/release/*`).

use async_trait::async_trait;
use parking_lot::RwLock;
use searchjob_storage::{RevisionPart, RevisionSpec};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::{OrchestratorError, Result};

/// A named ref and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRef {
    /// Full ref name, e.g. `refs/heads/main`
    pub name: String,
    pub commit: String,
}

/// Read access to repository refs and commits.
#[async_trait]
pub trait VcsMetadataProvider: Send + Sync {
    /// Resolve a branch, tag or commit name. `Ok(None)` when the repository
    /// exists but the name does not.
    async fn resolve_revision(&self, repository: &str, name: &str) -> Result<Option<String>>;

    /// Every ref of the repository, in a stable order.
    async fn list_refs(&self, repository: &str) -> Result<Vec<GitRef>>;
}

/// Expands a revision specifier into concrete commits.
#[derive(Clone)]
pub struct RevisionResolver {
    vcs: Arc<dyn VcsMetadataProvider>,
}

impl RevisionResolver {
    pub fn new(vcs: Arc<dyn VcsMetadataProvider>) -> Self {
        Self { vcs }
    }

    /// Resolve `specifier` against `repository`.
    ///
    /// Output follows part order with duplicate commits removed. An empty
    /// result (globs matching nothing) is not an error.
    pub async fn resolve(&self, repository: &str, specifier: &str) -> Result<Vec<String>> {
        let spec = RevisionSpec::parse(specifier)?;

        let excludes: Vec<String> = spec
            .parts()
            .iter()
            .filter_map(|part| match part {
                RevisionPart::Exclude(glob) => Some(normalize_glob(glob)),
                _ => None,
            })
            .collect();

        let mut refs: Option<Vec<GitRef>> = None;
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();

        for part in spec.parts() {
            match part {
                RevisionPart::Exact(name) => {
                    let commit = self
                        .vcs
                        .resolve_revision(repository, name)
                        .await?
                        .ok_or_else(|| {
                            OrchestratorError::Resolution(format!(
                                "revision {:?} not found in {}",
                                name, repository
                            ))
                        })?;
                    if seen.insert(commit.clone()) {
                        resolved.push(commit);
                    }
                }
                RevisionPart::Include(glob) => {
                    if refs.is_none() {
                        refs = Some(self.vcs.list_refs(repository).await?);
                    }
                    let pattern = normalize_glob(glob);
                    for git_ref in refs.iter().flatten() {
                        if !glob_match(&pattern, &git_ref.name)
                            || excludes.iter().any(|ex| glob_match(ex, &git_ref.name))
                        {
                            continue;
                        }
                        if seen.insert(git_ref.commit.clone()) {
                            resolved.push(git_ref.commit.clone());
                        }
                    }
                }
                RevisionPart::Exclude(_) => {}
            }
        }

        debug!(
            repository,
            specifier,
            revisions = resolved.len(),
            "revision specifier resolved"
        );
        Ok(resolved)
    }
}

fn normalize_glob(glob: &str) -> String {
    let mut pattern = if glob.starts_with("refs/") {
        glob.to_string()
    } else {
        format!("refs/{}", glob)
    };
    if !pattern.contains('*') {
        if !pattern.ends_with('/') {
            pattern.push('/');
        }
        pattern.push('*');
    }
    pattern
}

/// `*` matches any run of characters (including `/`); everything else is literal.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p = pattern.as_bytes();
    let t = text.as_bytes();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == b'*' {
        pi += 1;
    }
    pi == p.len()
}

#[derive(Debug, Default)]
struct RepoRefs {
    refs: Vec<GitRef>,
    commits: HashSet<String>,
}

/// In-process provider, for embedding and tests.
///
/// Exact names resolve as a full ref name, then `refs/heads/<name>`, then
/// `refs/tags/<name>`, then a known commit id.
#[derive(Debug, Default)]
pub struct InMemoryVcs {
    repos: RwLock<HashMap<String, RepoRefs>>,
}

impl InMemoryVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_repository(&self, repository: &str) {
        self.repos
            .write()
            .entry(repository.to_string())
            .or_default();
    }

    /// Add or move a ref; the commit becomes known to the repository.
    pub fn set_ref(&self, repository: &str, name: &str, commit: &str) {
        let mut repos = self.repos.write();
        let repo = repos.entry(repository.to_string()).or_default();
        repo.commits.insert(commit.to_string());
        match repo.refs.iter_mut().find(|r| r.name == name) {
            Some(existing) => existing.commit = commit.to_string(),
            None => repo.refs.push(GitRef {
                name: name.to_string(),
                commit: commit.to_string(),
            }),
        }
    }

    pub fn add_commit(&self, repository: &str, commit: &str) {
        self.repos
            .write()
            .entry(repository.to_string())
            .or_default()
            .commits
            .insert(commit.to_string());
    }
}

#[async_trait]
impl VcsMetadataProvider for InMemoryVcs {
    async fn resolve_revision(&self, repository: &str, name: &str) -> Result<Option<String>> {
        let repos = self.repos.read();
        let repo = repos.get(repository).ok_or_else(|| {
            OrchestratorError::Resolution(format!("repository {} is not available", repository))
        })?;

        let candidates = [
            name.to_string(),
            format!("refs/heads/{}", name),
            format!("refs/tags/{}", name),
        ];
        for candidate in &candidates {
            if let Some(found) = repo.refs.iter().find(|r| &r.name == candidate) {
                return Ok(Some(found.commit.clone()));
            }
        }
        Ok(repo.commits.get(name).cloned())
    }

    async fn list_refs(&self, repository: &str) -> Result<Vec<GitRef>> {
        let repos = self.repos.read();
        repos
            .get(repository)
            .map(|repo| repo.refs.clone())
            .ok_or_else(|| {
                OrchestratorError::Resolution(format!(
                    "repository {} is not available",
                    repository
                ))
            })
    }
}
