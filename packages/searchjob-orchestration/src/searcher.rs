//! Search engine port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One hit reported by the search engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub repository: String,
    pub revision: String,
    pub path: String,
    pub line: Option<u32>,
}

/// Runs the user's query against one repository at one commit.
///
/// Failures are treated as retryable task errors by the worker.
#[async_trait]
pub trait Searcher: Send + Sync {
    async fn search(&self, repository: &str, revision: &str, query: &str)
        -> Result<Vec<SearchMatch>>;
}
