//! Runtime configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scope::ScopeKind;
use crate::storage::ProviderKind;

/// Bounds for search and tree operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchLimits {
    /// Results returned by `find` and `grep` when the caller names no limit.
    pub default_max_results: usize,
    /// Largest limit a caller may ask for.
    pub max_results_cap: usize,
    /// Depth rendered by `tree` when the caller names none.
    pub default_tree_depth: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            default_max_results: 100,
            max_results_cap: 1000,
            default_tree_depth: 3,
        }
    }
}

impl SearchLimits {
    /// Apply the default and validate a caller-supplied result limit.
    pub fn max_results(&self, requested: Option<usize>) -> Result<usize> {
        match requested {
            None => Ok(self.default_max_results),
            Some(0) => Err(Error::InvalidArgument(
                "max_results must be at least 1".to_string(),
            )),
            Some(n) if n > self.max_results_cap => Err(Error::InvalidArgument(format!(
                "max_results must be at most {}",
                self.max_results_cap
            ))),
            Some(n) => Ok(n),
        }
    }
}

/// Configuration for a [`Burrow`](crate::Burrow) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurrowConfig {
    /// Base directory for the filesystem and SQLite providers.
    pub storage_root: PathBuf,
    /// Names the sandbox partition; `None` uses the single shared one.
    pub sandbox_id: Option<String>,
    /// Provider used when a create request names none.
    pub default_provider: ProviderKind,
    /// Scope used when a request names none.
    pub default_scope: ScopeKind,
    /// Search and tree bounds.
    pub search: SearchLimits,
}

impl Default for BurrowConfig {
    fn default() -> Self {
        Self {
            storage_root: std::env::temp_dir().join("burrow"),
            sandbox_id: None,
            default_provider: ProviderKind::default(),
            default_scope: ScopeKind::default(),
            search: SearchLimits::default(),
        }
    }
}
