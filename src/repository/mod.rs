mod lookup;

use log::{debug, warn};
use serde::Deserialize;
use thiserror::Error;

use crate::{model::ImportPath, version::strip_major_version};

pub use lookup::VcsRepositoryLookup;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("No repository found for import path {0}")]
    NotFound(String),
    #[error("Repository for {path} uses unsupported VCS {vcs}, only git is supported")]
    UnsupportedVcs { path: String, vcs: String },
    #[error("HTTP error while discovering the repository of {path}: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Where a repository lives and which import path prefix it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRoot {
    pub url: String,
    pub root: String,
}

/// Maps an import path to the repository that contains it.
pub trait RepositoryLookup: Send + Sync {
    fn lookup(&self, import_path: &str) -> Result<RepositoryRoot, RepositoryError>;
}

impl<T: RepositoryLookup + ?Sized> RepositoryLookup for &T {
    fn lookup(&self, import_path: &str) -> Result<RepositoryRoot, RepositoryError> {
        (**self).lookup(import_path)
    }
}

/// A repository url and the module directory inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub url: String,
    pub subdir: String,
}

/// `prefix` is `path` or one of its parent directories.
pub fn is_path_prefix(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RewriteRule {
    pub prefix: String,
    /// Either a repository url (contains `://`) or another import path prefix.
    pub replacement: String,
}

impl RewriteRule {
    pub fn new(prefix: impl Into<String>, replacement: impl Into<String>) -> Self {
        RewriteRule {
            prefix: prefix.into(),
            replacement: replacement.into(),
        }
    }

    fn is_url(&self) -> bool {
        self.replacement.contains("://")
    }
}

/// Ordered rewrite rules, the first matching prefix wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteRules {
    rules: Vec<RewriteRule>,
}

impl RewriteRules {
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        RewriteRules { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn find(&self, import_path: &str) -> Option<&RewriteRule> {
        self.rules
            .iter()
            .find(|rule| is_path_prefix(&rule.prefix, import_path))
    }
}

pub struct RepositoryResolver<L> {
    lookup: L,
    rewrites: RewriteRules,
}

impl<L: RepositoryLookup> RepositoryResolver<L> {
    pub fn new(lookup: L, rewrites: RewriteRules) -> Self {
        RepositoryResolver { lookup, rewrites }
    }

    /// Resolves the repository of `import_path`.
    ///
    /// Rewrite rules only change where the module is fetched from, the import path itself is
    /// left alone by the caller.
    pub fn resolve(&self, import_path: &ImportPath) -> Result<Repository, RepositoryError> {
        let import_path = import_path.as_str();
        let (lookup_path, root) = match self.rewrites.find(import_path) {
            Some(rule) if rule.is_url() => {
                debug!("Rewriting {} to repository {}", import_path, rule.replacement);
                let root = RepositoryRoot {
                    url: rule.replacement.clone(),
                    root: rule.prefix.clone(),
                };
                (import_path.to_owned(), root)
            }
            Some(rule) => {
                let rewritten = format!(
                    "{}{}",
                    rule.replacement,
                    &import_path[rule.prefix.len()..]
                );
                debug!("Rewriting {} to {}", import_path, rewritten);
                let root = self.lookup.lookup(&rewritten)?;
                (rewritten, root)
            }
            None => (import_path.to_owned(), self.lookup.lookup(import_path)?),
        };

        let relative = match lookup_path.strip_prefix(&root.root) {
            Some(rest) if is_path_prefix(&root.root, &lookup_path) => rest.trim_matches('/'),
            _ => {
                warn!(
                    "Repository root {} does not contain {}, assuming the module is at the root",
                    root.root, lookup_path
                );
                ""
            }
        };

        Ok(Repository {
            url: root.url,
            subdir: strip_major_version(relative).to_owned(),
        })
    }
}
