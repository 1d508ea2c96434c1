use std::collections::HashMap;

use log::trace;

use crate::model::{CachedPackage, ImportPath};

/// Hashes from the previously written manifest.
///
/// Read-only for the whole run: newly fetched hashes only come back through the next
/// manifest.
#[derive(Debug, Clone, Default)]
pub struct FetchCache {
    packages: HashMap<ImportPath, CachedPackage>,
}

impl FetchCache {
    /// Later packages replace earlier ones with the same import path.
    pub fn new(packages: impl IntoIterator<Item = CachedPackage>) -> Self {
        FetchCache {
            packages: packages
                .into_iter()
                .map(|package| (package.import_path.clone(), package))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// The cached hash, if the revision and the repository url are both unchanged.
    pub fn lookup(&self, import_path: &ImportPath, revision: &str, url: &str) -> Option<&str> {
        let cached = self.packages.get(import_path)?;
        if cached.revision == revision && cached.url == url {
            Some(&cached.hash)
        } else {
            trace!(
                "Cached {} is at {} from {}, wanted {} from {}",
                import_path,
                cached.revision,
                cached.url,
                revision,
                url
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn cached(path: &str, revision: &str, hash: &str) -> CachedPackage {
        CachedPackage {
            import_path: ImportPath::from(path),
            url: format!("https://{path}"),
            revision: revision.to_owned(),
            hash: hash.to_owned(),
            subdir: String::new(),
        }
    }

    #[test]
    fn hit() {
        let cache = FetchCache::new([cached("example.com/a", "v1.0.0", "h1")]);
        assert_eq!(
            cache.lookup(&"example.com/a".into(), "v1.0.0", "https://example.com/a"),
            Some("h1")
        );
    }

    #[test]
    fn revision_moved() {
        let cache = FetchCache::new([cached("example.com/a", "v1.0.0", "h1")]);
        assert_eq!(
            cache.lookup(&"example.com/a".into(), "v1.0.1", "https://example.com/a"),
            None
        );
    }

    #[test]
    fn repository_rewritten() {
        let cache = FetchCache::new([cached("example.com/a", "v1.0.0", "h1")]);
        assert_eq!(
            cache.lookup(&"example.com/a".into(), "v1.0.0", "https://mirror/a"),
            None
        );
    }

    #[test]
    fn unknown_path() {
        let cache = FetchCache::default();
        assert!(cache.is_empty());
        assert_eq!(
            cache.lookup(&"example.com/a".into(), "v1.0.0", "https://example.com/a"),
            None
        );
    }

    #[test]
    fn last_entry_wins() {
        let cache = FetchCache::new([
            cached("example.com/a", "v1.0.0", "old"),
            cached("example.com/a", "v1.0.0", "new"),
        ]);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.lookup(&"example.com/a".into(), "v1.0.0", "https://example.com/a"),
            Some("new")
        );
    }
}
