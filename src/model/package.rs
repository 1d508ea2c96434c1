use super::ImportPath;

/// A declaration with its revision and repository worked out, not yet hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub import_path: ImportPath,
    pub revision: String,
    pub url: String,
    /// Module directory inside the repository, empty for the repository root.
    pub subdir: String,
}

/// A package read back from a previously written manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPackage {
    pub import_path: ImportPath,
    pub url: String,
    pub revision: String,
    pub hash: String,
    pub subdir: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub import_path: ImportPath,
    pub url: String,
    pub revision: String,
    pub subdir: String,
    pub hash: String,
}

impl ResolvedPackage {
    pub fn new(entry: ResolvedEntry, hash: String) -> Self {
        let ResolvedEntry {
            import_path,
            revision,
            url,
            subdir,
        } = entry;
        ResolvedPackage {
            import_path,
            url,
            revision,
            subdir,
            hash,
        }
    }
}

impl From<ResolvedPackage> for CachedPackage {
    fn from(package: ResolvedPackage) -> Self {
        CachedPackage {
            import_path: package.import_path,
            url: package.url,
            revision: package.revision,
            hash: package.hash,
            subdir: package.subdir,
        }
    }
}
