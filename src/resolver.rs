use std::{collections::BTreeMap, sync::Arc};

use log::{debug, info};
use thiserror::Error;

use crate::{
    cache::FetchCache,
    model::{ImportPath, ModuleDeclaration, ResolvedEntry, ResolvedPackage},
    prefetch::{ContentHashFetcher, FetchError, FetchOptions, PrefetchPool, DEFAULT_JOBS},
    progress::{LogProgress, ProgressEvent, ProgressListener},
    repository::{RepositoryError, RepositoryLookup, RepositoryResolver, RewriteRules},
    version::{normalize_revision, MalformedVersionError},
};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Could not resolve the revision of {import_path}: {source}")]
    MalformedVersion {
        import_path: ImportPath,
        #[source]
        source: MalformedVersionError,
    },
    #[error("Could not resolve the repository of {import_path}: {source}")]
    Repository {
        import_path: ImportPath,
        #[source]
        source: RepositoryError,
    },
    #[error("Could not fetch {import_path}: {source}")]
    Fetch {
        import_path: ImportPath,
        #[source]
        source: FetchError,
    },
    #[error("Could not start the prefetch workers: {0}")]
    Runtime(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub jobs: usize,
    /// Drop packages that fail to fetch instead of failing the whole run.
    pub keep_going: bool,
    pub rewrites: RewriteRules,
    pub fetch: FetchOptions,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        ResolveOptions {
            jobs: DEFAULT_JOBS,
            keep_going: false,
            rewrites: RewriteRules::default(),
            fetch: FetchOptions::default(),
        }
    }
}

#[derive(Debug)]
pub struct FetchFailure {
    pub import_path: ImportPath,
    pub error: FetchError,
}

#[derive(Debug)]
pub struct Resolution {
    /// Sorted by import path.
    pub packages: Vec<ResolvedPackage>,
    /// Only populated with `keep_going`, sorted by import path.
    pub failures: Vec<FetchFailure>,
}

pub struct Resolver {
    lookup: Box<dyn RepositoryLookup>,
    fetcher: Arc<dyn ContentHashFetcher>,
    listener: Arc<dyn ProgressListener>,
}

impl Resolver {
    pub fn new(lookup: Box<dyn RepositoryLookup>, fetcher: Arc<dyn ContentHashFetcher>) -> Self {
        Resolver {
            lookup,
            fetcher,
            listener: Arc::new(LogProgress),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Pins every non-main module to a revision and a content hash.
    ///
    /// Revisions and repositories are worked out up front and any error there aborts the
    /// run. Hashes are reused from `cache` when the revision and repository are unchanged,
    /// everything else is fetched concurrently.
    pub fn resolve(
        &self,
        declarations: &[ModuleDeclaration],
        cache: &FetchCache,
        options: &ResolveOptions,
    ) -> Result<Resolution, ResolveError> {
        let entries = self.entries(declarations, &options.rewrites)?;

        let mut packages: BTreeMap<ImportPath, ResolvedPackage> = BTreeMap::new();
        let mut misses = Vec::new();
        for entry in entries.into_values() {
            match cache.lookup(&entry.import_path, &entry.revision, &entry.url) {
                Some(hash) => {
                    self.listener.on_event(&ProgressEvent::CacheHit {
                        import_path: &entry.import_path,
                    });
                    let hash = hash.to_owned();
                    packages.insert(entry.import_path.clone(), ResolvedPackage::new(entry, hash));
                }
                None => misses.push(entry),
            }
        }
        info!(
            "{} packages reused from the previous manifest, {} to fetch",
            packages.len(),
            misses.len()
        );

        let pool = PrefetchPool::new(
            self.fetcher.clone(),
            self.listener.clone(),
            options.jobs,
            options.fetch,
        );
        let mut failures = Vec::new();
        let mut first_error = None;
        for outcome in pool.run(misses)? {
            let import_path = outcome.entry.import_path.clone();
            match outcome.result {
                Ok(hash) => {
                    packages.insert(import_path, ResolvedPackage::new(outcome.entry, hash));
                }
                Err(error) if options.keep_going => failures.push(FetchFailure {
                    import_path,
                    error,
                }),
                Err(error) => {
                    if first_error.is_none() {
                        first_error = Some(ResolveError::Fetch {
                            import_path,
                            source: error,
                        });
                    }
                }
            }
        }
        if let Some(error) = first_error {
            return Err(error);
        }

        failures.sort_by(|a, b| a.import_path.cmp(&b.import_path));
        Ok(Resolution {
            packages: packages.into_values().collect(),
            failures,
        })
    }

    fn entries(
        &self,
        declarations: &[ModuleDeclaration],
        rewrites: &RewriteRules,
    ) -> Result<BTreeMap<ImportPath, ResolvedEntry>, ResolveError> {
        let repositories = RepositoryResolver::new(self.lookup.as_ref(), rewrites.clone());
        let mut entries = BTreeMap::new();

        for declaration in declarations.iter().filter(|d| !d.main) {
            let import_path = &declaration.path;
            self.listener
                .on_event(&ProgressEvent::Processing { import_path });

            let Some((source_path, version)) = declaration.source() else {
                self.listener
                    .on_event(&ProgressEvent::SkippedLocal { import_path });
                continue;
            };

            let repository =
                repositories
                    .resolve(source_path)
                    .map_err(|source| ResolveError::Repository {
                        import_path: import_path.clone(),
                        source,
                    })?;
            let revision = normalize_revision(version, &repository.subdir).map_err(|source| {
                ResolveError::MalformedVersion {
                    import_path: import_path.clone(),
                    source,
                }
            })?;
            self.listener.on_event(&ProgressEvent::Revision {
                import_path,
                revision: &revision,
                url: &repository.url,
            });

            let entry = ResolvedEntry {
                import_path: import_path.clone(),
                revision,
                url: repository.url,
                subdir: repository.subdir,
            };
            if entries.insert(import_path.clone(), entry).is_some() {
                debug!("{} is declared more than once, keeping the last", import_path);
            }
        }
        Ok(entries)
    }
}
