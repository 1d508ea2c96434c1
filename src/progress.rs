use log::{debug, info, warn};

use crate::model::ImportPath;

/// Something that happened while resolving, in the order the resolver saw it.
///
/// Fetch events come from the prefetch workers and interleave arbitrarily.
#[derive(Debug, Clone, Copy)]
pub enum ProgressEvent<'a> {
    Processing {
        import_path: &'a ImportPath,
    },
    Revision {
        import_path: &'a ImportPath,
        revision: &'a str,
        url: &'a str,
    },
    CacheHit {
        import_path: &'a ImportPath,
    },
    SkippedLocal {
        import_path: &'a ImportPath,
    },
    FetchStarted {
        import_path: &'a ImportPath,
        url: &'a str,
        revision: &'a str,
    },
    FetchFinished {
        import_path: &'a ImportPath,
        hash: &'a str,
    },
    FetchFailed {
        import_path: &'a ImportPath,
        error: &'a str,
    },
}

pub trait ProgressListener: Send + Sync {
    fn on_event(&self, event: &ProgressEvent<'_>);
}

/// Reports progress through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressListener for LogProgress {
    fn on_event(&self, event: &ProgressEvent<'_>) {
        match event {
            ProgressEvent::Processing { import_path } => info!("Processing {}", import_path),
            ProgressEvent::Revision {
                import_path,
                revision,
                url,
            } => debug!("{} has rev {} in {}", import_path, revision, url),
            ProgressEvent::CacheHit { import_path } => {
                debug!("Reusing previous hash of {}", import_path)
            }
            ProgressEvent::SkippedLocal { import_path } => warn!(
                "Skipping {}, it is replaced by a local directory",
                import_path
            ),
            ProgressEvent::FetchStarted {
                import_path,
                url,
                revision,
            } => info!("Fetching {} ({} at {})", import_path, url, revision),
            ProgressEvent::FetchFinished { import_path, .. } => {
                info!("Finished fetching {}", import_path)
            }
            ProgressEvent::FetchFailed { import_path, error } => {
                warn!("Failed to fetch {}: {}", import_path, error)
            }
        }
    }
}
