mod nix;

use std::sync::Arc;

use log::{debug, error, trace};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::{
    model::ResolvedEntry,
    progress::{ProgressEvent, ProgressListener},
};

pub use nix::NixPrefetchGit;

/// What `nix-prefetch-git` reports when the revision could not be checked out.
pub const EMPTY_HASH: &str = "0sjjj9z1dhilhpc8pq4154czrb79z9cm044jvn75kxcjv6v5l2m5";

pub const DEFAULT_JOBS: usize = 20;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Could not run {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} exited with {status}: {stderr}")]
    Status {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("Could not parse the output of {command}: {source}")]
    Json {
        command: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Bad SHA256 for {url} at {revision}, the revision could not be resolved")]
    BadHash { url: String, revision: String },
    #[error("Fetch worker failed: {0}")]
    Worker(String),
}

/// Fixed for the whole run, never varied per fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub include_submodules: bool,
    pub shallow: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            include_submodules: false,
            shallow: true,
        }
    }
}

/// Checks out a repository at a revision and reports the content hash of the tree.
pub trait ContentHashFetcher: Send + Sync {
    fn fetch(&self, url: &str, revision: &str, options: FetchOptions)
        -> Result<String, FetchError>;
}

#[derive(Debug)]
pub struct PrefetchOutcome {
    pub entry: ResolvedEntry,
    pub result: Result<String, FetchError>,
}

/// A fixed number of workers pulling entries off a shared queue.
pub struct PrefetchPool {
    fetcher: Arc<dyn ContentHashFetcher>,
    listener: Arc<dyn ProgressListener>,
    jobs: usize,
    options: FetchOptions,
}

impl PrefetchPool {
    pub fn new(
        fetcher: Arc<dyn ContentHashFetcher>,
        listener: Arc<dyn ProgressListener>,
        jobs: usize,
        options: FetchOptions,
    ) -> Self {
        PrefetchPool {
            fetcher,
            listener,
            jobs,
            options,
        }
    }

    /// Fetches every entry and returns one outcome per entry, in completion order.
    ///
    /// Starts its own runtime, so it must not be called from async code.
    pub fn run(&self, entries: Vec<ResolvedEntry>) -> Result<Vec<PrefetchOutcome>, std::io::Error> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let workers = self.jobs.clamp(1, entries.len());
        debug!(
            "Prefetching {} repositories with {} workers",
            entries.len(),
            workers
        );
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .max_blocking_threads(workers)
            .thread_name("gomodnix-prefetch")
            .build()?;
        Ok(runtime.block_on(self.dispatch(entries, workers)))
    }

    async fn dispatch(&self, entries: Vec<ResolvedEntry>, workers: usize) -> Vec<PrefetchOutcome> {
        let submitted = entries.len();
        let (job_sender, job_receiver) = mpsc::channel::<ResolvedEntry>(submitted);
        let job_receiver = Arc::new(Mutex::new(job_receiver));
        let (result_sender, mut result_receiver) = mpsc::unbounded_channel::<PrefetchOutcome>();

        for worker in 0..workers {
            let jobs = job_receiver.clone();
            let results = result_sender.clone();
            let fetcher = self.fetcher.clone();
            let listener = self.listener.clone();
            let options = self.options;
            tokio::spawn(async move {
                loop {
                    let next = jobs.lock().await.recv().await;
                    let Some(entry) = next else { break };
                    let outcome = prefetch(fetcher.clone(), listener.as_ref(), entry, options).await;
                    if results.send(outcome).is_err() {
                        break;
                    }
                }
                trace!("Prefetch worker {} finished", worker);
            });
        }
        drop(result_sender);

        // The queue holds every entry, sending never waits.
        for entry in entries {
            if job_sender.send(entry).await.is_err() {
                error!("All prefetch workers are gone");
                break;
            }
        }
        drop(job_sender);

        let mut outcomes = Vec::with_capacity(submitted);
        while outcomes.len() < submitted {
            match result_receiver.recv().await {
                Some(outcome) => outcomes.push(outcome),
                None => {
                    error!(
                        "Prefetch workers stopped after {} of {} results",
                        outcomes.len(),
                        submitted
                    );
                    break;
                }
            }
        }
        outcomes
    }
}

async fn prefetch(
    fetcher: Arc<dyn ContentHashFetcher>,
    listener: &dyn ProgressListener,
    entry: ResolvedEntry,
    options: FetchOptions,
) -> PrefetchOutcome {
    listener.on_event(&ProgressEvent::FetchStarted {
        import_path: &entry.import_path,
        url: &entry.url,
        revision: &entry.revision,
    });

    let url = entry.url.clone();
    let revision = entry.revision.clone();
    let fetched = tokio::task::spawn_blocking(move || fetcher.fetch(&url, &revision, options)).await;
    let result = match fetched {
        Ok(Ok(hash)) if hash == EMPTY_HASH => Err(FetchError::BadHash {
            url: entry.url.clone(),
            revision: entry.revision.clone(),
        }),
        Ok(result) => result,
        Err(join_error) => Err(FetchError::Worker(join_error.to_string())),
    };

    match &result {
        Ok(hash) => listener.on_event(&ProgressEvent::FetchFinished {
            import_path: &entry.import_path,
            hash,
        }),
        Err(error) => listener.on_event(&ProgressEvent::FetchFailed {
            import_path: &entry.import_path,
            error: &error.to_string(),
        }),
    }

    PrefetchOutcome { entry, result }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;
    use crate::progress::LogProgress;

    use pretty_assertions::assert_eq;

    /// Hashes are derived from the url and revision; revisions starting with `missing`
    /// produce the empty hash and revisions starting with `broken` fail.
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pub calls: AtomicUsize,
        pub running: AtomicUsize,
        pub peak: AtomicUsize,
        pub latency: Option<fn(&str) -> Duration>,
    }

    impl ContentHashFetcher for FakeFetcher {
        fn fetch(
            &self,
            url: &str,
            revision: &str,
            _options: FetchOptions,
        ) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            if let Some(latency) = self.latency {
                std::thread::sleep(latency(url));
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            if revision.starts_with("missing") {
                Ok(EMPTY_HASH.to_owned())
            } else if revision.starts_with("broken") {
                Err(FetchError::Worker(format!("cannot fetch {url}")))
            } else {
                Ok(format!("sha256-{url}@{revision}"))
            }
        }
    }

    pub(crate) fn entry(path: &str, revision: &str) -> ResolvedEntry {
        ResolvedEntry {
            import_path: path.into(),
            revision: revision.to_owned(),
            url: format!("https://{path}"),
            subdir: String::new(),
        }
    }

    fn slow(_url: &str) -> Duration {
        Duration::from_millis(20)
    }

    fn pool(fetcher: Arc<FakeFetcher>, jobs: usize) -> PrefetchPool {
        PrefetchPool::new(fetcher, Arc::new(LogProgress), jobs, FetchOptions::default())
    }

    #[test]
    fn one_outcome_per_entry() {
        let fetcher = Arc::new(FakeFetcher::default());
        let entries: Vec<_> = (0..50)
            .map(|i| entry(&format!("example.com/m{i}"), "v1.0.0"))
            .collect();
        let outcomes = pool(fetcher.clone(), 7).run(entries).unwrap();

        assert_eq!(outcomes.len(), 50);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 50);
        let paths: HashSet<_> = outcomes
            .iter()
            .map(|o| o.entry.import_path.to_string())
            .collect();
        assert_eq!(paths.len(), 50);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
    }

    #[test]
    fn concurrency_is_bounded() {
        let fetcher = Arc::new(FakeFetcher {
            latency: Some(slow as fn(&str) -> Duration),
            ..Default::default()
        });
        let entries: Vec<_> = (0..12)
            .map(|i| entry(&format!("example.com/m{i}"), "v1.0.0"))
            .collect();
        pool(fetcher.clone(), 3).run(entries).unwrap();
        let peak = fetcher.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {peak}");
    }

    #[test]
    fn empty_hash_is_bad_hash() {
        let fetcher = Arc::new(FakeFetcher::default());
        let outcomes = pool(fetcher, 4)
            .run(vec![entry("example.com/a", "missing")])
            .unwrap();
        assert!(matches!(
            outcomes[0].result,
            Err(FetchError::BadHash { ref revision, .. }) if revision == "missing"
        ));
    }

    #[test]
    fn failures_are_reported_not_lost() {
        let fetcher = Arc::new(FakeFetcher::default());
        let outcomes = pool(fetcher, 2)
            .run(vec![
                entry("example.com/a", "broken"),
                entry("example.com/b", "v1.0.0"),
                entry("example.com/c", "broken"),
            ])
            .unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes.iter().filter(|o| o.result.is_err()).count(), 2);
    }

    #[test]
    fn no_entries() {
        let fetcher = Arc::new(FakeFetcher::default());
        assert!(pool(fetcher.clone(), 20).run(vec![]).unwrap().is_empty());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
