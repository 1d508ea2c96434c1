use std::{env, error::Error, path::PathBuf, sync::Arc};

use crate::{
    config::GomodnixConfig,
    lister::GoModuleLister,
    prefetch::{ContentHashFetcher, FetchOptions, NixPrefetchGit, DEFAULT_JOBS},
    repository::{RepositoryLookup, RewriteRule, RewriteRules, VcsRepositoryLookup},
    resolver::{ResolveOptions, Resolver},
    Gomodnix,
};

#[derive(Default)]
pub struct GomodnixBuilder {
    // All other paths are relative to `root`
    root: Option<PathBuf>,
    outfile: Option<PathBuf>,
    infile: Option<PathBuf>,
    jobs: Option<usize>,
    keep_going: Option<bool>,
    rewrites: Vec<RewriteRule>,
    prefetch_command: Option<PathBuf>,
    go_command: Option<PathBuf>,
    fetch_submodules: Option<bool>,
    deep_clone: Option<bool>,

    lookup: Option<Box<dyn RepositoryLookup>>,
    fetcher: Option<Arc<dyn ContentHashFetcher>>,
}

impl GomodnixBuilder {
    /// Go project directory.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Manifest to write.
    ///
    /// Defaults to `deps.nix`.
    pub fn outfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.outfile = Some(path.into());
        self
    }

    /// Previous manifest to reuse hashes from.
    ///
    /// Defaults to the output file.
    pub fn infile(mut self, path: impl Into<PathBuf>) -> Self {
        self.infile = Some(path.into());
        self
    }

    /// Number of concurrent prefetch workers.
    ///
    /// Defaults to 20.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = Some(keep_going);
        self
    }

    /// Rules added here are tried before the configured ones.
    pub fn rewrite(mut self, rule: RewriteRule) -> Self {
        self.rewrites.push(rule);
        self
    }

    pub fn rewrites(mut self, rules: impl IntoIterator<Item = RewriteRule>) -> Self {
        self.rewrites.extend(rules);
        self
    }

    /// Defaults to `nix-prefetch-git` from `PATH`.
    pub fn prefetch_command(mut self, path: impl Into<PathBuf>) -> Self {
        self.prefetch_command = Some(path.into());
        self
    }

    /// Defaults to `go` from `PATH`.
    pub fn go_command(mut self, path: impl Into<PathBuf>) -> Self {
        self.go_command = Some(path.into());
        self
    }

    pub fn fetch_submodules(mut self, fetch_submodules: bool) -> Self {
        self.fetch_submodules = Some(fetch_submodules);
        self
    }

    pub fn deep_clone(mut self, deep_clone: bool) -> Self {
        self.deep_clone = Some(deep_clone);
        self
    }

    /// Replaces repository discovery over HTTPS.
    pub fn lookup(mut self, lookup: impl RepositoryLookup + 'static) -> Self {
        self.lookup = Some(Box::new(lookup));
        self
    }

    /// Replaces `nix-prefetch-git`.
    pub fn fetcher(mut self, fetcher: Arc<dyn ContentHashFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Builds the instance, filling unset options from the configuration files and
    /// `GOMODNIX_*` environment variables.
    pub fn try_build(self) -> Result<Gomodnix, Box<dyn Error>> {
        let root = match &self.root {
            Some(root) => root.clone(),
            None => env::current_dir()?,
        };
        let config = GomodnixConfig::load(&root)?;
        self.build_with(root, config)
    }

    fn build_with(
        self,
        root: PathBuf,
        config: GomodnixConfig,
    ) -> Result<Gomodnix, Box<dyn Error>> {
        let Self {
            root: _,
            outfile,
            infile,
            jobs,
            keep_going,
            mut rewrites,
            prefetch_command,
            go_command,
            fetch_submodules,
            deep_clone,
            lookup,
            fetcher,
        } = self;

        let outfile = outfile.unwrap_or_else(|| PathBuf::from("deps.nix"));
        let infile = infile.unwrap_or_else(|| outfile.clone());

        rewrites.extend(config.rewrites);
        let options = ResolveOptions {
            jobs: jobs.or(config.jobs).unwrap_or(DEFAULT_JOBS),
            keep_going: keep_going.or(config.keep_going).unwrap_or(false),
            rewrites: RewriteRules::new(rewrites),
            fetch: FetchOptions {
                include_submodules: fetch_submodules
                    .or(config.fetch_submodules)
                    .unwrap_or(false),
                shallow: !deep_clone.or(config.deep_clone).unwrap_or(false),
            },
        };

        let lookup: Box<dyn RepositoryLookup> = match lookup {
            Some(lookup) => lookup,
            None => Box::new(VcsRepositoryLookup::new()?),
        };
        let fetcher: Arc<dyn ContentHashFetcher> = match fetcher {
            Some(fetcher) => fetcher,
            None => match prefetch_command.or(config.prefetch_command) {
                Some(command) => Arc::new(NixPrefetchGit::new(command)),
                None => Arc::new(NixPrefetchGit::default()),
            },
        };
        let lister = match go_command.or(config.go_command) {
            Some(command) => GoModuleLister::new(command),
            None => GoModuleLister::default(),
        };

        Ok(Gomodnix {
            root,
            outfile,
            infile,
            lister,
            resolver: Resolver::new(lookup, fetcher),
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::tests::ThreeSegmentLookup;

    use pretty_assertions::assert_eq;

    fn build(builder: GomodnixBuilder, config: GomodnixConfig) -> Gomodnix {
        builder
            .lookup(ThreeSegmentLookup::default())
            .build_with(PathBuf::from("/project"), config)
            .unwrap()
    }

    #[test]
    fn defaults() {
        let gomodnix = build(GomodnixBuilder::default(), GomodnixConfig::default());
        assert_eq!(gomodnix.outfile, PathBuf::from("deps.nix"));
        assert_eq!(gomodnix.infile, PathBuf::from("deps.nix"));
        assert_eq!(gomodnix.options().jobs, DEFAULT_JOBS);
        assert!(!gomodnix.options().keep_going);
        assert_eq!(gomodnix.options().fetch, FetchOptions::default());
    }

    #[test]
    fn explicit_options_override_config() {
        let config = GomodnixConfig {
            jobs: Some(4),
            keep_going: Some(true),
            deep_clone: Some(true),
            rewrites: vec![RewriteRule::new("example.com/a", "https://config/a")],
            ..Default::default()
        };
        let gomodnix = build(
            GomodnixBuilder::default()
                .jobs(2)
                .outfile("nix/deps.nix")
                .rewrite(RewriteRule::new("example.com/a", "https://cli/a")),
            config,
        );
        let options = gomodnix.options();
        assert_eq!(options.jobs, 2);
        assert!(options.keep_going);
        assert!(!options.fetch.shallow);
        assert_eq!(gomodnix.infile, PathBuf::from("nix/deps.nix"));
        assert_eq!(
            options.rewrites,
            RewriteRules::new(vec![
                RewriteRule::new("example.com/a", "https://cli/a"),
                RewriteRule::new("example.com/a", "https://config/a"),
            ])
        );
    }
}
