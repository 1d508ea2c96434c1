use std::{error::Error, path::Path};

use log::{debug, info, warn};

use crate::{
    cache::FetchCache,
    flock::FileLock,
    lister::GoModuleLister,
    model::manifest::{self, Manifest},
    resolver::{Resolution, ResolveOptions, Resolver},
};

/// Handler to the generate command
/// Lists the modules of the project in `root`, resolves them reusing the hashes found
/// in `infile` and writes the result to `outfile`.
/// Nothing is written when resolution fails.
pub fn do_generate(
    lister: &GoModuleLister,
    resolver: &Resolver,
    options: &ResolveOptions,
    root: &Path,
    outfile: &Path,
    infile: &Path,
) -> Result<Resolution, Box<dyn Error>> {
    let declarations = lister.list(root)?;
    debug!("Found {} modules", declarations.len());

    let infile_path = root.join(infile);
    let previous = Manifest::from_file(&infile_path)?;
    let cache = FetchCache::new(previous.packages);
    debug!("Loaded {} cached hashes from {}", cache.len(), infile_path.display());

    let resolution = resolver.resolve(&declarations, &cache, options)?;

    let outfile_path = root.join(outfile);
    let _lock = FileLock::for_manifest(&outfile_path)?;
    if manifest::write(&outfile_path, &resolution.packages)? {
        info!(
            "Wrote {} packages to {}",
            resolution.packages.len(),
            outfile_path.display()
        );
    } else {
        info!("{} is up to date", outfile_path.display());
    }

    if !resolution.failures.is_empty() {
        for failure in &resolution.failures {
            warn!("Left out {}: {}", failure.import_path, failure.error);
        }
        warn!(
            "{} packages could not be fetched and are missing from {}",
            resolution.failures.len(),
            outfile_path.display()
        );
    }

    Ok(resolution)
}
