use std::path::PathBuf;

use clap::Parser;

use crate::repository::RewriteRule;

/// Generates a deps.nix file pinning every module of a Go project.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    /// Directory of the Go project, containing go.mod.
    #[clap(short, long, default_value = ".")]
    pub dir: PathBuf,
    /// Manifest to write, relative to the project directory.
    #[clap(short, long, default_value = "deps.nix")]
    pub outfile: PathBuf,
    /// Previous manifest to reuse hashes from.
    ///
    /// Defaults to the output file.
    #[clap(short, long)]
    pub infile: Option<PathBuf>,
    /// Number of concurrent prefetch workers.
    #[clap(short, long)]
    pub jobs: Option<usize>,
    /// Leave out packages that fail to prefetch instead of aborting.
    #[clap(short, long)]
    pub keep_going: bool,
    /// Fetch modules under PREFIX from REPLACEMENT, either a repository url
    /// or another import path. Can be repeated.
    #[clap(long = "rewrite", value_name = "PREFIX=REPLACEMENT", value_parser = parse_rewrite)]
    pub rewrites: Vec<RewriteRule>,
}

fn parse_rewrite(value: &str) -> Result<RewriteRule, String> {
    match value.split_once('=') {
        Some((prefix, replacement)) if !prefix.is_empty() && !replacement.is_empty() => {
            Ok(RewriteRule::new(prefix, replacement))
        }
        _ => Err(format!("expected PREFIX=REPLACEMENT, got {value:?}")),
    }
}
