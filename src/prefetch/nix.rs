use std::{
    path::PathBuf,
    process::{Command, Stdio},
};

use log::trace;
use serde::Deserialize;

use super::{ContentHashFetcher, FetchError, FetchOptions};

/// Runs `nix-prefetch-git` and reads the hash from its JSON output.
#[derive(Debug, Clone)]
pub struct NixPrefetchGit {
    command: PathBuf,
}

impl NixPrefetchGit {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        NixPrefetchGit {
            command: command.into(),
        }
    }

    fn arguments<'a>(url: &'a str, revision: &'a str, options: FetchOptions) -> Vec<&'a str> {
        let mut arguments = vec!["--quiet", "--url", url, "--rev", revision];
        if options.include_submodules {
            arguments.push("--fetch-submodules");
        }
        if !options.shallow {
            arguments.push("--deepClone");
        }
        arguments
    }
}

impl Default for NixPrefetchGit {
    fn default() -> Self {
        NixPrefetchGit::new("nix-prefetch-git")
    }
}

#[derive(Debug, Deserialize)]
struct PrefetchResponse {
    sha256: String,
}

fn parse_response(command: &str, stdout: &[u8]) -> Result<String, FetchError> {
    serde_json::from_slice::<PrefetchResponse>(stdout)
        .map(|response| response.sha256)
        .map_err(|source| FetchError::Json {
            command: command.to_owned(),
            source,
        })
}

impl ContentHashFetcher for NixPrefetchGit {
    fn fetch(
        &self,
        url: &str,
        revision: &str,
        options: FetchOptions,
    ) -> Result<String, FetchError> {
        let command = self.command.display().to_string();
        let arguments = Self::arguments(url, revision, options);
        trace!("Running {} {}", command, arguments.join(" "));

        let output = Command::new(&self.command)
            .args(&arguments)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| FetchError::Io {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(FetchError::Status {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        parse_response(&command, &output.stdout)
    }
}
