use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use log::debug;
use thiserror::Error;

use crate::model::{ModuleDeclaration, Replacement};

#[derive(Error, Debug)]
pub enum ListError {
    #[error("Could not run `{command} list -m all`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command} list -m all` failed with {status}:\n{stderr}")]
    Command {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("Unexpected line in `go list -m all` output: {line:?}")]
    Malformed { line: String },
}

/// Lists the module graph with `go list -m all`.
#[derive(Debug, Clone)]
pub struct GoModuleLister {
    command: PathBuf,
}

impl GoModuleLister {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        GoModuleLister {
            command: command.into(),
        }
    }

    pub fn list(&self, project: &Path) -> Result<Vec<ModuleDeclaration>, ListError> {
        let command = self.command.display().to_string();
        debug!("Running {} list -m all in {}", command, project.display());

        // Module mode regardless of the caller's environment, GOPATH plays no part in it.
        let output = Command::new(&self.command)
            .args(["list", "-m", "all"])
            .current_dir(project)
            .env("GO111MODULE", "on")
            .env_remove("GOPATH")
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ListError::Io {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ListError::Command {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        parse_module_list(&String::from_utf8_lossy(&output.stdout))
    }
}

impl Default for GoModuleLister {
    fn default() -> Self {
        GoModuleLister::new("go")
    }
}

/// Parses `go list -m all` output, the first line being the main module.
pub fn parse_module_list(output: &str) -> Result<Vec<ModuleDeclaration>, ListError> {
    let mut lines = output.lines().filter(|line| !line.trim().is_empty());
    let Some(main) = lines.next() else {
        return Ok(Vec::new());
    };

    let mut declarations = vec![ModuleDeclaration::main(main.trim())];
    for line in lines {
        declarations.push(parse_line(line)?);
    }
    Ok(declarations)
}

fn parse_line(line: &str) -> Result<ModuleDeclaration, ListError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let malformed = || ListError::Malformed {
        line: line.to_owned(),
    };
    match fields.as_slice() {
        &[path, version] => Ok(ModuleDeclaration::new(path, version)),
        &[path, version, "=>", new_path, new_version] => {
            Ok(ModuleDeclaration::new(path, version).replaced_by(new_path, new_version))
        }
        &[path, version, "=>", dir] => Ok(local(path, version, dir)),
        &[path, "=>", dir] => Ok(local(path, "", dir)),
        _ => Err(malformed()),
    }
}

fn local(path: &str, version: &str, dir: &str) -> ModuleDeclaration {
    let mut declaration = ModuleDeclaration::new(path, version);
    declaration.replacement = Some(Replacement::Local {
        dir: PathBuf::from(dir),
    });
    declaration
}
