use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
};

/// A Go import path such as `github.com/org/repo/sub`.
#[derive(Clone, Hash, Debug, PartialEq, Eq, Ord, PartialOrd)]
pub struct ImportPath(String);

impl ImportPath {
    pub fn new(s: impl Into<String>) -> Self {
        ImportPath(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ImportPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ImportPath {
    fn from(s: String) -> Self {
        ImportPath(s)
    }
}

impl From<&str> for ImportPath {
    fn from(s: &str) -> Self {
        ImportPath(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacement {
    /// `path version => other/path other-version`
    Module { path: ImportPath, version: String },
    /// `path version => ./some/dir`, not fetchable.
    Local { dir: PathBuf },
}

/// One line of `go list -m all`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDeclaration {
    pub path: ImportPath,
    pub version: String,
    pub replacement: Option<Replacement>,
    /// The module being built, listed first by `go list -m all`.
    pub main: bool,
}

impl ModuleDeclaration {
    pub fn new(path: impl Into<ImportPath>, version: impl Into<String>) -> Self {
        ModuleDeclaration {
            path: path.into(),
            version: version.into(),
            replacement: None,
            main: false,
        }
    }

    pub fn main(path: impl Into<ImportPath>) -> Self {
        ModuleDeclaration {
            path: path.into(),
            version: String::new(),
            replacement: None,
            main: true,
        }
    }

    pub fn replaced_by(mut self, path: impl Into<ImportPath>, version: impl Into<String>) -> Self {
        self.replacement = Some(Replacement::Module {
            path: path.into(),
            version: version.into(),
        });
        self
    }

    /// The import path and version that should actually be fetched.
    ///
    /// Returns `None` for modules replaced by a local directory.
    pub fn source(&self) -> Option<(&ImportPath, &str)> {
        match &self.replacement {
            None => Some((&self.path, &self.version)),
            Some(Replacement::Module { path, version }) => Some((path, version)),
            Some(Replacement::Local { .. }) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn source_prefers_replacement() {
        let declaration = ModuleDeclaration::new("github.com/a/b", "v1.0.0")
            .replaced_by("github.com/fork/b", "v1.0.1");
        assert_eq!(
            declaration.source(),
            Some((&ImportPath::from("github.com/fork/b"), "v1.0.1"))
        );
    }

    #[test]
    fn local_replacement_has_no_source() {
        let declaration = ModuleDeclaration {
            path: "github.com/a/b".into(),
            version: "v1.0.0".to_owned(),
            replacement: Some(Replacement::Local {
                dir: PathBuf::from("../b"),
            }),
            main: false,
        };
        assert_eq!(declaration.source(), None);
    }
}
