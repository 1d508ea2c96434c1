use thiserror::Error;

pub mod manifest;
pub mod module;
pub mod package;

pub use module::{ImportPath, ModuleDeclaration, Replacement};
pub use package::{CachedPackage, ResolvedEntry, ResolvedPackage};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading manifest: {0}")]
    IO(#[from] std::io::Error),
    #[error("Unexpected character {found:?} on line {line}")]
    UnexpectedCharacter { line: usize, found: char },
    #[error("Unexpected {found} on line {line}, expected {expected}")]
    UnexpectedToken {
        line: usize,
        found: String,
        expected: &'static str,
    },
    #[error("Unexpected end of manifest, expected {expected}")]
    UnexpectedEnd { expected: &'static str },
    #[error("Missing key `{key}` in manifest entry starting on line {line}")]
    MissingKey { key: &'static str, line: usize },
    #[error("Duplicate key `{key}` on line {line}")]
    DuplicateKey { key: String, line: usize },
}
