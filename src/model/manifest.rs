//! Reading and writing the `deps.nix` manifest.
//!
//! The writer emits a fixed layout and the reader understands that layout: a Nix list of
//! attribute sets holding only string values and nested attribute sets. It is not a general
//! Nix parser.

use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use log::{debug, trace};
use regex_lite::Regex;

use crate::model::{CachedPackage, ImportPath, ParseError, ResolvedPackage};

const HEADER: &str = "# file generated from go.mod using gomodnix";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub packages: Vec<CachedPackage>,
}

impl Manifest {
    /// A missing file is an empty manifest.
    pub fn from_file(path: &Path) -> Result<Manifest, ParseError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                debug!("Loading previous manifest from {}", path.display());
                Manifest::from_str(&contents)
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!("No previous manifest at {}", path.display());
                Ok(Manifest::default())
            }
            Err(error) => Err(error.into()),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Manifest, ParseError> {
        let tokens = tokenize(s)?;
        if tokens.is_empty() {
            return Ok(Manifest::default());
        }
        let mut parser = Parser { tokens, position: 0 };
        let packages = parser.list()?;
        Ok(Manifest { packages })
    }
}

/// Renders packages in the order given.
pub fn render(packages: &[ResolvedPackage]) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push_str("\n[\n");
    for package in packages {
        // Writing to a String cannot fail.
        let _ = write!(
            out,
            "  {{\n    goPackagePath = \"{}\";\n",
            escape(package.import_path.as_str())
        );
        if !package.subdir.is_empty() {
            let _ = writeln!(out, "    moduleDir = \"{}\";", escape(&package.subdir));
        }
        let _ = write!(
            out,
            "    fetch = {{\n      type = \"git\";\n      url = \"{}\";\n      rev = \"{}\";\n      sha256 = \"{}\";\n    }};\n  }}\n",
            escape(&package.url),
            escape(&package.revision),
            escape(&package.hash)
        );
    }
    out.push_str("]\n");
    out
}

/// Writes the manifest through a temporary sibling file.
///
/// Returns `false` when the file already had exactly this content.
pub fn write(path: &Path, packages: &[ResolvedPackage]) -> Result<bool, std::io::Error> {
    let content = render(packages);
    match std::fs::read_to_string(path) {
        Ok(existing) if existing == content => return Ok(false),
        _ => {}
    }
    let temporary = temporary_path(path);
    std::fs::write(&temporary, content)?;
    std::fs::rename(&temporary, path)?;
    Ok(true)
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace("${", "\\${")
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    OpenList,
    CloseList,
    OpenSet,
    CloseSet,
    Equals,
    Semicolon,
    Ident(String),
    Str(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::OpenList => "`[`".to_owned(),
            Token::CloseList => "`]`".to_owned(),
            Token::OpenSet => "`{`".to_owned(),
            Token::CloseSet => "`}`".to_owned(),
            Token::Equals => "`=`".to_owned(),
            Token::Semicolon => "`;`".to_owned(),
            Token::Ident(ident) => format!("identifier `{ident}`"),
            Token::Str(_) => "string".to_owned(),
        }
    }
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r#"\s+|#[^\n]*|"(?:[^"\\]|\\.)*"|[A-Za-z_][A-Za-z0-9_'\-]*|[\[\]{}=;]"#)
            .expect("static token pattern")
    })
}

fn tokenize(s: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut last_end = 0;
    for found in token_regex().find_iter(s) {
        if found.start() != last_end {
            return Err(unexpected_character(s, last_end, line));
        }
        let text = found.as_str();
        let token_line = line;
        line += text.matches('\n').count();
        last_end = found.end();

        let token = match text {
            "[" => Token::OpenList,
            "]" => Token::CloseList,
            "{" => Token::OpenSet,
            "}" => Token::CloseSet,
            "=" => Token::Equals,
            ";" => Token::Semicolon,
            _ if text.starts_with('"') => Token::Str(unescape(&text[1..text.len() - 1])),
            _ if text.starts_with('#') || text.trim().is_empty() => continue,
            _ => Token::Ident(text.to_owned()),
        };
        tokens.push((token_line, token));
    }
    if last_end != s.len() {
        return Err(unexpected_character(s, last_end, line));
    }
    trace!("Tokenized manifest into {} tokens", tokens.len());
    Ok(tokens)
}

fn unexpected_character(s: &str, offset: usize, line: usize) -> ParseError {
    ParseError::UnexpectedCharacter {
        line,
        found: s[offset..].chars().next().unwrap_or(' '),
    }
}

enum Value {
    Str(String),
    Set(Vec<(String, Value)>),
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    position: usize,
}

impl Parser {
    fn next(&mut self, expected: &'static str) -> Result<(usize, Token), ParseError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or(ParseError::UnexpectedEnd { expected })?;
        self.position += 1;
        Ok(token)
    }

    fn expect(&mut self, wanted: Token, expected: &'static str) -> Result<(), ParseError> {
        let (line, token) = self.next(expected)?;
        if token == wanted {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                line,
                found: token.describe(),
                expected,
            })
        }
    }

    fn list(&mut self) -> Result<Vec<CachedPackage>, ParseError> {
        self.expect(Token::OpenList, "`[`")?;
        let mut packages = Vec::new();
        loop {
            match self.next("`{` or `]`")? {
                (_, Token::CloseList) => break,
                (line, Token::OpenSet) => {
                    let attributes = self.set()?;
                    packages.push(package(attributes, line)?);
                }
                (line, token) => {
                    return Err(ParseError::UnexpectedToken {
                        line,
                        found: token.describe(),
                        expected: "`{` or `]`",
                    })
                }
            }
        }
        if let Some((line, token)) = self.tokens.get(self.position) {
            return Err(ParseError::UnexpectedToken {
                line: *line,
                found: token.describe(),
                expected: "end of manifest",
            });
        }
        Ok(packages)
    }

    // Called after the opening brace.
    fn set(&mut self) -> Result<Vec<(String, Value)>, ParseError> {
        let mut attributes: Vec<(String, Value)> = Vec::new();
        loop {
            let (line, key) = match self.next("attribute name or `}`")? {
                (_, Token::CloseSet) => return Ok(attributes),
                (line, Token::Ident(key)) => (line, key),
                (line, token) => {
                    return Err(ParseError::UnexpectedToken {
                        line,
                        found: token.describe(),
                        expected: "attribute name or `}`",
                    })
                }
            };
            if attributes.iter().any(|(existing, _)| existing == &key) {
                return Err(ParseError::DuplicateKey { key, line });
            }
            self.expect(Token::Equals, "`=`")?;
            let value = match self.next("string or `{`")? {
                (_, Token::Str(value)) => Value::Str(value),
                (_, Token::OpenSet) => Value::Set(self.set()?),
                (line, token) => {
                    return Err(ParseError::UnexpectedToken {
                        line,
                        found: token.describe(),
                        expected: "string or `{`",
                    })
                }
            };
            self.expect(Token::Semicolon, "`;`")?;
            attributes.push((key, value));
        }
    }
}

fn take_str(attributes: &mut Vec<(String, Value)>, key: &str) -> Option<String> {
    let index = attributes
        .iter()
        .position(|(name, value)| name == key && matches!(value, Value::Str(_)))?;
    match attributes.remove(index).1 {
        Value::Str(value) => Some(value),
        Value::Set(_) => None,
    }
}

fn take_set(attributes: &mut Vec<(String, Value)>, key: &str) -> Option<Vec<(String, Value)>> {
    let index = attributes
        .iter()
        .position(|(name, value)| name == key && matches!(value, Value::Set(_)))?;
    match attributes.remove(index).1 {
        Value::Set(value) => Some(value),
        Value::Str(_) => None,
    }
}

fn package(mut attributes: Vec<(String, Value)>, line: usize) -> Result<CachedPackage, ParseError> {
    let missing = |key| ParseError::MissingKey { key, line };

    let import_path = take_str(&mut attributes, "goPackagePath").ok_or(missing("goPackagePath"))?;
    let subdir = take_str(&mut attributes, "moduleDir").unwrap_or_default();
    let mut fetch = take_set(&mut attributes, "fetch").ok_or(missing("fetch"))?;

    Ok(CachedPackage {
        import_path: ImportPath::new(import_path),
        url: take_str(&mut fetch, "url").ok_or(missing("fetch.url"))?,
        revision: take_str(&mut fetch, "rev").ok_or(missing("fetch.rev"))?,
        hash: take_str(&mut fetch, "sha256").ok_or(missing("fetch.sha256"))?,
        subdir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn package(path: &str, subdir: &str) -> ResolvedPackage {
        ResolvedPackage {
            import_path: ImportPath::from(path),
            url: format!("https://{path}"),
            revision: "v1.0.0".to_owned(),
            subdir: subdir.to_owned(),
            hash: "0abc".to_owned(),
        }
    }

    #[test]
    fn render_layout() {
        let text = render(&[package("github.com/org/repo", "")]);
        assert_eq!(
            text,
            r#"# file generated from go.mod using gomodnix
[
  {
    goPackagePath = "github.com/org/repo";
    fetch = {
      type = "git";
      url = "https://github.com/org/repo";
      rev = "v1.0.0";
      sha256 = "0abc";
    };
  }
]
"#
        );
    }

    #[test]
    fn read_back_rendered_manifest() {
        let packages = vec![
            package("github.com/org/repo", ""),
            package("github.com/org/mono/sub", "sub"),
        ];
        let parsed = Manifest::from_str(&render(&packages)).unwrap();
        let expected: Vec<CachedPackage> = packages.into_iter().map(Into::into).collect();
        assert_eq!(parsed.packages, expected);
    }

    #[test]
    fn read_hand_written_manifest() {
        let text = r#"
            # edited by hand
            [ { goPackagePath = "example.com/x"; fetch = { type = "git"; url = "https://example.com/x"; rev = "abc\"def"; sha256 = "h"; }; } ]
        "#;
        let manifest = Manifest::from_str(text).unwrap();
        assert_eq!(manifest.packages.len(), 1);
        assert_eq!(manifest.packages[0].revision, "abc\"def");
        assert_eq!(manifest.packages[0].subdir, "");
    }

    #[test]
    fn empty_manifest() {
        assert_eq!(Manifest::from_str("").unwrap(), Manifest::default());
        assert_eq!(Manifest::from_str("# nothing\n").unwrap(), Manifest::default());
        assert_eq!(Manifest::from_str("[ ]").unwrap(), Manifest::default());
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::from_file(&dir.path().join("deps.nix")).unwrap();
        assert!(manifest.packages.is_empty());
    }

    #[test]
    fn missing_sha256() {
        let text = r#"[ { goPackagePath = "a"; fetch = { url = "u"; rev = "r"; }; } ]"#;
        let error = Manifest::from_str(text).unwrap_err();
        assert!(matches!(
            error,
            ParseError::MissingKey {
                key: "fetch.sha256",
                ..
            }
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let error = Manifest::from_str("[ { goPackagePath = 12; } ]").unwrap_err();
        assert!(matches!(error, ParseError::UnexpectedCharacter { line: 1, found: '1' }));

        let error = Manifest::from_str("[ ] ]").unwrap_err();
        assert!(matches!(error, ParseError::UnexpectedToken { .. }));

        let error = Manifest::from_str("[ {").unwrap_err();
        assert!(matches!(error, ParseError::UnexpectedEnd { .. }));
    }

    #[test]
    fn escaping_interpolation() {
        let mut weird = package("example.com/x", "");
        weird.revision = "${oops}".to_owned();
        let text = render(&[weird]);
        assert!(text.contains(r#"rev = "\${oops}";"#));
        let parsed = Manifest::from_str(&text).unwrap();
        assert_eq!(parsed.packages[0].revision, "${oops}");
    }

    #[test]
    fn write_skips_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deps.nix");
        let packages = vec![package("github.com/org/repo", "")];

        assert!(write(&path, &packages).unwrap());
        assert!(!write(&path, &packages).unwrap());
        assert!(!temporary_path(&path).exists());

        let parsed = Manifest::from_file(&path).unwrap();
        assert_eq!(parsed.packages.len(), 1);
    }
}
