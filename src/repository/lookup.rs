use std::{sync::OnceLock, time::Duration};

use dashmap::DashMap;
use log::{debug, trace};
use regex_lite::Regex;

use super::{is_path_prefix, RepositoryError, RepositoryLookup, RepositoryRoot};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Finds repositories the way `go get` does: a few well-known hosts are mapped statically,
/// everything else is discovered through the `go-import` meta tag served at
/// `https://<import path>?go-get=1`.
///
/// Discovered roots are remembered per import path. A root found for `host/x` says nothing
/// about `host/x/y`, which may be served from another repository.
pub struct VcsRepositoryLookup {
    client: reqwest::blocking::Client,
    discovered: DashMap<String, RepositoryRoot>,
}

impl VcsRepositoryLookup {
    pub fn new() -> Result<Self, RepositoryError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(DISCOVERY_TIMEOUT)
            .user_agent(format!("gomodnix/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| RepositoryError::Http {
                path: String::new(),
                source,
            })?;
        Ok(VcsRepositoryLookup {
            client,
            discovered: DashMap::new(),
        })
    }

    fn discover(&self, import_path: &str) -> Result<RepositoryRoot, RepositoryError> {
        let url = format!("https://{import_path}?go-get=1");
        debug!("Discovering repository of {} via {}", import_path, url);
        let http_error = |source| RepositoryError::Http {
            path: import_path.to_owned(),
            source,
        };
        let body = self
            .client
            .get(&url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(http_error)?;
        parse_go_import(&body, import_path)?
            .ok_or_else(|| RepositoryError::NotFound(import_path.to_owned()))
    }
}

impl RepositoryLookup for VcsRepositoryLookup {
    fn lookup(&self, import_path: &str) -> Result<RepositoryRoot, RepositoryError> {
        if let Some(root) = known_host(import_path) {
            return Ok(root);
        }
        if let Some(known) = self.discovered.get(import_path) {
            trace!("Repository of {} already known: {}", import_path, known.url);
            return Ok(known.value().clone());
        }

        let root = self.discover(import_path)?;
        self.discovered.insert(import_path.to_owned(), root.clone());
        Ok(root)
    }
}

struct KnownHost {
    pattern: Regex,
    url: fn(&str) -> String,
}

fn https(root: &str) -> String {
    format!("https://{root}")
}

fn googlesource(root: &str) -> String {
    format!(
        "https://go.googlesource.com/{}",
        root.trim_start_matches("golang.org/x/")
    )
}

fn known_hosts() -> &'static [KnownHost] {
    static HOSTS: OnceLock<Vec<KnownHost>> = OnceLock::new();
    HOSTS.get_or_init(|| {
        [
            (
                r"^(github\.com/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(?:/|$)",
                https as fn(&str) -> String,
            ),
            (
                r"^(bitbucket\.org/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(?:/|$)",
                https,
            ),
            (r"^(golang\.org/x/[A-Za-z0-9_.\-]+)(?:/|$)", googlesource),
            (
                r"^(gopkg\.in/(?:[A-Za-z0-9_\-]+/)?[A-Za-z0-9_.\-]+\.v[0-9]+)(?:/|$)",
                https,
            ),
        ]
        .into_iter()
        .map(|(pattern, url)| KnownHost {
            pattern: Regex::new(pattern).expect("static host pattern"),
            url,
        })
        .collect()
    })
}

fn known_host(import_path: &str) -> Option<RepositoryRoot> {
    known_hosts().iter().find_map(|host| {
        let root = host.pattern.captures(import_path)?.get(1)?.as_str();
        Some(RepositoryRoot {
            url: (host.url)(root),
            root: root.to_owned(),
        })
    })
}

fn meta_tag() -> &'static Regex {
    static META: OnceLock<Regex> = OnceLock::new();
    META.get_or_init(|| Regex::new(r"(?i)<meta\s[^>]*>").expect("static meta pattern"))
}

fn attribute() -> &'static Regex {
    static ATTRIBUTE: OnceLock<Regex> = OnceLock::new();
    ATTRIBUTE.get_or_init(|| {
        Regex::new(r#"([A-Za-z\-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("static attribute pattern")
    })
}

/// Picks the `go-import` meta tag whose prefix contains `import_path`.
fn parse_go_import(
    body: &str,
    import_path: &str,
) -> Result<Option<RepositoryRoot>, RepositoryError> {
    for tag in meta_tag().find_iter(body) {
        let mut name = None;
        let mut content = None;
        for captures in attribute().captures_iter(tag.as_str()) {
            let value = captures
                .get(2)
                .or_else(|| captures.get(3))
                .map(|m| m.as_str());
            match captures.get(1).map(|m| m.as_str().to_ascii_lowercase()) {
                Some(key) if key == "name" => name = value,
                Some(key) if key == "content" => content = value,
                _ => {}
            }
        }
        if name != Some("go-import") {
            continue;
        }
        let fields: Vec<&str> = content.unwrap_or_default().split_whitespace().collect();
        let &[prefix, vcs, url] = fields.as_slice() else {
            trace!("Ignoring malformed go-import content {:?}", content);
            continue;
        };
        if !is_path_prefix(prefix, import_path) || vcs == "mod" {
            continue;
        }
        if vcs != "git" {
            return Err(RepositoryError::UnsupportedVcs {
                path: import_path.to_owned(),
                vcs: vcs.to_owned(),
            });
        }
        return Ok(Some(RepositoryRoot {
            url: url.to_owned(),
            root: prefix.to_owned(),
        }));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn root(url: &str, root: &str) -> RepositoryRoot {
        RepositoryRoot {
            url: url.to_owned(),
            root: root.to_owned(),
        }
    }

    #[test]
    fn github() {
        assert_eq!(
            known_host("github.com/yihuang/test-golang-module-major-version/sub/v2"),
            Some(root(
                "https://github.com/yihuang/test-golang-module-major-version",
                "github.com/yihuang/test-golang-module-major-version"
            ))
        );
        assert_eq!(known_host("github.com/org"), None);
    }

    #[test]
    fn golang_x() {
        assert_eq!(
            known_host("golang.org/x/tools/go/vcs"),
            Some(root("https://go.googlesource.com/tools", "golang.org/x/tools"))
        );
    }

    #[test]
    fn gopkg_in() {
        assert_eq!(
            known_host("gopkg.in/yaml.v2"),
            Some(root("https://gopkg.in/yaml.v2", "gopkg.in/yaml.v2"))
        );
        assert_eq!(
            known_host("gopkg.in/src-d/go-git.v4/plumbing"),
            Some(root("https://gopkg.in/src-d/go-git.v4", "gopkg.in/src-d/go-git.v4"))
        );
    }

    #[test]
    fn unknown_host() {
        assert_eq!(known_host("go.uber.org/zap"), None);
    }

    #[test]
    fn go_import_meta() {
        let body = r#"<html><head>
            <meta name="go-source" content="go.uber.org/zap https://github.com/uber-go/zap x y">
            <meta name="go-import" content="go.uber.org/zap git https://github.com/uber-go/zap">
            </head></html>"#;
        assert_eq!(
            parse_go_import(body, "go.uber.org/zap/zapcore").unwrap(),
            Some(root("https://github.com/uber-go/zap", "go.uber.org/zap"))
        );
    }

    #[test]
    fn go_import_meta_skips_other_prefixes() {
        let body = r#"<meta content="example.com/other git https://x/other" name="go-import"/>
            <meta name='go-import' content='example.com/repo mod https://proxy'>
            <meta name='go-import' content='example.com/repo git https://x/repo'>"#;
        assert_eq!(
            parse_go_import(body, "example.com/repo").unwrap(),
            Some(root("https://x/repo", "example.com/repo"))
        );
        assert_eq!(parse_go_import(body, "example.com/none").unwrap(), None);
    }

    #[test]
    fn go_import_meta_other_vcs() {
        let body = r#"<meta name="go-import" content="example.com/hg hg https://x/hg">"#;
        assert!(matches!(
            parse_go_import(body, "example.com/hg"),
            Err(RepositoryError::UnsupportedVcs { .. })
        ));
    }

    #[test]
    fn discovered_roots_are_memoized_per_path() {
        let lookup = VcsRepositoryLookup::new().unwrap();
        lookup.discovered.insert(
            "example.invalid/repo".to_owned(),
            root("https://x/repo", "example.invalid/repo"),
        );
        assert_eq!(
            lookup.lookup("example.invalid/repo").unwrap(),
            root("https://x/repo", "example.invalid/repo")
        );
        // A nested path goes back to discovery, which cannot reach a reserved domain.
        assert!(matches!(
            lookup.lookup("example.invalid/repo/sub"),
            Err(RepositoryError::Http { .. })
        ));
    }

    #[test]
    fn static_hosts_skip_the_memo() {
        let lookup = VcsRepositoryLookup::new().unwrap();
        lookup.discovered.insert(
            "github.com/org/repo".to_owned(),
            root("https://stale/repo", "github.com/org/repo"),
        );
        assert_eq!(
            lookup.lookup("github.com/org/repo").unwrap(),
            root("https://github.com/org/repo", "github.com/org/repo")
        );
    }
}
