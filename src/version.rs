//! Turns Go module versions into git revisions that `nix-prefetch-git` can check out.

use std::sync::OnceLock;

use regex_lite::Regex;
use thiserror::Error;

const INCOMPATIBLE_SUFFIX: &str = "+incompatible";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed version `{version}`: {reason}")]
pub struct MalformedVersionError {
    pub version: String,
    pub reason: &'static str,
}

fn pseudo_version_hint() -> &'static Regex {
    static HINT: OnceLock<Regex> = OnceLock::new();
    HINT.get_or_init(|| Regex::new(r"[-.][0-9]{14}-").expect("static pseudo-version hint"))
}

fn pseudo_version() -> &'static Regex {
    static PSEUDO: OnceLock<Regex> = OnceLock::new();
    PSEUDO.get_or_init(|| {
        Regex::new(
            r"^v[0-9]+\.[0-9]+\.[0-9]+-(?:[0-9A-Za-z.\-]*\.)?[0-9]{14}-([0-9A-Za-z]+)(?:\+incompatible)?$",
        )
        .expect("static pseudo-version pattern")
    })
}

fn semver_tag() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| {
        Regex::new(r"^v[0-9]+\.[0-9]+\.[0-9]+").expect("static semver tag pattern")
    })
}

/// `v2`, `v10`, but not `v2.1` or `vendor`.
pub fn is_major_version_segment(segment: &str) -> bool {
    segment
        .strip_prefix('v')
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Drops a trailing `/vN` (or a lone `vN`) from a module subdirectory.
pub fn strip_major_version(subdir: &str) -> &str {
    match subdir.rsplit_once('/') {
        Some((parent, last)) if is_major_version_segment(last) => parent,
        None if is_major_version_segment(subdir) => "",
        _ => subdir,
    }
}

/// Normalizes a module version into a revision.
///
/// `subdir` is the module directory relative to its repository root, empty when the module
/// lives at the root. Pseudo-versions resolve to their commit identifier and never get a
/// directory prefix; semver tags of nested modules are prefixed with the directory, as
/// nested modules are tagged `dir/vX.Y.Z`. Anything else, such as a commit, is kept as is.
pub fn normalize_revision(version: &str, subdir: &str) -> Result<String, MalformedVersionError> {
    if pseudo_version_hint().is_match(version) {
        return pseudo_version()
            .captures(version)
            .and_then(|captures| captures.get(1))
            .map(|commit| commit.as_str().to_owned())
            .ok_or_else(|| MalformedVersionError {
                version: version.to_owned(),
                reason: "looks like a pseudo-version but does not match vX.Y.Z-[pre.]yyyymmddhhmmss-commit",
            });
    }

    if let Some(tag) = version.strip_suffix(INCOMPATIBLE_SUFFIX) {
        if tag.is_empty() {
            return Err(MalformedVersionError {
                version: version.to_owned(),
                reason: "incompatible marker without a version",
            });
        }
        return Ok(tag.to_owned());
    }

    let prefix = strip_major_version(subdir.trim_matches('/'));
    if prefix.is_empty()
        || !semver_tag().is_match(version)
        || version.starts_with(&format!("{prefix}/"))
    {
        Ok(version.to_owned())
    } else {
        Ok(format!("{prefix}/{version}"))
    }
}
