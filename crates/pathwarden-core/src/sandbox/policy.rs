//! Protected-path policy
//!
//! Two independent rule sets over normalized paths:
//! - non-deletable paths, matched exactly;
//! - sensitive paths, matched either as a segment prefix or through a single
//!   `prefix/*/suffix` wildcard split into a raw prefix and suffix test.
//!
//! The wildcard matcher is intentionally weak: one `*`, no variable depth.
//! `/home/*/.ssh` matches `/home/alice/.ssh` but not `/home/alice/.ssh/id_rsa`.

use crate::config::PolicyConfig;
use crate::error::{PathError, Result};
use crate::path::NormalizedPath;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
struct WildcardPattern {
    prefix: String,
    suffix: String,
}

impl WildcardPattern {
    fn matches(&self, path: &NormalizedPath) -> bool {
        path.as_str().starts_with(&self.prefix) && path.as_str().ends_with(&self.suffix)
    }
}

/// Static classification of protected paths
#[derive(Debug, Clone)]
pub struct PathPolicy {
    non_deletable: HashSet<NormalizedPath>,
    sensitive_prefixes: Vec<NormalizedPath>,
    sensitive_patterns: Vec<WildcardPattern>,
}

impl PathPolicy {
    pub fn new<N, S>(non_deletable: N, sensitive: S) -> std::result::Result<Self, PathError>
    where
        N: IntoIterator,
        N::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let non_deletable = non_deletable
            .into_iter()
            .map(|raw| NormalizedPath::parse(raw.as_ref()))
            .collect::<std::result::Result<HashSet<_>, _>>()?;

        let mut sensitive_prefixes = Vec::new();
        let mut sensitive_patterns = Vec::new();
        for raw in sensitive {
            let raw = raw.as_ref();
            match raw.matches('*').count() {
                0 => sensitive_prefixes.push(NormalizedPath::parse(raw)?),
                1 => sensitive_patterns.push(parse_wildcard(raw)?),
                _ => {
                    return Err(PathError::InvalidPattern(format!(
                        "{:?} has more than one wildcard",
                        raw
                    )))
                }
            }
        }

        Ok(Self {
            non_deletable,
            sensitive_prefixes,
            sensitive_patterns,
        })
    }

    pub fn from_config(config: &PolicyConfig) -> Result<Self> {
        Ok(Self::new(&config.non_deletable, &config.sensitive)?)
    }

    /// An empty policy that protects nothing
    pub fn permissive() -> Self {
        Self {
            non_deletable: HashSet::new(),
            sensitive_prefixes: Vec::new(),
            sensitive_patterns: Vec::new(),
        }
    }

    pub fn is_non_deletable(&self, path: &NormalizedPath) -> bool {
        self.non_deletable.contains(path)
    }

    pub fn is_sensitive(&self, path: &NormalizedPath) -> bool {
        self.sensitive_prefixes.iter().any(|prefix| path.starts_with(prefix))
            || self.sensitive_patterns.iter().any(|pattern| pattern.matches(path))
    }
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self::new(
            &PolicyConfig::default().non_deletable,
            &PolicyConfig::default().sensitive,
        )
        .unwrap_or_else(|_| Self::permissive())
    }
}

fn parse_wildcard(raw: &str) -> std::result::Result<WildcardPattern, PathError> {
    let (prefix, suffix) = raw
        .split_once('*')
        .ok_or_else(|| PathError::InvalidPattern(raw.to_string()))?;
    if !prefix.starts_with('/') {
        return Err(PathError::InvalidPattern(format!(
            "{:?} is not an absolute pattern",
            raw
        )));
    }
    Ok(WildcardPattern {
        prefix: prefix.to_string(),
        suffix: suffix.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(raw: &str) -> NormalizedPath {
        NormalizedPath::parse(raw).unwrap()
    }

    #[test]
    fn test_non_deletable_is_exact() {
        let policy = PathPolicy::new(["/", "/etc/"], Vec::<String>::new()).unwrap();
        assert!(policy.is_non_deletable(&p("/")));
        assert!(policy.is_non_deletable(&p("/etc")));
        assert!(!policy.is_non_deletable(&p("/etc/hosts")));
        assert!(!policy.is_non_deletable(&p("/etcetera")));
    }

    #[test]
    fn test_sensitive_prefix() {
        let policy = PathPolicy::new(Vec::<String>::new(), ["/root"]).unwrap();
        assert!(policy.is_sensitive(&p("/root")));
        assert!(policy.is_sensitive(&p("/root/.bashrc")));
        assert!(!policy.is_sensitive(&p("/rootless")));
    }

    #[test]
    fn test_sensitive_wildcard() {
        let policy = PathPolicy::new(Vec::<String>::new(), ["/home/*/.ssh"]).unwrap();
        assert!(policy.is_sensitive(&p("/home/alice/.ssh")));
        assert!(policy.is_sensitive(&p("/home/a/b/.ssh")));
        assert!(!policy.is_sensitive(&p("/home/alice/.ssh/id_rsa")));
        assert!(!policy.is_sensitive(&p("/srv/alice/.ssh")));
    }

    #[test]
    fn test_rejects_multiple_wildcards() {
        let result = PathPolicy::new(Vec::<String>::new(), ["/a/*/b/*"]);
        assert!(matches!(result, Err(PathError::InvalidPattern(_))));

        let result = PathPolicy::new(Vec::<String>::new(), ["*/x"]);
        assert!(matches!(result, Err(PathError::InvalidPattern(_))));
    }

    #[test]
    fn test_default_policy_protects_root() {
        let policy = PathPolicy::default();
        assert!(policy.is_non_deletable(&NormalizedPath::root()));
        assert!(policy.is_sensitive(&p("/etc/shadow")));
        assert!(!policy.is_sensitive(&p("/srv/share/report.pdf")));
    }
}
