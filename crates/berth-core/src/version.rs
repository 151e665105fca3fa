//! Semantic version parsing and ordering.
//!
//! Release ordering compares `major.minor.patch` numerically. What happens
//! to a pre-release suffix is a [`PrereleasePolicy`]: by default it is
//! ignored, so `1.0.0-beta` and `1.0.0` order as equal. Build metadata
//! (`+...`) never affects ordering.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+)\.(\d+)\.(\d+)(?:-([0-9A-Za-z.-]+))?(?:\+([0-9A-Za-z.-]+))?$")
            .expect("version pattern compiles")
    })
}

/// How pre-release suffixes take part in ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrereleasePolicy {
    /// Only `major.minor.patch` is compared.
    #[default]
    Ignore,
    /// SemVer 2.0 precedence: `1.0.0-alpha < 1.0.0-alpha.1 < 1.0.0-beta < 1.0.0`.
    SemverPrecedence,
}

impl FromStr for PrereleasePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(PrereleasePolicy::Ignore),
            "semver" | "semver-precedence" => Ok(PrereleasePolicy::SemverPrecedence),
            other => Err(format!(
                "unknown prerelease policy '{other}' (expected 'ignore' or 'semver')"
            )),
        }
    }
}

impl fmt::Display for PrereleasePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrereleasePolicy::Ignore => f.write_str("ignore"),
            PrereleasePolicy::SemverPrecedence => f.write_str("semver"),
        }
    }
}

/// A parsed `major.minor.patch[-pre][+build]` version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
    pub build: Option<String>,
}

/// Error returned for strings that are not `major.minor.patch[-pre][+build]`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version '{0}': expected major.minor.patch")]
pub struct InvalidVersion(pub String);

impl FromStr for Version {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = version_pattern()
            .captures(s)
            .ok_or_else(|| InvalidVersion(s.to_string()))?;
        let number = |i: usize| {
            caps[i]
                .parse::<u64>()
                .map_err(|_| InvalidVersion(s.to_string()))
        };
        Ok(Version {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
            pre: caps.get(4).map(|m| m.as_str().to_string()),
            build: caps.get(5).map(|m| m.as_str().to_string()),
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

impl Version {
    /// Compare under the given pre-release policy.
    pub fn cmp_with(&self, other: &Version, policy: PrereleasePolicy) -> Ordering {
        let core = (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch));
        if core != Ordering::Equal || policy == PrereleasePolicy::Ignore {
            return core;
        }
        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => cmp_prerelease(a, b),
        }
    }
}

fn cmp_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(m), Ok(n)) => m.cmp(&n),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Whether `s` is an acceptable release version.
pub fn is_valid_version(s: &str) -> bool {
    s.parse::<Version>().is_ok()
}

/// Compare two version strings, returning `-1`, `0` or `1`.
pub fn compare_versions(a: &str, b: &str, policy: PrereleasePolicy) -> Result<i32, InvalidVersion> {
    let a: Version = a.parse()?;
    let b: Version = b.parse()?;
    Ok(match a.cmp_with(&b, policy) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    })
}

/// Total ordering over stored version strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionComparator {
    policy: PrereleasePolicy,
}

impl VersionComparator {
    pub fn new(policy: PrereleasePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PrereleasePolicy {
        self.policy
    }

    /// Precedence order. Unparsable strings sort below every valid version
    /// and lexically among themselves.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match (a.parse::<Version>(), b.parse::<Version>()) {
            (Ok(x), Ok(y)) => x.cmp_with(&y, self.policy),
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Ok(_)) => Ordering::Less,
            (Err(_), Err(_)) => a.cmp(b),
        }
    }

    /// Precedence order with the raw string as tie-break, for stable listings.
    pub fn compare_strict(&self, a: &str, b: &str) -> Ordering {
        self.compare(a, b).then_with(|| a.cmp(b))
    }

    /// [`compare`](Self::compare) as `-1`, `0` or `1`.
    pub fn compare_i32(&self, a: &str, b: &str) -> i32 {
        match self.compare(a, b) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }

    /// Strictly newer under this comparator.
    pub fn is_newer(&self, candidate: &str, than: &str) -> bool {
        self.compare(candidate, than) == Ordering::Greater
    }
}
