//! Version constraint grammar.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use semver::Version;

use crate::error::ToolError;

fn constraint_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(=|>=|<=)?\s*[vV]?(\d+)\.(\d+)\.(\d+)\s*$")
            .unwrap_or_else(|e| panic!("constraint pattern is invalid: {e}"))
    })
}

/// Comparison operator of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ge,
    Le,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ge => ">=",
            Operator::Le => "<=",
        }
    }
}

/// A single operator/version pair, e.g. `>= v1.6.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    pub operator: Operator,
    pub version: Version,
}

impl VersionConstraint {
    pub fn new(operator: Operator, version: Version) -> Self {
        Self { operator, version }
    }

    /// Whether `candidate` satisfies the constraint.
    pub fn matches(&self, candidate: &Version) -> bool {
        match self.operator {
            Operator::Eq => candidate == &self.version,
            Operator::Ge => candidate >= &self.version,
            Operator::Le => candidate <= &self.version,
        }
    }

    /// The satisfying candidate nearest to the constraint's bound.
    ///
    /// `>=` picks the lowest match, `<=` the highest.
    pub fn closest<'a, I>(&self, candidates: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        let matching = candidates.into_iter().filter(|v| self.matches(v));
        match self.operator {
            Operator::Eq | Operator::Ge => matching.min(),
            Operator::Le => matching.max(),
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = constraint_regex()
            .captures(s)
            .ok_or_else(|| ToolError::InvalidConstraint(s.to_string()))?;

        let operator = match caps.get(1).map(|m| m.as_str()) {
            Some(">=") => Operator::Ge,
            Some("<=") => Operator::Le,
            _ => Operator::Eq,
        };
        let part = |i: usize| -> Result<u64, ToolError> {
            caps.get(i)
                .and_then(|m| m.as_str().parse().ok())
                .ok_or_else(|| ToolError::InvalidConstraint(s.to_string()))
        };

        Ok(Self {
            operator,
            version: Version::new(part(2)?, part(3)?, part(4)?),
        })
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operator.as_str(), self.version)
    }
}

/// Parse a release tag such as `v1.7.0`. Pre-releases are ignored.
pub fn parse_version_tag(tag: &str) -> Option<Version> {
    let trimmed = tag.trim().trim_start_matches(['v', 'V']);
    let version = Version::parse(trimmed).ok()?;
    if version.pre.is_empty() {
        Some(version)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_operators() {
        let eq: VersionConstraint = "= 1.7.0".parse().unwrap();
        assert_eq!(eq.operator, Operator::Eq);
        assert_eq!(eq.version, v("1.7.0"));

        let ge: VersionConstraint = ">= v1.9.0".parse().unwrap();
        assert_eq!(ge.operator, Operator::Ge);
        assert_eq!(ge.version, v("1.9.0"));

        let le: VersionConstraint = "<=v1.6.0".parse().unwrap();
        assert_eq!(le.operator, Operator::Le);

        let bare: VersionConstraint = "1.8.2".parse().unwrap();
        assert_eq!(bare.operator, Operator::Eq);
    }

    #[test]
    fn test_rejects_compound_and_malformed() {
        assert!(">= 1.6.0, < 2.0.0".parse::<VersionConstraint>().is_err());
        assert!("~> 1.6".parse::<VersionConstraint>().is_err());
        assert!("> 1.6.0".parse::<VersionConstraint>().is_err());
        assert!("latest".parse::<VersionConstraint>().is_err());
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        let ge: VersionConstraint = ">= 1.9.0".parse().unwrap();
        assert!(ge.matches(&v("1.10.0")));

        let le: VersionConstraint = "<= 1.9.0".parse().unwrap();
        assert!(!le.matches(&v("1.10.0")));
    }

    #[test]
    fn test_closest_selection() {
        let versions = vec![v("1.6.0"), v("1.7.0"), v("1.9.0"), v("1.10.0")];

        let ge: VersionConstraint = ">= 1.8.0".parse().unwrap();
        assert_eq!(ge.closest(&versions), Some(&v("1.9.0")));

        let le: VersionConstraint = "<= 1.8.0".parse().unwrap();
        assert_eq!(le.closest(&versions), Some(&v("1.7.0")));

        let eq: VersionConstraint = "= 1.8.0".parse().unwrap();
        assert_eq!(eq.closest(&versions), None);
    }

    #[test]
    fn test_parse_version_tag() {
        assert_eq!(parse_version_tag("v1.7.0"), Some(v("1.7.0")));
        assert_eq!(parse_version_tag("1.10.2"), Some(v("1.10.2")));
        assert_eq!(parse_version_tag("v1.8.0-alpha20231025"), None);
        assert_eq!(parse_version_tag("nightly"), None);
    }
}
