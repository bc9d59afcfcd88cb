//! PEP 440 version specifiers
//!
//! A [`SpecifierSet`] is a comma-separated conjunction such as
//! `>=3.11,<4`. Each clause keeps the text it was written with so that
//! requirement strings can be reproduced exactly.

use super::version::Version;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a single specifier clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Compatible,
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
    Less,
    Greater,
    Arbitrary,
}

impl Operator {
    /// Operators ordered so that longer spellings are matched first
    const ALL: [(&'static str, Operator); 8] = [
        ("===", Operator::Arbitrary),
        ("~=", Operator::Compatible),
        ("==", Operator::Equal),
        ("!=", Operator::NotEqual),
        ("<=", Operator::LessEqual),
        (">=", Operator::GreaterEqual),
        ("<", Operator::Less),
        (">", Operator::Greater),
    ];

    pub fn as_str(&self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(_, op)| op == self)
            .map_or("", |(s, _)| s)
    }

    fn split(text: &str) -> Option<(Self, &str)> {
        Self::ALL
            .iter()
            .find_map(|(s, op)| text.strip_prefix(s).map(|rest| (*op, rest)))
    }
}

/// Why a specifier failed to parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSpecifier {
    pub specifier: String,
    pub reason: String,
}

impl InvalidSpecifier {
    fn new(specifier: &str, reason: impl Into<String>) -> Self {
        Self {
            specifier: specifier.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for InvalidSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid specifier '{}': {}", self.specifier, self.reason)
    }
}

impl std::error::Error for InvalidSpecifier {}

/// A single clause such as `~=3.11` or `==1.4.*`
#[derive(Debug, Clone)]
pub struct Specifier {
    operator: Operator,
    /// Version text as written (without the operator)
    text: String,
    /// Parsed version, `None` only for `===`
    version: Option<Version>,
    /// Trailing `.*`
    wildcard: bool,
}

impl Specifier {
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Whether this clause explicitly admits pre-releases
    pub fn allows_prereleases(&self) -> bool {
        matches!(
            self.operator,
            Operator::Equal
                | Operator::GreaterEqual
                | Operator::LessEqual
                | Operator::Compatible
                | Operator::Arbitrary
        ) && self.version.as_ref().is_some_and(Version::is_prerelease)
    }

    /// Whether `candidate` satisfies this clause
    pub fn contains(&self, candidate: &Version) -> bool {
        let Some(ref spec) = self.version else {
            return candidate.to_string().eq_ignore_ascii_case(&self.text);
        };

        match self.operator {
            Operator::Compatible => {
                let prefix = &spec.release[..spec.release.len() - 1];
                candidate.public() >= *spec && release_starts_with(candidate, spec.epoch, prefix)
            }
            Operator::Equal => self.matches_equal(spec, candidate),
            Operator::NotEqual => !self.matches_equal(spec, candidate),
            Operator::LessEqual => candidate.public() <= *spec,
            Operator::GreaterEqual => candidate.public() >= *spec,
            Operator::Less => {
                let candidate = candidate.public();
                candidate < *spec
                    && !(!spec.is_prerelease()
                        && candidate.is_prerelease()
                        && candidate.base() == spec.base())
            }
            Operator::Greater => {
                candidate.public() > *spec
                    && !(!spec.is_postrelease()
                        && candidate.is_postrelease()
                        && candidate.base() == spec.base())
                    && !(candidate.local.is_some() && candidate.base() == spec.base())
            }
            Operator::Arbitrary => false,
        }
    }

    fn matches_equal(&self, spec: &Version, candidate: &Version) -> bool {
        if self.wildcard {
            return release_starts_with(candidate, spec.epoch, &spec.release);
        }
        if spec.local.is_some() {
            candidate == spec
        } else {
            candidate.public() == *spec
        }
    }
}

/// Compare `candidate`'s release (zero padded) against a prefix
fn release_starts_with(candidate: &Version, epoch: u64, prefix: &[u64]) -> bool {
    candidate.epoch == epoch
        && prefix
            .iter()
            .enumerate()
            .all(|(i, n)| candidate.release.get(i).copied().unwrap_or(0) == *n)
}

impl FromStr for Specifier {
    type Err = InvalidSpecifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (operator, rest) =
            Operator::split(trimmed).ok_or_else(|| InvalidSpecifier::new(s, "missing operator"))?;
        let text = rest.trim();

        if text.is_empty() {
            return Err(InvalidSpecifier::new(s, "missing version"));
        }
        if text.chars().any(char::is_whitespace) {
            return Err(InvalidSpecifier::new(s, "version contains whitespace"));
        }

        if operator == Operator::Arbitrary {
            return Ok(Self {
                operator,
                text: text.to_string(),
                version: None,
                wildcard: false,
            });
        }

        let (version_text, wildcard) = match text.strip_suffix(".*") {
            Some(prefix) => (prefix, true),
            None => (text, false),
        };
        let version: Version = version_text
            .parse()
            .map_err(|e: super::version::InvalidVersion| InvalidSpecifier::new(s, e.to_string()))?;

        let allows_wildcard = matches!(operator, Operator::Equal | Operator::NotEqual);
        if wildcard {
            if !allows_wildcard {
                return Err(InvalidSpecifier::new(s, "wildcard only allowed with == and !="));
            }
            if version.pre.is_some()
                || version.post.is_some()
                || version.dev.is_some()
                || version.local.is_some()
            {
                return Err(InvalidSpecifier::new(s, "wildcard must follow a release"));
            }
        }
        if version.local.is_some() && !allows_wildcard {
            return Err(InvalidSpecifier::new(s, "local versions only allowed with == and !="));
        }
        if operator == Operator::Compatible && version.release.len() < 2 {
            return Err(InvalidSpecifier::new(s, "~= needs at least two release segments"));
        }

        Ok(Self {
            operator,
            text: text.to_string(),
            version: Some(version),
            wildcard,
        })
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator.as_str(), self.text)
    }
}

/// A conjunction of specifiers; empty means "any version"
#[derive(Debug, Clone, Default)]
pub struct SpecifierSet {
    specifiers: Vec<Specifier>,
}

impl SpecifierSet {
    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Specifier> {
        self.specifiers.iter()
    }

    /// Whether `candidate` satisfies every clause
    ///
    /// Pre-release candidates are rejected unless some clause names a
    /// pre-release itself.
    pub fn contains(&self, candidate: &Version) -> bool {
        if candidate.is_prerelease() && !self.specifiers.iter().any(Specifier::allows_prereleases) {
            return false;
        }
        self.specifiers.iter().all(|s| s.contains(candidate))
    }
}

impl FromStr for SpecifierSet {
    type Err = InvalidSpecifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let specifiers = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Specifier>, _>>()?;
        Ok(Self { specifiers })
    }
}

impl fmt::Display for SpecifierSet {
    /// Clauses deduplicated, sorted by text and joined with `,`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clauses: BTreeSet<String> = self.specifiers.iter().map(Specifier::to_string).collect();
        let clauses: Vec<String> = clauses.into_iter().collect();
        write!(f, "{}", clauses.join(","))
    }
}
