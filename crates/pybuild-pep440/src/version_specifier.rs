use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::str::FromStr;

use crate::version::compare_release;
use crate::{Operator, OperatorParseError, Version, VersionParseError};

/// A list of version specifiers such as `>=2.1,<3`, all of which must match.
///
/// ```rust
/// # use std::str::FromStr;
/// # use pybuild_pep440::{Operator, Version, VersionSpecifiers};
/// let version = Version::from_str("1.19").unwrap();
/// let specifiers = VersionSpecifiers::from_str(">=1.16, <2.0").unwrap();
/// assert!(specifiers.contains(&version));
/// assert_eq!(specifiers.iter().position(|specifier| *specifier.operator() == Operator::LessThan), Some(1));
/// ```
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct VersionSpecifiers(Vec<VersionSpecifier>);

impl VersionSpecifiers {
    /// Whether all specifiers match the given version, using plain PEP 440 range semantics.
    pub fn contains(&self, version: &Version) -> bool {
        self.iter().all(|specifier| specifier.contains(version))
    }

    /// Like [`VersionSpecifiers::contains`], but excludes pre-releases unless they are asked for.
    ///
    /// "Pre-releases of any kind, including developmental releases, are implicitly excluded from
    /// all version specifiers, unless [...] explicitly requested by the user". A pre-release
    /// counts as requested when one of the specifiers names a pre-release version or requests an
    /// exact match. An empty list places no constraint at all, so it matches every version.
    pub fn matches(&self, version: &Version) -> bool {
        if self.is_empty() {
            return true;
        }
        if version.any_prerelease() && !self.allows_prereleases() {
            return false;
        }
        self.contains(version)
    }

    /// Whether any of the specifiers opts into pre-release versions.
    pub fn allows_prereleases(&self) -> bool {
        self.iter().any(|specifier| {
            specifier.any_prerelease()
                || matches!(specifier.operator, Operator::Equal | Operator::ExactEqual)
        })
    }
}

impl Deref for VersionSpecifiers {
    type Target = [VersionSpecifier];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<VersionSpecifier> for VersionSpecifiers {
    fn from_iter<T: IntoIterator<Item = VersionSpecifier>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<VersionSpecifier> for VersionSpecifiers {
    fn from(specifier: VersionSpecifier) -> Self {
        Self(vec![specifier])
    }
}

impl FromStr for VersionSpecifiers {
    type Err = VersionSpecifiersParseError;

    /// Parse a list of specifiers such as `>= 1.0, != 1.3.*, < 2.0`.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut specifiers = Vec::new();
        if spec.trim().is_empty() {
            return Ok(Self(specifiers));
        }
        let mut start = 0;
        for part in spec.split(',') {
            let specifier =
                VersionSpecifier::from_str(part).map_err(|err| VersionSpecifiersParseError {
                    inner: Box::new(VersionSpecifiersParseErrorInner {
                        err,
                        line: spec.to_string(),
                        start,
                        end: start + part.len(),
                    }),
                })?;
            specifiers.push(specifier);
            start += part.len() + ','.len_utf8();
        }
        Ok(Self(specifiers))
    }
}

impl Display for VersionSpecifiers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (idx, specifier) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{specifier}")?;
        }
        Ok(())
    }
}

/// Error with span information (unicode width) inside the parsed line.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct VersionSpecifiersParseError {
    // Boxed to keep `Result<VersionSpecifiers, _>` small.
    inner: Box<VersionSpecifiersParseErrorInner>,
}

#[derive(Debug, Eq, PartialEq, Clone)]
struct VersionSpecifiersParseErrorInner {
    /// The underlying error that occurred.
    err: VersionSpecifierParseError,
    /// The string that failed to parse
    line: String,
    /// The byte offset where the failing specifier starts.
    start: usize,
    /// The byte offset where the failing specifier ends.
    end: usize,
}

impl VersionSpecifiersParseError {
    /// The string that failed to parse
    pub fn line(&self) -> &str {
        &self.inner.line
    }

    /// The message of the failing specifier, without the location report.
    pub fn message(&self) -> String {
        self.inner.err.to_string()
    }
}

impl Display for VersionSpecifiersParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use unicode_width::UnicodeWidthStr;

        let VersionSpecifiersParseErrorInner {
            ref err,
            ref line,
            start,
            end,
        } = *self.inner;
        writeln!(f, "Failed to parse version: {err}:")?;
        writeln!(f, "{line}")?;
        let indent = line[..start].width();
        let point = line[start..end].width();
        write!(f, "{}{}", " ".repeat(indent), "^".repeat(point))
    }
}

impl std::error::Error for VersionSpecifiersParseError {}

/// A version range such as `>1.2.3`, `<=4!5.6.7-a8.post9.dev0` or `== 4.1.*`.
///
/// ```rust
/// use std::str::FromStr;
/// use pybuild_pep440::{Version, VersionSpecifier};
///
/// let version = Version::from_str("1.19").unwrap();
/// let version_specifier = VersionSpecifier::from_str("== 1.*").unwrap();
/// assert!(version_specifier.contains(&version));
/// ```
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct VersionSpecifier {
    operator: Operator,
    version: Version,
}

impl VersionSpecifier {
    /// Build a specifier from an operator and a version, validating the combination.
    ///
    /// `star` marks a trailing `.*`, to differentiate between `== 1.1.*` and `== 1.1`.
    pub fn from_parts(
        operator: Operator,
        version: Version,
        star: bool,
    ) -> Result<Self, VersionSpecifierParseError> {
        let operator = if star {
            operator
                .to_star()
                .ok_or(ParseErrorKind::OperatorWithStar(operator))?
        } else {
            operator
        };

        if version.is_local() && !operator.is_local_compatible() {
            return Err(ParseErrorKind::OperatorLocalCombo(operator, version).into());
        }

        if operator == Operator::TildeEqual && version.release().len() < 2 {
            return Err(ParseErrorKind::CompatibleRelease.into());
        }

        Ok(Self { operator, version })
    }

    /// Get the operator, e.g. `>=` in `>= 2.0.0`
    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    /// Get the version, e.g. `2.0.0` in `>= 2.0.0`
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Whether the specifier version is a pre-release.
    pub fn any_prerelease(&self) -> bool {
        self.version.any_prerelease()
    }

    /// Whether the given version satisfies this specifier, ignoring the pre-release policy of
    /// [`VersionSpecifiers::matches`].
    ///
    /// See:
    /// - <https://peps.python.org/pep-0440/#version-specifiers>
    /// - <https://github.com/pypa/packaging/blob/e184feef1a28a5c574ec41f5c263a3a573861f5a/packaging/specifiers.py#L362-L496>
    pub fn contains(&self, version: &Version) -> bool {
        // "local version labels MUST be ignored entirely when checking if candidate versions
        // match a given version specifier", unless the specifier itself has one.
        let this = &self.version;
        let other = if this.is_local() {
            version.clone()
        } else {
            version.without_local()
        };

        match self.operator {
            Operator::Equal => other == *this,
            Operator::EqualStar => {
                this.epoch() == other.epoch()
                    && this
                        .release()
                        .iter()
                        .zip(other.release().iter().chain(std::iter::repeat(&0)))
                        .all(|(this, other)| this == other)
            }
            Operator::ExactEqual => this.to_string() == version.to_string(),
            Operator::NotEqual => other != *this,
            Operator::NotEqualStar => {
                this.epoch() != other.epoch()
                    || !this
                        .release()
                        .iter()
                        .zip(other.release().iter().chain(std::iter::repeat(&0)))
                        .all(|(this, other)| this == other)
            }
            Operator::TildeEqual => {
                // "For a given release identifier V.N, the compatible release clause is
                // approximately equivalent to the pair of comparison clauses: `>= V.N, == V.*`"
                if this.epoch() != other.epoch() {
                    return false;
                }
                let prefix = &this.release()[..this.release().len() - 1];
                if !prefix
                    .iter()
                    .zip(other.release().iter().chain(std::iter::repeat(&0)))
                    .all(|(this, other)| this == other)
                {
                    return false;
                }
                other >= *this
            }
            Operator::GreaterThan => Self::greater_than(this, &other),
            Operator::GreaterThanEqual => other >= *this,
            Operator::LessThan => Self::less_than(this, &other),
            Operator::LessThanEqual => other <= *this,
        }
    }

    fn less_than(this: &Version, other: &Version) -> bool {
        if other.epoch() < this.epoch() {
            return true;
        }

        // `<3.1` should not match `3.1.dev0`, but should match `3.0.dev0`, unless the specifier
        // itself is a pre-release.
        if !this.any_prerelease()
            && other.any_prerelease()
            && compare_release(this.release(), other.release()) == Ordering::Equal
        {
            return false;
        }

        other < this
    }

    fn greater_than(this: &Version, other: &Version) -> bool {
        if other.epoch() > this.epoch() {
            return true;
        }

        if compare_release(this.release(), other.release()) == Ordering::Equal {
            // `>3.1` should not match `3.1.post0`, unless the specifier itself is a
            // post-release.
            if !this.is_post() && other.is_post() {
                return false;
            }

            if other.is_local() {
                return false;
            }
        }

        other > this
    }
}

impl FromStr for VersionSpecifier {
    type Err = VersionSpecifierParseError;

    /// Parses a specifier such as `>= 1.19`, `== 1.1.*`, `~=1.0` or `<=1!2012.2`.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut s = unscanny::Scanner::new(spec);
        s.eat_while(char::is_whitespace);
        // The operator, without knowing yet whether the version has a star.
        let operator = s.eat_while(['=', '!', '~', '<', '>']);
        if operator.is_empty() {
            return Err(ParseErrorKind::MissingOperator.into());
        }
        let operator = Operator::from_str(operator).map_err(ParseErrorKind::InvalidOperator)?;
        s.eat_while(char::is_whitespace);
        let version = s.eat_while(|c: char| !c.is_whitespace());
        if version.is_empty() {
            return Err(ParseErrorKind::MissingVersion.into());
        }
        let (version, star) =
            Version::from_str_star(version).map_err(ParseErrorKind::InvalidVersion)?;
        let specifier = Self::from_parts(operator, version, star)?;
        s.eat_while(char::is_whitespace);
        if !s.done() {
            return Err(ParseErrorKind::InvalidTrailing(s.after().to_string()).into());
        }
        Ok(specifier)
    }
}

impl Display for VersionSpecifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if matches!(self.operator, Operator::EqualStar | Operator::NotEqualStar) {
            return write!(f, "{}{}.*", self.operator, self.version);
        }
        write!(f, "{}{}", self.operator, self.version)
    }
}

/// An error that can occur when parsing or constructing a single version specifier.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error(transparent)]
pub struct VersionSpecifierParseError {
    // Boxed to keep `Result<VersionSpecifier, _>` small.
    kind: Box<ParseErrorKind>,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
enum ParseErrorKind {
    #[error(transparent)]
    InvalidOperator(OperatorParseError),
    #[error(transparent)]
    InvalidVersion(VersionParseError),
    #[error("Operator {0} cannot be used with a wildcard version specifier")]
    OperatorWithStar(Operator),
    #[error("Operator {0} is incompatible with versions containing non-empty local segments (`{1}`)")]
    OperatorLocalCombo(Operator, Version),
    #[error("The ~= operator requires at least two segments in the release version")]
    CompatibleRelease,
    #[error("Unexpected end of version specifier, expected operator")]
    MissingOperator,
    #[error("Unexpected end of version specifier, expected version")]
    MissingVersion,
    #[error("Trailing `{0}` is not allowed")]
    InvalidTrailing(String),
}

impl From<ParseErrorKind> for VersionSpecifierParseError {
    fn from(kind: ParseErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
        }
    }
}
