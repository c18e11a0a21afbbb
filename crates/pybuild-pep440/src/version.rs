use std::cmp::{Ordering, max};
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::iter;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// The regex from <https://peps.python.org/pep-0440/#appendix-b-parsing-version-strings-with-regular-expressions>,
/// extended with a trailing `.*` for wildcard specifiers.
const VERSION_RE_INNER: &str = r"
(?:
    (?:v?)                                            # <https://peps.python.org/pep-0440/#preceding-v-character>
    (?:(?P<epoch>[0-9]+)!)?                           # epoch
    (?P<release>[0-9]+(?:\.[0-9]+)*)                  # release segment
    (?P<pre_field>                                    # pre-release
        [-_\.]?
        (?P<pre_name>(alpha|a|beta|b|preview|pre|c|rc))
        [-_\.]?
        (?P<pre>[0-9]+)?
    )?
    (?P<post_field>                                   # post release
        (?:-(?P<post_old>[0-9]+))
        |
        (?:
            [-_\.]?
            (?P<post_l>post|rev|r)
            [-_\.]?
            (?P<post_new>[0-9]+)?
        )
    )?
    (?P<dev_field>                                    # dev release
        [-_\.]?
        (?P<dev_l>dev)
        [-_\.]?
        (?P<dev>[0-9]+)?
    )?
)
(?:\+(?P<local>[a-z0-9]+(?:[-_\.][a-z0-9]+)*))?       # local version
(?P<trailing_dot_star>\.\*)?                          # wildcard for `== 1.2.*`
";

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?xi)^(?:\s*){VERSION_RE_INNER}(?:\s*)$")).unwrap()
});

/// One of `~=` `==` `!=` `<=` `>=` `<` `>` `===`
#[derive(Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub enum Operator {
    /// `== 1.2.3`
    Equal,
    /// `== 1.2.*`
    EqualStar,
    /// `===` (discouraged)
    ///
    /// <https://peps.python.org/pep-0440/#arbitrary-equality>
    ExactEqual,
    /// `!= 1.2.3`
    NotEqual,
    /// `!= 1.2.*`
    NotEqualStar,
    /// `~=`
    TildeEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEqual,
}

impl Operator {
    /// Returns the wildcard variant of this operator, if there is one.
    pub(crate) fn to_star(self) -> Option<Self> {
        match self {
            Self::Equal => Some(Self::EqualStar),
            Self::NotEqual => Some(Self::NotEqualStar),
            _ => None,
        }
    }

    /// Whether a version with a local segment may be used with this operator.
    ///
    /// "Except where specifically noted below, local version identifiers MUST NOT be permitted
    /// in version specifiers"
    pub(crate) fn is_local_compatible(self) -> bool {
        matches!(self, Self::Equal | Self::NotEqual | Self::ExactEqual)
    }
}

impl FromStr for Operator {
    type Err = OperatorParseError;

    /// Does not know about wildcards, those are resolved by the specifier.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let operator = match s {
            "==" => Self::Equal,
            "===" => {
                tracing::warn!("Using arbitrary equality (`===`) is discouraged");
                Self::ExactEqual
            }
            "!=" => Self::NotEqual,
            "~=" => Self::TildeEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessThanEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterThanEqual,
            other => {
                return Err(OperatorParseError {
                    got: other.to_string(),
                });
            }
        };
        Ok(operator)
    }
}

impl Display for Operator {
    /// Note that the wildcard operators print without their star.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let operator = match self {
            Self::Equal | Self::EqualStar => "==",
            Self::ExactEqual => "===",
            Self::NotEqual | Self::NotEqualStar => "!=",
            Self::TildeEqual => "~=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
        };
        f.write_str(operator)
    }
}

/// An error that occurs when parsing an invalid version specifier operator.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("no such comparison operator {got:?}, must be one of ~= == != <= >= < > ===")]
pub struct OperatorParseError {
    got: String,
}

/// Optional pre-release modifier (alpha, beta or release candidate) appended to a version.
///
/// <https://peps.python.org/pep-0440/#pre-releases>
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy, Ord, PartialOrd)]
pub enum PrereleaseKind {
    /// alpha pre-release
    Alpha,
    /// beta pre-release
    Beta,
    /// release candidate
    Rc,
}

impl PrereleaseKind {
    fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "a" | "alpha" => Some(Self::Alpha),
            "b" | "beta" => Some(Self::Beta),
            "c" | "rc" | "pre" | "preview" => Some(Self::Rc),
            _ => None,
        }
    }
}

impl Display for PrereleaseKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alpha => f.write_str("a"),
            Self::Beta => f.write_str("b"),
            Self::Rc => f.write_str("rc"),
        }
    }
}

/// A part of the [local version identifier](<https://peps.python.org/pep-0440/#local-version-identifiers>).
///
/// Numeric segments compare as integers and sort above alphanumeric ones, which compare
/// case-insensitively. With that segment ordering, the derived ordering of a
/// `Vec<LocalSegment>` matches PEP 440.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum LocalSegment {
    /// Segment that is not parseable as an integer
    String(String),
    /// Integer segment
    Number(u64),
}

impl Display for LocalSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(string) => write!(f, "{string}"),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(n1), Self::Number(n2)) => n1.cmp(n2),
            (Self::String(s1), Self::String(s2)) => s1.cmp(s2),
            (Self::Number(_), Self::String(_)) => Ordering::Greater,
            (Self::String(_), Self::Number(_)) => Ordering::Less,
        }
    }
}

/// A version number such as `1.2.3` or `4!5.6.7-a8.post9.dev0`.
///
/// Beware that the ordering implemented with [`Ord`] is not the same as matching with a
/// [`crate::VersionSpecifier`]: `1.0+local > 1.0` holds, but `<=1.0` matches `1.0+local`.
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PrereleaseKind, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

impl Version {
    /// Create a final release version such as `3.8` from its release segments.
    pub fn new(release: impl IntoIterator<Item = u64>) -> Self {
        Self {
            epoch: 0,
            release: release.into_iter().collect(),
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    /// The [versioning epoch](https://peps.python.org/pep-0440/#version-epochs).
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The release segments, such as `[1, 2, 3]` in `4!1.2.3-a8.post9.dev1`.
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    /// The [pre-release](https://peps.python.org/pep-0440/#pre-releases) kind and number.
    pub fn pre(&self) -> Option<(PrereleaseKind, u64)> {
        self.pre
    }

    /// The [post-release](https://peps.python.org/pep-0440/#post-releases) number.
    pub fn post(&self) -> Option<u64> {
        self.post
    }

    /// The [development release](https://peps.python.org/pep-0440/#developmental-releases) number.
    pub fn dev(&self) -> Option<u64> {
        self.dev
    }

    /// The [local version](https://peps.python.org/pep-0440/#local-version-identifiers) segments.
    pub fn local(&self) -> &[LocalSegment] {
        &self.local
    }

    /// Whether this is an alpha/beta/rc or dev version
    pub fn any_prerelease(&self) -> bool {
        self.is_pre() || self.is_dev()
    }

    /// Whether this is an alpha/beta/rc version
    pub fn is_pre(&self) -> bool {
        self.pre.is_some()
    }

    /// Whether this is a dev version
    pub fn is_dev(&self) -> bool {
        self.dev.is_some()
    }

    /// Whether this is a post version
    pub fn is_post(&self) -> bool {
        self.post.is_some()
    }

    /// Whether this is a local version (e.g. `1.2.3+ubuntu1`)
    pub fn is_local(&self) -> bool {
        !self.local.is_empty()
    }

    /// "local version labels MUST be ignored entirely when checking if candidate versions match
    /// a given version specifier"
    pub(crate) fn without_local(&self) -> Self {
        Self {
            local: Vec::new(),
            ..self.clone()
        }
    }

    /// Like [`Version::from_str`], but also accepts a trailing `.*` and reports whether it was
    /// present. Used for parsing specifiers.
    ///
    ///  * `1.2.3` -> false
    ///  * `1.2.3.*` -> true
    ///  * `1.2.*.4` -> err
    ///  * `1.0-dev1.*` -> err
    pub(crate) fn from_str_star(version: &str) -> Result<(Self, bool), VersionParseError> {
        let captures = VERSION_RE
            .captures(version)
            .ok_or_else(|| VersionParseError::NoMatch(version.to_string()))?;
        Self::from_captures(&captures)
    }

    fn from_captures(captures: &Captures) -> Result<(Self, bool), VersionParseError> {
        let number = |field: &str| -> Result<Option<u64>, VersionParseError> {
            captures
                .name(field)
                .map(|digits| {
                    digits
                        .as_str()
                        .parse::<u64>()
                        .map_err(|_| VersionParseError::NumberTooBig(digits.as_str().to_string()))
                })
                .transpose()
        };

        // "If no explicit epoch is given, the implicit epoch is 0"
        let epoch = number("epoch")?.unwrap_or_default();
        let release = captures
            .name("release")
            .map(|release| release.as_str())
            .unwrap_or_default()
            .split('.')
            .map(|segment| {
                segment
                    .parse::<u64>()
                    .map_err(|_| VersionParseError::NumberTooBig(segment.to_string()))
            })
            .collect::<Result<Vec<u64>, _>>()?;
        let pre = captures
            .name("pre_name")
            .and_then(|label| PrereleaseKind::from_label(label.as_str()))
            .map(|kind| -> Result<_, VersionParseError> {
                // <https://peps.python.org/pep-0440/#implicit-pre-release-number>
                Ok((kind, number("pre")?.unwrap_or_default()))
            })
            .transpose()?;
        let post = if captures.name("post_field").is_some() {
            // `1.0.post` is `1.0.post0`, as in pypa/packaging.
            Some(
                number("post_new")?
                    .or(number("post_old")?)
                    .unwrap_or_default(),
            )
        } else {
            None
        };
        let dev = if captures.name("dev_field").is_some() {
            // <https://peps.python.org/pep-0440/#implicit-development-release-number>
            Some(number("dev")?.unwrap_or_default())
        } else {
            None
        };
        let local = captures
            .name("local")
            .map(|local| {
                local
                    .as_str()
                    .split(['-', '_', '.'])
                    .map(|segment| match segment.parse::<u64>() {
                        Ok(number) => LocalSegment::Number(number),
                        Err(_) => LocalSegment::String(segment.to_lowercase()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let star = captures.name("trailing_dot_star").is_some();
        let version = Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        };
        if star && (version.any_prerelease() || version.is_post() || version.is_local()) {
            return Err(VersionParseError::WildcardSuffix(version.to_string()));
        }
        Ok((version, star))
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    /// Parses a version such as `1.19`, `1.0a1`, `1.0+abc.5` or `1!2012.2`.
    ///
    /// A trailing `.*` is rejected; wildcards are only valid inside specifiers.
    fn from_str(version: &str) -> Result<Self, Self::Err> {
        let (parsed, star) = Self::from_str_star(version)?;
        if star {
            return Err(VersionParseError::UnexpectedWildcard(version.to_string()));
        }
        Ok(parsed)
    }
}

/// An error that occurs when parsing a [`Version`].
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum VersionParseError {
    /// The string does not follow the PEP 440 grammar.
    #[error("Version `{0}` doesn't match PEP 440 rules")]
    NoMatch(String),
    /// A numeric component does not fit into 64 bits.
    #[error("Version segment `{0}` is too large")]
    NumberTooBig(String),
    /// A wildcard was given where a concrete version is required.
    #[error("A wildcard (`*`) is not allowed in the version `{0}`")]
    UnexpectedWildcard(String),
    /// A wildcard was combined with a pre, post, dev or local suffix.
    #[error("A wildcard (`.*`) can't be combined with the suffixes of `{0}`")]
    WildcardSuffix(String),
}

/// Shows the normalized version
impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let mut release = self.release.iter();
        if let Some(first) = release.next() {
            write!(f, "{first}")?;
        }
        for segment in release {
            write!(f, ".{segment}")?;
        }
        if let Some((kind, number)) = self.pre {
            write!(f, "{kind}{number}")?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{dev}")?;
        }
        let mut local = self.local.iter();
        if let Some(first) = local.next() {
            write!(f, "+{first}")?;
            for segment in local {
                write!(f, ".{segment}")?;
            }
        }
        Ok(())
    }
}

/// Compare the release parts of two versions, e.g. `4.3.1` > `4.2`, `1.1.0` == `1.1` and
/// `1.16` < `1.19`
pub(crate) fn compare_release(this: &[u64], other: &[u64]) -> Ordering {
    // "When comparing release segments with different numbers of components, the shorter segment
    // is padded out with additional zeros as necessary"
    let len = max(this.len(), other.len());
    this.iter()
        .chain(iter::repeat(&0))
        .zip(other.iter().chain(iter::repeat(&0)))
        .take(len)
        .map(|(this, other)| this.cmp(other))
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Compare the parts attached after the release, given equal release.
///
/// According to <https://peps.python.org/pep-0440/#summary-of-permitted-suffixes-and-relative-ordering>
/// the order is `.devN, aN, bN, rcN, <no suffix (final)>, .postN`, and pre-releases may carry
/// their own post and dev parts:
/// `({dev: 0, a: 1, b: 2, rc: 3, (): 4, post: 5}, <preN>, <postN or None>, <devN or MAX>, <local>)`
///
/// For post, any number is better than none, but for dev, no number is better, hence the
/// `u64::MAX` default.
fn sortable_tuple(version: &Version) -> (u64, u64, Option<u64>, u64, &[LocalSegment]) {
    let dev = version.dev.unwrap_or(u64::MAX);
    let local = version.local.as_slice();
    match (version.pre, version.post, version.dev) {
        (None, None, Some(n)) => (0, 0, None, n, local),
        (Some((PrereleaseKind::Alpha, n)), post, _) => (1, n, post, dev, local),
        (Some((PrereleaseKind::Beta, n)), post, _) => (2, n, post, dev, local),
        (Some((PrereleaseKind::Rc, n)), post, _) => (3, n, post, dev, local),
        (None, None, None) => (4, 0, None, 0, local),
        (None, Some(post), _) => (5, 0, Some(post), dev, local),
    }
}

impl PartialEq<Self> for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    /// Skips trailing zeros, since `1.0 == 1.0.0`.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        let significant = self
            .release
            .iter()
            .rposition(|segment| *segment != 0)
            .map_or(0, |position| position + 1);
        self.release[..significant].hash(state);
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
        self.local.hash(state);
    }
}

impl PartialOrd<Self> for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    /// 1.0.dev456 < 1.0a1 < 1.0a2.dev456 < 1.0a12.dev456 < 1.0a12 < 1.0b1.dev456 < 1.0b2
    /// < 1.0b2.post345.dev456 < 1.0b2.post345 < 1.0b2-346 < 1.0c1.dev456 < 1.0c1 < 1.0rc2 < 1.0c3
    /// < 1.0 < 1.0.post456.dev34 < 1.0.post456
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_release(&self.release, &other.release))
            .then_with(|| sortable_tuple(self).cmp(&sortable_tuple(other)))
    }
}
