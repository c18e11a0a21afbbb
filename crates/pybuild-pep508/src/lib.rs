//! Python [dependency specifiers](https://packaging.python.org/en/latest/specifications/dependency-specifiers/),
//! better known as [PEP 508](https://peps.python.org/pep-0508/).
//!
//! ```text
//! requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"
//! ```
//!
//! A [`Requirement`] holds a normalized distribution name, its extras, an optional version
//! specifier or URL and an optional [`MarkerTree`] that is evaluated against a
//! [`MarkerEnvironment`].

#![deny(missing_docs)]

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;
use unicode_width::UnicodeWidthChar;
use url::Url;

pub use marker::{
    MarkerEnvironment, MarkerExpression, MarkerOperator, MarkerTree, MarkerValue,
    MarkerValueString, MarkerValueVersion, StringVersion,
};
use pybuild_normalize::{ExtraName, PackageName};
use pybuild_pep440::{VersionSpecifier, VersionSpecifiers};

use crate::cursor::Cursor;

mod cursor;
mod marker;

/// Error with a span attached. `start` and `len` are byte offsets into `input`.
#[derive(Debug)]
pub struct Pep508Error {
    /// Either we have an error string from our parser or an upstream error from `url`
    pub message: Pep508ErrorSource,
    /// Span start index
    pub start: usize,
    /// Span length
    pub len: usize,
    /// The input string so we can print it underlined
    pub input: String,
}

/// Either we have an error string from our parser or an upstream error from `url`
#[derive(Debug, Error)]
pub enum Pep508ErrorSource {
    /// An error from our parser.
    #[error("{0}")]
    String(String),
    /// A URL parsing error.
    #[error(transparent)]
    UrlError(#[from] url::ParseError),
}

impl Display for Pep508Error {
    /// Pretty formatting with underline.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let start_offset = self.input[..self.start]
            .chars()
            .filter_map(UnicodeWidthChar::width)
            .sum::<usize>();
        let underline_len = if self.start >= self.input.len() {
            // One past the end of the input, e.g. for a missing closing bracket
            1
        } else {
            let end = (self.start + self.len).min(self.input.len());
            self.input[self.start..end]
                .chars()
                .filter_map(UnicodeWidthChar::width)
                .sum::<usize>()
                .max(1)
        };
        write!(
            f,
            "{}\n{}\n{}{}",
            self.message,
            self.input,
            " ".repeat(start_offset),
            "^".repeat(underline_len)
        )
    }
}

impl std::error::Error for Pep508Error {}

/// A PEP 508 dependency specification
#[derive(Hash, Debug, Clone, Eq, PartialEq)]
pub struct Requirement {
    /// The distribution name such as `requests` in
    /// `requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`
    pub name: PackageName,
    /// The list of extras such as `security`, `tests` in
    /// `requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`
    pub extras: Vec<ExtraName>,
    /// The version specifier such as `>= 2.8.1`, `== 2.8.*` in
    /// `requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`
    /// or a url
    pub version_or_url: Option<VersionOrUrl>,
    /// The markers such as `python_version > "3.8"` in
    /// `requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`.
    pub marker: Option<MarkerTree>,
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            write!(
                f,
                "[{}]",
                self.extras
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            )?;
        }
        if let Some(version_or_url) = &self.version_or_url {
            match version_or_url {
                VersionOrUrl::VersionSpecifier(version_specifier) => {
                    write!(f, "{version_specifier}")?;
                }
                VersionOrUrl::Url(url) => {
                    // We add the space for markers later if necessary
                    write!(f, " @ {url}")?;
                }
            }
        }
        if let Some(marker) = &self.marker {
            write!(f, " ; {marker}")?;
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for Requirement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl Requirement {
    /// The version specifiers of this requirement, empty for URL and bare name requirements.
    pub fn specifiers(&self) -> Option<&VersionSpecifiers> {
        match &self.version_or_url {
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => Some(specifiers),
            Some(VersionOrUrl::Url(_)) | None => None,
        }
    }

    /// Returns whether the markers apply for the given environment.
    ///
    /// A requirement without markers always applies.
    pub fn evaluate_markers(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        self.marker
            .as_ref()
            .is_none_or(|marker| marker.evaluate(env, extras))
    }
}

impl FromStr for Requirement {
    type Err = Pep508Error;

    /// Parse a [Dependency Specifier](https://packaging.python.org/en/latest/specifications/dependency-specifiers/)
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse(&mut Cursor::new(input))
    }
}

/// The actual version specifier or url to install
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub enum VersionOrUrl {
    /// A PEP 440 version specifier set
    VersionSpecifier(VersionSpecifiers),
    /// A installable URL
    Url(Url),
}

fn parse_name(cursor: &mut Cursor) -> Result<PackageName, Pep508Error> {
    // https://peps.python.org/pep-0508/#names
    // ^([A-Z0-9]|[A-Z0-9][A-Z0-9._-]*[A-Z0-9])$ with re.IGNORECASE
    let start = cursor.pos();
    match cursor.next() {
        Some((_, 'A'..='Z' | 'a'..='z' | '0'..='9')) => {}
        Some((index, char)) => {
            return Err(Pep508Error {
                message: Pep508ErrorSource::String(format!(
                    "Expected package name starting with an alphanumeric character, found '{char}'"
                )),
                start: index,
                len: char.len_utf8(),
                input: cursor.to_string(),
            });
        }
        None => {
            return Err(Pep508Error {
                message: Pep508ErrorSource::String(
                    "Empty field is not allowed for PEP508".to_string(),
                ),
                start: 0,
                len: 1,
                input: cursor.to_string(),
            });
        }
    }

    let (_, len) = cursor.take_while(|char| matches!(char, 'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '-' | '_'));
    let name = cursor.slice(start, len + 1);
    if let Some(last @ ('.' | '-' | '_')) = name.chars().last() {
        return Err(Pep508Error {
            message: Pep508ErrorSource::String(format!(
                "Package name must end with an alphanumeric character, not '{last}'"
            )),
            start: cursor.pos() - 1,
            len: 1,
            input: cursor.to_string(),
        });
    }
    PackageName::from_str(name).map_err(|err| Pep508Error {
        message: Pep508ErrorSource::String(err.to_string()),
        start,
        len: name.len(),
        input: cursor.to_string(),
    })
}

/// Parses extras in the `[extra1,extra2]` format
fn parse_extras(cursor: &mut Cursor) -> Result<Vec<ExtraName>, Pep508Error> {
    let Some(bracket_pos) = cursor.eat_char('[') else {
        return Ok(vec![]);
    };
    let early_eof_error = |cursor: &Cursor| Pep508Error {
        message: Pep508ErrorSource::String(
            "Missing closing bracket (expected ']', found end of dependency specification)"
                .to_string(),
        ),
        start: bracket_pos,
        len: 1,
        input: cursor.to_string(),
    };

    let mut extras = Vec::new();
    // `[]` is allowed and means no extras
    cursor.eat_whitespace();
    if cursor.eat_char(']').is_some() {
        return Ok(extras);
    }

    loop {
        cursor.eat_whitespace();
        // First char of the identifier
        let start = match cursor.next() {
            Some((pos, 'a'..='z' | 'A'..='Z' | '0'..='9')) => pos,
            Some((pos, other)) => {
                return Err(Pep508Error {
                    message: Pep508ErrorSource::String(format!(
                        "Expected an alphanumeric character starting the extra name, found '{other}'"
                    )),
                    start: pos,
                    len: other.len_utf8(),
                    input: cursor.to_string(),
                });
            }
            None => return Err(early_eof_error(cursor)),
        };
        let (_, len) = cursor
            .take_while(|char| matches!(char, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.'));
        let raw = cursor.slice(start, len + 1);
        let extra = ExtraName::from_str(raw).map_err(|err| Pep508Error {
            message: Pep508ErrorSource::String(err.to_string()),
            start,
            len: raw.len(),
            input: cursor.to_string(),
        })?;
        cursor.eat_whitespace();
        match cursor.next() {
            Some((_, ',')) => extras.push(extra),
            Some((_, ']')) => {
                extras.push(extra);
                break;
            }
            Some((pos, other)) => {
                return Err(Pep508Error {
                    message: Pep508ErrorSource::String(format!(
                        "Expected either ',' (separating extras) or ']' (ending the extras section), found '{other}'"
                    )),
                    start: pos,
                    len: other.len_utf8(),
                    input: cursor.to_string(),
                });
            }
            None => return Err(early_eof_error(cursor)),
        }
    }

    Ok(extras)
}

/// `@ https://...`, up to the next whitespace
fn parse_url(cursor: &mut Cursor) -> Result<Url, Pep508Error> {
    cursor.eat_whitespace();
    let (start, len) = cursor.take_while(|char| !char.is_whitespace());
    let url = cursor.slice(start, len);
    if url.is_empty() {
        return Err(Pep508Error {
            message: Pep508ErrorSource::String("Expected URL".to_string()),
            start,
            len,
            input: cursor.to_string(),
        });
    }
    Url::parse(url).map_err(|err| Pep508Error {
        message: Pep508ErrorSource::UrlError(err),
        start,
        len,
        input: cursor.to_string(),
    })
}

fn parse_specifier(
    cursor: &Cursor,
    buffer: &str,
    start: usize,
    end: usize,
) -> Result<VersionSpecifier, Pep508Error> {
    VersionSpecifier::from_str(buffer).map_err(|err| Pep508Error {
        message: Pep508ErrorSource::String(err.to_string()),
        start,
        len: end - start,
        input: cursor.to_string(),
    })
}

/// Such as `>=1.19,<2.0`, either delimited by the end of the specifier or a `;` for the marker part
///
/// ```text
/// version_one (wsp* ',' version_one)*
/// ```
fn parse_version_specifier(cursor: &mut Cursor) -> Result<VersionOrUrl, Pep508Error> {
    let mut start = cursor.pos();
    let mut specifiers = Vec::new();
    let mut buffer = String::new();
    loop {
        match cursor.peek() {
            Some((end, ',')) => {
                specifiers.push(parse_specifier(cursor, &buffer, start, end)?);
                buffer.clear();
                cursor.next();
                start = end + 1;
            }
            Some((_, ';')) | None => {
                let end = cursor.pos();
                specifiers.push(parse_specifier(cursor, &buffer, start, end)?);
                break;
            }
            Some((_, char)) => {
                buffer.push(char);
                cursor.next();
            }
        }
    }
    Ok(VersionOrUrl::VersionSpecifier(
        specifiers.into_iter().collect(),
    ))
}

/// Such as `(>=1.19,<2.0)`
///
/// ```text
/// '(' version_one (wsp* ',' version_one)* ')'
/// ```
fn parse_version_specifier_parentheses(cursor: &mut Cursor) -> Result<VersionOrUrl, Pep508Error> {
    let brace_pos = cursor.pos();
    cursor.next();
    cursor.eat_whitespace();
    let mut start = cursor.pos();
    let mut specifiers = Vec::new();
    let mut buffer = String::new();
    loop {
        match cursor.next() {
            Some((end, ',')) => {
                specifiers.push(parse_specifier(cursor, &buffer, start, end)?);
                buffer.clear();
                start = end + 1;
            }
            Some((end, ')')) => {
                specifiers.push(parse_specifier(cursor, &buffer, start, end)?);
                break;
            }
            Some((_, char)) => buffer.push(char),
            None => {
                return Err(Pep508Error {
                    message: Pep508ErrorSource::String(
                        "Missing closing parenthesis (expected ')', found end of dependency specification)"
                            .to_string(),
                    ),
                    start: brace_pos,
                    len: 1,
                    input: cursor.to_string(),
                });
            }
        }
    }
    Ok(VersionOrUrl::VersionSpecifier(
        specifiers.into_iter().collect(),
    ))
}

/// Parse a [dependency specifier](https://packaging.python.org/en/latest/specifications/dependency-specifiers)
///
/// ```text
/// specification = wsp* name wsp* extras? wsp* (('@' wsp* url_req) | ('(' versionspec ')') | (versionspec)) wsp* (';' wsp* marker)? wsp*
/// ```
fn parse(cursor: &mut Cursor) -> Result<Requirement, Pep508Error> {
    cursor.eat_whitespace();
    let name = parse_name(cursor)?;
    cursor.eat_whitespace();
    let extras = parse_extras(cursor)?;
    cursor.eat_whitespace();

    let version_or_url = match cursor.peek_char() {
        Some('@') => {
            cursor.next();
            Some(VersionOrUrl::Url(parse_url(cursor)?))
        }
        Some('(') => Some(parse_version_specifier_parentheses(cursor)?),
        Some('<' | '=' | '>' | '~' | '!') => Some(parse_version_specifier(cursor)?),
        Some(';') | None => None,
        Some(other) => {
            return Err(Pep508Error {
                message: Pep508ErrorSource::String(format!(
                    "Expected one of `@`, `(`, `<`, `=`, `>`, `~`, `!`, `;`, found `{other}`"
                )),
                start: cursor.pos(),
                len: other.len_utf8(),
                input: cursor.to_string(),
            });
        }
    };

    cursor.eat_whitespace();
    let marker = if cursor.eat_char(';').is_some() {
        Some(marker::parse_markers_impl(cursor)?)
    } else {
        None
    };
    cursor.eat_whitespace();
    if let Some((pos, char)) = cursor.next() {
        return Err(Pep508Error {
            message: Pep508ErrorSource::String(if marker.is_none() {
                format!("Expected end of input or ';', found '{char}'")
            } else {
                format!("Expected end of input, found '{char}'")
            }),
            start: pos,
            len: char.len_utf8(),
            input: cursor.to_string(),
        });
    }

    Ok(Requirement {
        name,
        extras,
        version_or_url,
        marker,
    })
}
