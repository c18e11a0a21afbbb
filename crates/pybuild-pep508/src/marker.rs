//! PEP 508 markers implementations with validation and warnings
//!
//! Markers allow you to install dependencies only in specific environments (python version,
//! operating system, architecture, etc.) or when a package is installed with specific extras.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use tracing::warn;

use pybuild_normalize::ExtraName;
use pybuild_pep440::{Operator, Version, VersionSpecifier};

use crate::cursor::Cursor;
use crate::{Pep508Error, Pep508ErrorSource};

/// Those environment markers with a PEP 440 version as value such as `python_version`
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::enum_variant_names)]
pub enum MarkerValueVersion {
    /// `implementation_version`
    ImplementationVersion,
    /// `python_full_version`
    PythonFullVersion,
    /// `python_version`
    PythonVersion,
}

impl Display for MarkerValueVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImplementationVersion => f.write_str("implementation_version"),
            Self::PythonFullVersion => f.write_str("python_full_version"),
            Self::PythonVersion => f.write_str("python_version"),
        }
    }
}

/// Those environment markers with an arbitrary string as value such as `sys_platform`
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MarkerValueString {
    /// `implementation_name`
    ImplementationName,
    /// `os_name`
    OsName,
    /// `platform_machine`
    PlatformMachine,
    /// `platform_python_implementation`
    PlatformPythonImplementation,
    /// `platform_release`
    PlatformRelease,
    /// `platform_system`
    PlatformSystem,
    /// `platform_version`
    PlatformVersion,
    /// `sys_platform`
    SysPlatform,
}

impl Display for MarkerValueString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ImplementationName => "implementation_name",
            Self::OsName => "os_name",
            Self::PlatformMachine => "platform_machine",
            Self::PlatformPythonImplementation => "platform_python_implementation",
            Self::PlatformRelease => "platform_release",
            Self::PlatformSystem => "platform_system",
            Self::PlatformVersion => "platform_version",
            Self::SysPlatform => "sys_platform",
        })
    }
}

/// One of the predefined environment values
///
/// <https://packaging.python.org/en/latest/specifications/dependency-specifiers/#environment-markers>
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MarkerValue {
    /// Those environment markers with a PEP 440 version as value such as `python_version`
    MarkerEnvVersion(MarkerValueVersion),
    /// Those environment markers with an arbitrary string as value such as `sys_platform`
    MarkerEnvString(MarkerValueString),
    /// `extra`. This one is special because it's a list and not env but user given
    Extra,
    /// Not a constant, but a user given quoted string with a value inside such as '3.8' or "windows"
    QuotedString(String),
}

impl FromStr for MarkerValue {
    type Err = String;

    /// This is specifically for the reserved values
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s {
            "implementation_name" => Self::MarkerEnvString(MarkerValueString::ImplementationName),
            "implementation_version" => {
                Self::MarkerEnvVersion(MarkerValueVersion::ImplementationVersion)
            }
            // The dotted forms are the deprecated PEP 345 spellings
            "os_name" | "os.name" => Self::MarkerEnvString(MarkerValueString::OsName),
            "platform_machine" | "platform.machine" => {
                Self::MarkerEnvString(MarkerValueString::PlatformMachine)
            }
            "platform_python_implementation" | "platform.python_implementation" => {
                Self::MarkerEnvString(MarkerValueString::PlatformPythonImplementation)
            }
            "platform_release" => Self::MarkerEnvString(MarkerValueString::PlatformRelease),
            "platform_system" => Self::MarkerEnvString(MarkerValueString::PlatformSystem),
            "platform_version" | "platform.version" => {
                Self::MarkerEnvString(MarkerValueString::PlatformVersion)
            }
            "python_full_version" => Self::MarkerEnvVersion(MarkerValueVersion::PythonFullVersion),
            "python_version" => Self::MarkerEnvVersion(MarkerValueVersion::PythonVersion),
            "sys_platform" | "sys.platform" => {
                Self::MarkerEnvString(MarkerValueString::SysPlatform)
            }
            "extra" => Self::Extra,
            _ => return Err(format!("Invalid key: {s}")),
        };
        Ok(value)
    }
}

impl Display for MarkerValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarkerEnvVersion(marker_value_version) => marker_value_version.fmt(f),
            Self::MarkerEnvString(marker_value_string) => marker_value_string.fmt(f),
            Self::Extra => f.write_str("extra"),
            Self::QuotedString(value) => write!(f, "'{value}'"),
        }
    }
}

/// How to compare key and value, such as by `==`, `>` or `not in`
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MarkerOperator {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessEqual,
    /// `~=`
    TildeEqual,
    /// `===`
    ExactEqual,
    /// `in`
    In,
    /// `not in`
    NotIn,
}

impl MarkerOperator {
    /// The PEP 440 counterpart, `None` for `in` and `not in`
    fn to_pep440_operator(&self) -> Option<Operator> {
        match self {
            Self::Equal => Some(Operator::Equal),
            Self::NotEqual => Some(Operator::NotEqual),
            Self::GreaterThan => Some(Operator::GreaterThan),
            Self::GreaterEqual => Some(Operator::GreaterThanEqual),
            Self::LessThan => Some(Operator::LessThan),
            Self::LessEqual => Some(Operator::LessThanEqual),
            Self::TildeEqual => Some(Operator::TildeEqual),
            Self::ExactEqual => Some(Operator::ExactEqual),
            Self::In | Self::NotIn => None,
        }
    }

    /// `'3.8' < python_version` is `python_version > '3.8'`
    fn invert(&self) -> Self {
        match self {
            Self::GreaterThan => Self::LessThan,
            Self::GreaterEqual => Self::LessEqual,
            Self::LessThan => Self::GreaterThan,
            Self::LessEqual => Self::GreaterEqual,
            other => other.clone(),
        }
    }
}

impl FromStr for MarkerOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s {
            "==" => Self::Equal,
            "!=" => Self::NotEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessEqual,
            "~=" => Self::TildeEqual,
            "===" => Self::ExactEqual,
            "in" => Self::In,
            other => return Err(format!("Invalid comparator: {other}")),
        };
        Ok(value)
    }
}

impl Display for MarkerOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterEqual => ">=",
            Self::LessThan => "<",
            Self::LessEqual => "<=",
            Self::TildeEqual => "~=",
            Self::ExactEqual => "===",
            Self::In => "in",
            Self::NotIn => "not in",
        })
    }
}

/// Helper type with a [Version] and its original text
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StringVersion {
    /// Original unchanged string
    pub string: String,
    /// Parsed version
    pub version: Version,
}

impl FromStr for StringVersion {
    type Err = pybuild_pep440::VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            string: s.to_string(),
            version: Version::from_str(s)?,
        })
    }
}

impl<'de> Deserialize<'de> for StringVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(deserializer)?;
        Self::from_str(&string).map_err(de::Error::custom)
    }
}

impl Serialize for StringVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.string)
    }
}

/// The marker values of one interpreter, as reported by `packaging.markers.default_environment()`.
///
/// Some are [`StringVersion`] because we have to support version comparison.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct MarkerEnvironment {
    pub implementation_name: String,
    pub implementation_version: StringVersion,
    pub os_name: String,
    pub platform_machine: String,
    pub platform_python_implementation: String,
    pub platform_release: String,
    pub platform_system: String,
    pub platform_version: String,
    pub python_full_version: StringVersion,
    pub python_version: StringVersion,
    pub sys_platform: String,
}

impl MarkerEnvironment {
    fn get_version(&self, key: &MarkerValueVersion) -> &StringVersion {
        match key {
            MarkerValueVersion::ImplementationVersion => &self.implementation_version,
            MarkerValueVersion::PythonFullVersion => &self.python_full_version,
            MarkerValueVersion::PythonVersion => &self.python_version,
        }
    }

    fn get_string(&self, key: &MarkerValueString) -> &str {
        match key {
            MarkerValueString::ImplementationName => &self.implementation_name,
            MarkerValueString::OsName => &self.os_name,
            MarkerValueString::PlatformMachine => &self.platform_machine,
            MarkerValueString::PlatformPythonImplementation => {
                &self.platform_python_implementation
            }
            MarkerValueString::PlatformRelease => &self.platform_release,
            MarkerValueString::PlatformSystem => &self.platform_system,
            MarkerValueString::PlatformVersion => &self.platform_version,
            MarkerValueString::SysPlatform => &self.sys_platform,
        }
    }
}

/// Represents one clause such as `python_version > "3.8"` in the form
/// ```text
/// <a name from the PEP508 list | a string> <an operator> <a name from the PEP508 list | a string>
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MarkerExpression {
    /// A name from the PEP508 list or a string
    pub l_value: MarkerValue,
    /// an operator, such as `>=` or `not in`
    pub operator: MarkerOperator,
    /// A name from the PEP508 list or a string
    pub r_value: MarkerValue,
}

impl MarkerExpression {
    /// Evaluate a <`marker_value`> <`marker_op`> <`marker_value`> expression
    fn evaluate(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        match (&self.l_value, &self.r_value) {
            (MarkerValue::MarkerEnvVersion(key), MarkerValue::QuotedString(value)) => {
                let l_version = env.get_version(key);
                if self.operator.to_pep440_operator().is_none() {
                    return self.compare_strings(&l_version.string, value);
                }
                self.compare_version(l_version, &self.operator, value)
            }
            (MarkerValue::QuotedString(value), MarkerValue::MarkerEnvVersion(key)) => {
                let r_version = env.get_version(key);
                if self.operator.to_pep440_operator().is_none() {
                    return self.compare_strings(value, &r_version.string);
                }
                self.compare_version(r_version, &self.operator.invert(), value)
            }
            (MarkerValue::MarkerEnvString(key), MarkerValue::QuotedString(value)) => {
                self.compare_strings(env.get_string(key), value)
            }
            (MarkerValue::QuotedString(value), MarkerValue::MarkerEnvString(key)) => {
                self.compare_strings(value, env.get_string(key))
            }
            (MarkerValue::Extra, MarkerValue::QuotedString(value))
            | (MarkerValue::QuotedString(value), MarkerValue::Extra) => {
                self.compare_extra(value, extras)
            }
            (MarkerValue::QuotedString(_), MarkerValue::QuotedString(_)) => {
                warn!(
                    "Comparing two quoted strings with each other doesn't make sense: {self}, evaluating to false"
                );
                false
            }
            _ => {
                warn!(
                    "Comparing two markers with each other doesn't make any sense: {self}, evaluating to false"
                );
                false
            }
        }
    }

    /// `<version key> <op> '<version>'`, falling back to a string comparison when the quoted
    /// value isn't a valid version, as `packaging` does.
    fn compare_version(
        &self,
        l_version: &StringVersion,
        operator: &MarkerOperator,
        r_value: &str,
    ) -> bool {
        let specifier = operator
            .to_pep440_operator()
            .map(|pep440_operator| VersionSpecifier::from_str(&format!("{pep440_operator}{r_value}")));
        match specifier {
            Some(Ok(specifier)) => specifier.contains(&l_version.version),
            Some(Err(err)) => {
                warn!(
                    "Expected PEP 440 version to compare with '{r_value}' in `{self}`, comparing as strings: {err}"
                );
                compare_strings(operator, &l_version.string, r_value)
            }
            None => compare_strings(operator, &l_version.string, r_value),
        }
    }

    fn compare_strings(&self, l_string: &str, r_string: &str) -> bool {
        if matches!(self.operator, MarkerOperator::TildeEqual) {
            warn!("Can't compare {l_string} and {r_string} with `~=`, evaluating to false");
            return false;
        }
        compare_strings(&self.operator, l_string, r_string)
    }

    /// `extra == '...'`, with both sides normalized
    fn compare_extra(&self, value: &str, extras: &[ExtraName]) -> bool {
        let Ok(extra) = ExtraName::from_str(value) else {
            warn!("Expected extra name, found '{value}', evaluating to false");
            return false;
        };
        match self.operator {
            MarkerOperator::Equal => extras.contains(&extra),
            MarkerOperator::NotEqual => !extras.contains(&extra),
            _ => {
                warn!(
                    "Comparing extra with something other than equal (`==`) or unequal (`!=`) is wrong, evaluating to false"
                );
                false
            }
        }
    }
}

fn compare_strings(operator: &MarkerOperator, l_string: &str, r_string: &str) -> bool {
    match operator {
        MarkerOperator::Equal | MarkerOperator::ExactEqual => l_string == r_string,
        MarkerOperator::NotEqual => l_string != r_string,
        MarkerOperator::GreaterThan => l_string > r_string,
        MarkerOperator::GreaterEqual => l_string >= r_string,
        MarkerOperator::LessThan => l_string < r_string,
        MarkerOperator::LessEqual => l_string <= r_string,
        MarkerOperator::TildeEqual => false,
        MarkerOperator::In => r_string.contains(l_string),
        MarkerOperator::NotIn => !r_string.contains(l_string),
    }
}

impl Display for MarkerExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.l_value, self.operator, self.r_value)
    }
}

/// Represents one of the nested marker expressions with and/or/parentheses
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MarkerTree {
    /// A simple expression such as `python_version > "3.8"`
    Expression(MarkerExpression),
    /// An and between nested expressions, such as
    /// `python_version > "3.8" and implementation_name == 'cpython'`
    And(Vec<MarkerTree>),
    /// An or between nested expressions, such as
    /// `python_version > "3.8" or implementation_name == 'cpython'`
    Or(Vec<MarkerTree>),
}

impl FromStr for MarkerTree {
    type Err = Pep508Error;

    fn from_str(markers: &str) -> Result<Self, Self::Err> {
        parse_markers_impl(&mut Cursor::new(markers))
    }
}

impl MarkerTree {
    /// Does this marker apply in the given environment with the given set of active extras?
    pub fn evaluate(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        match self {
            Self::Expression(expression) => expression.evaluate(env, extras),
            Self::And(expressions) => expressions.iter().all(|x| x.evaluate(env, extras)),
            Self::Or(expressions) => expressions.iter().any(|x| x.evaluate(env, extras)),
        }
    }
}

impl Display for MarkerTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let format_inner = |expression: &Self| {
            if matches!(expression, Self::Expression(_)) {
                format!("{expression}")
            } else {
                format!("({expression})")
            }
        };
        match self {
            Self::Expression(expression) => write!(f, "{expression}"),
            Self::And(and_list) => f.write_str(
                &and_list
                    .iter()
                    .map(format_inner)
                    .collect::<Vec<String>>()
                    .join(" and "),
            ),
            Self::Or(or_list) => f.write_str(
                &or_list
                    .iter()
                    .map(format_inner)
                    .collect::<Vec<String>>()
                    .join(" or "),
            ),
        }
    }
}

/// ```text
/// version_cmp   = wsp* <'<=' | '<' | '!=' | '==' | '>=' | '>' | '~=' | '==='>
/// marker_op     = version_cmp | (wsp* 'in') | (wsp* 'not' wsp+ 'in')
/// ```
fn parse_marker_operator(cursor: &mut Cursor) -> Result<MarkerOperator, Pep508Error> {
    let (start, len) =
        cursor.take_while(|char| !char.is_whitespace() && char != '\'' && char != '"');
    let operator = cursor.slice(start, len);
    if operator == "not" {
        // 'not' wsp+ 'in'
        match cursor.next() {
            None => {
                return Err(Pep508Error {
                    message: Pep508ErrorSource::String(
                        "Expected whitespace after 'not', found end of input".to_string(),
                    ),
                    start: cursor.pos(),
                    len: 1,
                    input: cursor.to_string(),
                });
            }
            Some((_, whitespace)) if whitespace.is_whitespace() => {}
            Some((pos, other)) => {
                return Err(Pep508Error {
                    message: Pep508ErrorSource::String(format!(
                        "Expected whitespace after 'not', found '{other}'"
                    )),
                    start: pos,
                    len: other.len_utf8(),
                    input: cursor.to_string(),
                });
            }
        }
        cursor.eat_whitespace();
        cursor.next_expect_char('i', cursor.pos())?;
        cursor.next_expect_char('n', cursor.pos())?;
        return Ok(MarkerOperator::NotIn);
    }
    MarkerOperator::from_str(operator).map_err(|_| Pep508Error {
        message: Pep508ErrorSource::String(format!(
            "Expected a valid marker operator (such as '>=' or 'not in'), found '{operator}'"
        )),
        start,
        len,
        input: cursor.to_string(),
    })
}

/// Either a single or double quoted string or one of the marker variable names
fn parse_marker_value(cursor: &mut Cursor) -> Result<MarkerValue, Pep508Error> {
    match cursor.peek() {
        None => Err(Pep508Error {
            message: Pep508ErrorSource::String(
                "Expected marker value, found end of dependency specification".to_string(),
            ),
            start: cursor.pos(),
            len: 1,
            input: cursor.to_string(),
        }),
        Some((start_pos, quotation_mark @ ('"' | '\''))) => {
            cursor.next();
            let (start, len) = cursor.take_while(|c| c != quotation_mark);
            let value = cursor.slice(start, len).to_string();
            cursor.next_expect_char(quotation_mark, start_pos)?;
            Ok(MarkerValue::QuotedString(value))
        }
        Some(_) => {
            let (start, len) = cursor.take_while(|char| {
                !char.is_whitespace() && !['>', '=', '<', '!', '~', ')'].contains(&char)
            });
            let key = cursor.slice(start, len);
            MarkerValue::from_str(key).map_err(|_| Pep508Error {
                message: Pep508ErrorSource::String(format!(
                    "Expected a valid marker name, found '{key}'"
                )),
                start,
                len,
                input: cursor.to_string(),
            })
        }
    }
}

/// ```text
/// marker_var:l marker_op:o marker_var:r
/// ```
fn parse_marker_key_op_value(cursor: &mut Cursor) -> Result<MarkerExpression, Pep508Error> {
    cursor.eat_whitespace();
    let l_value = parse_marker_value(cursor)?;
    cursor.eat_whitespace();
    let operator = parse_marker_operator(cursor)?;
    cursor.eat_whitespace();
    let r_value = parse_marker_value(cursor)?;
    Ok(MarkerExpression {
        l_value,
        operator,
        r_value,
    })
}

/// ```text
/// marker_expr   = marker_var:l marker_op:o marker_var:r -> (o, l, r)
///               | wsp* '(' marker:m wsp* ')' -> m
/// ```
fn parse_marker_expr(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    cursor.eat_whitespace();
    if let Some(start_pos) = cursor.eat_char('(') {
        let marker = parse_marker_or(cursor)?;
        cursor.eat_whitespace();
        cursor.next_expect_char(')', start_pos)?;
        Ok(marker)
    } else {
        Ok(MarkerTree::Expression(parse_marker_key_op_value(cursor)?))
    }
}

fn parse_marker_and(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    parse_marker_op(cursor, "and", MarkerTree::And, parse_marker_expr)
}

fn parse_marker_or(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    parse_marker_op(cursor, "or", MarkerTree::Or, parse_marker_and)
}

/// Parses both `marker_and` and `marker_or`
fn parse_marker_op(
    cursor: &mut Cursor,
    op: &str,
    op_constructor: fn(Vec<MarkerTree>) -> MarkerTree,
    parse_inner: fn(&mut Cursor) -> Result<MarkerTree, Pep508Error>,
) -> Result<MarkerTree, Pep508Error> {
    let mut expressions = vec![parse_inner(cursor)?];
    loop {
        cursor.eat_whitespace();
        let (start, len) = cursor.peek_while(|c| !c.is_whitespace() && c != '(');
        if cursor.slice(start, len) != op {
            break;
        }
        cursor.take_while(|c| !c.is_whitespace() && c != '(');
        expressions.push(parse_inner(cursor)?);
    }
    // Build minimal trees
    if expressions.len() == 1 {
        Ok(expressions.remove(0))
    } else {
        Ok(op_constructor(expressions))
    }
}

/// ```text
/// marker        = marker_or
/// ```
pub(crate) fn parse_markers_impl(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    let marker = parse_marker_or(cursor)?;
    cursor.eat_whitespace();
    if let Some((pos, unexpected)) = cursor.next() {
        // Both `parse_marker_or` and `parse_marker_and` returned, so this is neither "and" nor "or"
        return Err(Pep508Error {
            message: Pep508ErrorSource::String(format!(
                "Unexpected character '{unexpected}', expected 'and', 'or' or end of input"
            )),
            start: pos,
            len: unexpected.len_utf8() + cursor.remaining(),
            input: cursor.to_string(),
        });
    }
    Ok(marker)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use indoc::indoc;
    use test_case::test_case;

    use pybuild_normalize::ExtraName;

    use crate::{MarkerEnvironment, MarkerTree, StringVersion};

    fn env37() -> MarkerEnvironment {
        MarkerEnvironment {
            implementation_name: "cpython".to_string(),
            implementation_version: StringVersion::from_str("3.7.13").unwrap(),
            os_name: "posix".to_string(),
            platform_machine: "x86_64".to_string(),
            platform_python_implementation: "CPython".to_string(),
            platform_release: "5.4.188+".to_string(),
            platform_system: "Linux".to_string(),
            platform_version: "#1 SMP Sun Apr 24 10:03:06 PDT 2022".to_string(),
            python_full_version: StringVersion::from_str("3.7.13").unwrap(),
            python_version: StringVersion::from_str("3.7").unwrap(),
            sys_platform: "linux".to_string(),
        }
    }

    fn evaluate(marker: &str, extras: &[&str]) -> bool {
        let extras: Vec<ExtraName> = extras
            .iter()
            .map(|extra| ExtraName::from_str(extra).unwrap())
            .collect();
        MarkerTree::from_str(marker)
            .unwrap()
            .evaluate(&env37(), &extras)
    }

    #[test_case("python_version >= '3.7'", true)]
    #[test_case("python_version < '3.7'", false)]
    #[test_case("'3.8' > python_version", true; "reversed operands")]
    #[test_case("python_full_version == '3.7.*'", true)]
    #[test_case("sys_platform == 'linux' and os_name != 'nt'", true)]
    #[test_case("sys_platform == 'win32' or (os_name == 'posix' and platform_machine == 'x86_64')", true)]
    #[test_case("'linux' in sys_platform", true)]
    #[test_case("'win' not in sys_platform", true)]
    #[test_case("platform_release >= '5'", true; "lexicographic")]
    #[test_case("sys.platform == 'linux'", true; "deprecated name")]
    fn evaluation(marker: &str, expected: bool) {
        assert_eq!(evaluate(marker, &[]), expected, "{marker}");
    }

    #[test]
    fn extras() {
        assert!(!evaluate("extra == 'test'", &[]));
        assert!(evaluate("extra == 'test'", &["test"]));
        assert!(evaluate("extra == 'Test_Extra'", &["test-extra"]));
        assert!(evaluate("'security' == extra", &["security"]));
        assert!(evaluate("extra != 'test'", &[]));
    }

    #[test]
    fn display() {
        let marker = MarkerTree::from_str(
            r#"python_version=="3.8" and (sys_platform == "win32" or os_name == "nt")"#,
        )
        .unwrap();
        assert_eq!(
            marker.to_string(),
            "python_version == '3.8' and (sys_platform == 'win32' or os_name == 'nt')"
        );
    }

    #[test]
    fn environment_from_json() {
        let env: MarkerEnvironment = serde_json::from_str(
            r#"{
                "implementation_name": "cpython",
                "implementation_version": "3.12.1",
                "os_name": "posix",
                "platform_machine": "arm64",
                "platform_python_implementation": "CPython",
                "platform_release": "23.1.0",
                "platform_system": "Darwin",
                "platform_version": "Darwin Kernel Version 23.1.0",
                "python_full_version": "3.12.1",
                "python_version": "3.12",
                "sys_platform": "darwin"
            }"#,
        )
        .unwrap();
        assert_eq!(env.python_version.string, "3.12");
        assert!(
            MarkerTree::from_str("python_version >= '3.8' and sys_platform == 'darwin'")
                .unwrap()
                .evaluate(&env, &[])
        );
    }

    #[test]
    fn error_invalid_operator() {
        let err = MarkerTree::from_str("python_version ~ '3.8'").unwrap_err();
        assert_eq!(
            err.to_string(),
            indoc! {"
            Expected a valid marker operator (such as '>=' or 'not in'), found '~'
            python_version ~ '3.8'
                           ^"
            }
        );
    }

    #[test]
    fn error_unknown_key() {
        let err = MarkerTree::from_str("python_versio == '3.8'").unwrap_err();
        insta::assert_snapshot!(err, @r"
        Expected a valid marker name, found 'python_versio'
        python_versio == '3.8'
        ^^^^^^^^^^^^^
        ");
    }

    #[test]
    fn error_unclosed_parenthesis() {
        let err = MarkerTree::from_str("(os_name == 'nt'").unwrap_err();
        insta::assert_snapshot!(err, @r"
        Expected ')', found end of dependency specification
        (os_name == 'nt'
        ^
        ");
    }

    #[test]
    fn error_trailing() {
        let err = MarkerTree::from_str("os_name == 'nt' xor os_name == 'posix'").unwrap_err();
        assert!(
            err.to_string()
                .starts_with("Unexpected character 'x', expected 'and', 'or' or end of input"),
            "{err}"
        );
    }
}
