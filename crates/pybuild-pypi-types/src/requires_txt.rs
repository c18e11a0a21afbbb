use std::io::BufRead;
use std::str::FromStr;

use tracing::warn;

use pybuild_normalize::ExtraName;
use pybuild_pep508::{MarkerExpression, MarkerOperator, MarkerTree, MarkerValue, Requirement};

use crate::Error;

/// The dependencies of an `.egg-info` distribution, from its legacy `requires.txt`.
///
/// See: <https://setuptools.pypa.io/en/latest/deprecated/python_eggs.html#dependency-metadata>
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RequiresTxt {
    pub requires_dist: Vec<Requirement>,
    pub provides_extras: Vec<ExtraName>,
}

/// The condition a `requires.txt` section puts on its requirements.
enum Section {
    /// Applies to the lines below.
    Marker(Option<MarkerTree>),
    /// The header didn't parse, its lines are skipped.
    Invalid,
}

impl RequiresTxt {
    /// Parse a `requires.txt` file.
    ///
    /// Sections such as `[dev]`, `[:sys_platform == "win32"]` or
    /// `[dotenv:sys_platform == "darwin"]` turn into markers on the requirements below them.
    /// Lines that don't parse are skipped with a warning, like invalid `Requires-Dist` entries.
    pub fn parse(content: &[u8]) -> Result<Self, Error> {
        let mut requires_dist = Vec::new();
        let mut provides_extras = Vec::new();
        let mut section = Section::Marker(None);

        for line in content.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let header = header.trim_end_matches(']');
                section = match parse_section(header) {
                    Ok((extra, marker)) => {
                        if let Some(extra) = extra {
                            provides_extras.push(extra);
                        }
                        Section::Marker(marker)
                    }
                    Err(err) => {
                        warn!("Ignoring invalid `requires.txt` section `[{header}]`: {err}");
                        Section::Invalid
                    }
                };
                continue;
            }

            let Section::Marker(section_marker) = &section else {
                continue;
            };
            let requirement = match Requirement::from_str(line) {
                Ok(requirement) => requirement,
                Err(err) => {
                    warn!("Ignoring invalid requirement in `requires.txt`: {err}");
                    continue;
                }
            };
            let marker = match (requirement.marker, section_marker.clone()) {
                (Some(own), Some(section)) => Some(MarkerTree::And(vec![own, section])),
                (own, section) => own.or(section),
            };
            requires_dist.push(Requirement {
                marker,
                ..requirement
            });
        }

        Ok(Self {
            requires_dist,
            provides_extras,
        })
    }
}

/// Split a section header into its extra and the marker its lines get, e.g. `dev:os_name == "nt"`
/// into `dev` and `os_name == "nt" and extra == "dev"`.
fn parse_section(header: &str) -> Result<(Option<ExtraName>, Option<MarkerTree>), String> {
    let (extra, marker) = header.split_once(':').unwrap_or((header, ""));
    let extra = extra.trim();
    let marker = marker.trim();

    let extra = if extra.is_empty() {
        None
    } else {
        Some(ExtraName::from_str(extra).map_err(|err| err.to_string())?)
    };
    let marker = if marker.is_empty() {
        None
    } else {
        Some(MarkerTree::from_str(marker).map_err(|err| err.to_string())?)
    };

    let extra_marker = extra.as_ref().map(|extra| {
        MarkerTree::Expression(MarkerExpression {
            l_value: MarkerValue::Extra,
            operator: MarkerOperator::Equal,
            r_value: MarkerValue::QuotedString(extra.to_string()),
        })
    });
    let marker = match (marker, extra_marker) {
        (Some(marker), Some(extra_marker)) => Some(MarkerTree::And(vec![marker, extra_marker])),
        (marker, extra_marker) => marker.or(extra_marker),
    };
    Ok((extra, marker))
}
