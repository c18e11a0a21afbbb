use std::io;
use std::str::FromStr;

use mailparse::{MailHeaderMap, MailParseError};
use thiserror::Error;
use tracing::warn;

use pybuild_normalize::{ExtraName, InvalidNameError, PackageName};
use pybuild_pep440::{Version, VersionParseError, VersionSpecifiers};
use pybuild_pep508::Requirement;

/// Python package core metadata as found in a wheel's `METADATA` or an sdist's `PKG-INFO`.
///
/// This is a subset of <https://packaging.python.org/specifications/core-metadata/>: the fields
/// needed to check build dependencies and to report what a build produced.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Metadata {
    // Mandatory fields
    pub metadata_version: String,
    pub name: PackageName,
    pub version: Version,
    // Optional fields
    pub requires_dist: Vec<Requirement>,
    pub requires_python: Option<VersionSpecifiers>,
    pub provides_extras: Vec<ExtraName>,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    MailParse(#[from] MailParseError),
    #[error("metadata field {0} not found")]
    FieldNotFound(&'static str),
    #[error("invalid version: {0}")]
    Pep440VersionError(VersionParseError),
    #[error(transparent)]
    InvalidName(#[from] InvalidNameError),
}

impl Metadata {
    /// Parse the [`Metadata`] from the contents of a `METADATA` or `PKG-INFO` file.
    ///
    /// `Requires-Dist`, `Requires-Python` and `Provides-Extra` entries that don't parse are skipped
    /// with a warning: installed distributions in the wild carry metadata written by tools of
    /// every age.
    pub fn parse_metadata(content: &[u8]) -> Result<Self, Error> {
        let headers = Headers::parse(content)?;

        let metadata_version = headers
            .get_first_value("Metadata-Version")
            .ok_or(Error::FieldNotFound("Metadata-Version"))?;
        let name = PackageName::from_str(
            &headers
                .get_first_value("Name")
                .ok_or(Error::FieldNotFound("Name"))?,
        )?;
        let version = Version::from_str(
            &headers
                .get_first_value("Version")
                .ok_or(Error::FieldNotFound("Version"))?,
        )
        .map_err(Error::Pep440VersionError)?;
        let requires_dist = headers
            .get_all_values("Requires-Dist")
            .filter_map(|requires_dist| match Requirement::from_str(&requires_dist) {
                Ok(requirement) => Some(requirement),
                Err(err) => {
                    warn!("Ignoring invalid requirement of {name}: {err}");
                    None
                }
            })
            .collect::<Vec<_>>();
        let requires_python = headers.get_first_value("Requires-Python").and_then(
            |requires_python| match VersionSpecifiers::from_str(&requires_python) {
                Ok(specifiers) => Some(specifiers),
                Err(err) => {
                    warn!("Ignoring invalid `Requires-Python` of {name}: {err}");
                    None
                }
            },
        );
        let provides_extras = headers
            .get_all_values("Provides-Extra")
            .filter_map(|provides_extra| match ExtraName::from_str(&provides_extra) {
                Ok(extra_name) => Some(extra_name),
                Err(err) => {
                    warn!("Ignoring invalid extra: {err}");
                    None
                }
            })
            .collect::<Vec<_>>();

        Ok(Self {
            metadata_version,
            name,
            version,
            requires_dist,
            requires_python,
            provides_extras,
        })
    }
}

/// The headers of a distribution metadata file.
#[derive(Debug)]
struct Headers<'a>(Vec<mailparse::MailHeader<'a>>);

impl<'a> Headers<'a> {
    fn parse(content: &'a [u8]) -> Result<Self, MailParseError> {
        let (headers, _) = mailparse::parse_headers(content)?;
        Ok(Self(headers))
    }

    /// Return the first value associated with the header with the given name.
    fn get_first_value(&self, name: &str) -> Option<String> {
        self.0
            .get_first_header(name)
            .map(|header| header.get_value())
            .filter(|value| value != "UNKNOWN")
    }

    /// Return all values associated with the header with the given name.
    fn get_all_values(&self, name: &str) -> impl Iterator<Item = String> {
        self.0
            .get_all_values(name)
            .into_iter()
            .filter(|value| value != "UNKNOWN")
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use indoc::indoc;

    use pybuild_normalize::{ExtraName, PackageName};
    use pybuild_pep440::Version;

    use super::{Error, Metadata};

    #[test]
    fn missing_fields() {
        let meta = Metadata::parse_metadata(b"Metadata-Version: 1.0");
        assert!(matches!(meta, Err(Error::FieldNotFound("Name"))));

        let meta = Metadata::parse_metadata(b"Metadata-Version: 1.0\nName: asdf");
        assert!(matches!(meta, Err(Error::FieldNotFound("Version"))));

        let meta = Metadata::parse_metadata(b"Metadata-Version: 1.0\nName: asdf\nVersion: 1.0")
            .unwrap();
        assert_eq!(meta.metadata_version, "1.0");
        assert_eq!(meta.name, PackageName::from_str("asdf").unwrap());
        assert_eq!(meta.version, Version::new([1, 0]));
    }

    #[test]
    fn encoded_and_invalid_names() {
        let s = "Metadata-Version: 1.0\nName: =?utf-8?q?foobar?=\nVersion: 1.0";
        let meta = Metadata::parse_metadata(s.as_bytes()).unwrap();
        assert_eq!(meta.name, PackageName::from_str("foobar").unwrap());

        let s = "Metadata-Version: 1.0\nName: -foo\nVersion: 1.0";
        let meta = Metadata::parse_metadata(s.as_bytes());
        assert!(matches!(meta, Err(Error::InvalidName(_))));
    }

    #[test]
    fn dependencies() {
        let s = indoc! {r#"
            Metadata-Version: 2.1
            Name: Flit_Core
            Version: 3.9.0
            Requires-Python: >=3.6
            Requires-Dist: tomli ; python_version < "3.11"
            Requires-Dist: pytest >= 6 ; extra == 'test'
            Requires-Dist: not a requirement !!
            Provides-Extra: test
            Provides-Extra: Docs_Build

            Long description.
        "#};
        let meta = Metadata::parse_metadata(s.as_bytes()).unwrap();
        assert_eq!(meta.name.as_ref(), "flit-core");
        assert_eq!(meta.version, Version::new([3, 9, 0]));
        assert_eq!(
            meta.requires_dist
                .iter()
                .map(|requirement| requirement.name.to_string())
                .collect::<Vec<_>>(),
            vec!["tomli", "pytest"]
        );
        assert_eq!(
            meta.provides_extras,
            vec![
                ExtraName::from_str("test").unwrap(),
                ExtraName::from_str("docs-build").unwrap()
            ]
        );
        assert_eq!(meta.requires_python.unwrap().to_string(), ">=3.6");
    }

    #[test]
    fn legacy_requires_python() {
        let s = indoc! {"
            Metadata-Version: 2.1
            Name: legacy
            Version: 1.0
            Requires-Python: >=3.6.*
            Requires-Dist: six
        "};
        let meta = Metadata::parse_metadata(s.as_bytes()).unwrap();
        assert_eq!(meta.name.as_ref(), "legacy");
        assert_eq!(meta.requires_python, None);
        assert_eq!(meta.requires_dist.len(), 1);
    }
}
