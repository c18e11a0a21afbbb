use std::fmt::{Display, Formatter};

use tracing::trace;

use pybuild_normalize::ExtraName;
use pybuild_pep440::Version;
use pybuild_pep508::{MarkerEnvironment, Requirement};
use pybuild_pypi_types::InstalledDistribution;

use crate::InstalledPackages;

/// Why an applicable requirement isn't satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsatisfiedReason {
    /// No distribution with that name is installed.
    Missing,
    /// The installed version is outside the requirement's specifiers.
    VersionMismatch { installed: Version },
    /// The installed distribution doesn't declare a requested extra.
    MissingExtra { extra: ExtraName },
}

impl Display for UnsatisfiedReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => f.write_str("not installed"),
            Self::VersionMismatch { installed } => write!(f, "version {installed} is installed"),
            Self::MissingExtra { extra } => write!(f, "extra `{extra}` is not provided"),
        }
    }
}

/// Tests single requirements against the installed distributions of one environment.
#[derive(Debug, Clone, Copy)]
pub struct RequirementMatcher<'a> {
    markers: &'a MarkerEnvironment,
}

impl<'a> RequirementMatcher<'a> {
    pub fn new(markers: &'a MarkerEnvironment) -> Self {
        Self { markers }
    }

    /// Whether the requirement applies in this environment.
    ///
    /// The marker is evaluated once without any extra and once per extra of the requirer; it
    /// applies if any of those evaluations is true.
    pub fn applies(&self, requirement: &Requirement, parent_extras: &[ExtraName]) -> bool {
        let Some(marker) = &requirement.marker else {
            return true;
        };
        marker.evaluate(self.markers, &[])
            || parent_extras
                .iter()
                .any(|extra| marker.evaluate(self.markers, std::slice::from_ref(extra)))
    }

    /// Check an applicable requirement, returning the distribution that satisfies it.
    pub fn check<'b>(
        &self,
        requirement: &Requirement,
        installed: &'b impl InstalledPackages,
    ) -> Result<&'b InstalledDistribution, UnsatisfiedReason> {
        let Some(distribution) = installed.get_package(&requirement.name) else {
            trace!("{} is not installed", requirement.name);
            return Err(UnsatisfiedReason::Missing);
        };
        if let Some(specifiers) = requirement.specifiers() {
            if !specifiers.matches(&distribution.version) {
                trace!(
                    "{} {} does not satisfy `{specifiers}`",
                    distribution.name, distribution.version
                );
                return Err(UnsatisfiedReason::VersionMismatch {
                    installed: distribution.version.clone(),
                });
            }
        }
        if let Some(extra) = requirement
            .extras
            .iter()
            .find(|extra| !distribution.provides_extra(extra))
        {
            return Err(UnsatisfiedReason::MissingExtra {
                extra: extra.clone(),
            });
        }
        Ok(distribution)
    }

    /// Returns `true` if the requirement doesn't apply here or is satisfied by `installed`.
    pub fn matches(&self, requirement: &Requirement, installed: &impl InstalledPackages) -> bool {
        !self.applies(requirement, &[]) || self.check(requirement, installed).is_ok()
    }
}
