use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use itertools::Itertools;
use rustc_hash::FxHashSet;
use tracing::debug;

use pybuild_normalize::{ExtraName, PackageName};
use pybuild_pep508::{MarkerEnvironment, Requirement};

use crate::{InstalledPackages, RequirementMatcher, ResolveError, UnsatisfiedReason};

/// One unsatisfied root requirement and the path through the installed graph that broke it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsatisfied {
    root: String,
    /// The requirements from the root to the one that failed.
    pub chain: Vec<Requirement>,
    pub reason: UnsatisfiedReason,
}

impl Unsatisfied {
    /// The root requirement string, exactly as it was passed in.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Whether the root itself failed, rather than something it depends on.
    pub fn is_direct(&self) -> bool {
        self.chain.len() == 1
    }

    /// `b -> c` for the requirements below the root, without markers, or `None` if the root
    /// itself failed.
    pub fn dependency_chain(&self) -> Option<String> {
        if self.is_direct() {
            return None;
        }
        Some(format_chain(&self.chain[1..]))
    }
}

impl Display for Unsatisfied {
    /// `a -> b -> c`, without markers.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_chain(&self.chain))
    }
}

fn format_chain(chain: &[Requirement]) -> String {
    chain
        .iter()
        .map(|requirement| {
            Requirement {
                marker: None,
                ..requirement.clone()
            }
            .to_string()
        })
        .join(" -> ")
}

/// The unsatisfied requirements found by [`DependencyResolver::unsatisfied`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionResult(Vec<Unsatisfied>);

impl ResolutionResult {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The set of root requirement strings that are not satisfied.
    pub fn roots(&self) -> BTreeSet<&str> {
        self.0.iter().map(Unsatisfied::root).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Unsatisfied> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a ResolutionResult {
    type Item = &'a Unsatisfied;
    type IntoIter = std::slice::Iter<'a, Unsatisfied>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Display for ResolutionResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, unsatisfied) in self.0.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{unsatisfied}")?;
        }
        Ok(())
    }
}

/// Checks requirement strings, and everything installed distributions pull in below them,
/// against one environment.
#[derive(Debug, Clone, Copy)]
pub struct DependencyResolver<'a> {
    matcher: RequirementMatcher<'a>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(markers: &'a MarkerEnvironment) -> Self {
        Self {
            matcher: RequirementMatcher::new(markers),
        }
    }

    /// Return the roots that are not satisfied by `installed`.
    ///
    /// A root is unsatisfied if it applies here and either its distribution is missing, has a
    /// version outside the specifiers or lacks a requested extra, or if the same holds for any
    /// requirement reachable through the `Requires-Dist` of satisfied distributions. Unsatisfied
    /// requirements are not descended into.
    pub fn unsatisfied<S: AsRef<str>>(
        &self,
        roots: &[S],
        installed: &impl InstalledPackages,
    ) -> Result<ResolutionResult, ResolveError> {
        let roots = roots
            .iter()
            .map(|root| {
                let root = root.as_ref();
                Requirement::from_str(root)
                    .map(|requirement| (root, requirement))
                    .map_err(|err| ResolveError::Parse {
                        requirement: root.to_string(),
                        err: Box::new(err),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = Vec::new();
        for (root, requirement) in roots {
            self.check_root(root, requirement, installed, &mut result);
        }
        Ok(ResolutionResult(result))
    }

    /// Walk the graph below one root, with a visited set of its own.
    fn check_root(
        &self,
        root: &str,
        requirement: Requirement,
        installed: &impl InstalledPackages,
        result: &mut Vec<Unsatisfied>,
    ) {
        let mut visited: FxHashSet<(PackageName, Vec<ExtraName>)> = FxHashSet::default();
        let mut stack = vec![(requirement.clone(), vec![requirement], Vec::new())];

        while let Some((requirement, chain, parent_extras)) = stack.pop() {
            if !self.matcher.applies(&requirement, &parent_extras) {
                debug!("Skipping {requirement}: marker does not apply");
                continue;
            }

            // Every edge is matched, even into a visited distribution, so conflicting
            // specifiers from different requirers are all checked.
            let distribution = match self.matcher.check(&requirement, installed) {
                Ok(distribution) => distribution,
                Err(reason) => {
                    let unsatisfied = Unsatisfied {
                        root: root.to_string(),
                        chain,
                        reason,
                    };
                    debug!("Unsatisfied: {unsatisfied} ({})", unsatisfied.reason);
                    result.push(unsatisfied);
                    continue;
                }
            };

            let extras = requirement.extras.iter().cloned().sorted().collect();
            if !visited.insert((requirement.name.clone(), extras)) {
                continue;
            }

            for dependency in distribution.requires_dist.iter().rev() {
                let mut chain = chain.clone();
                chain.push(dependency.clone());
                stack.push((dependency.clone(), chain, requirement.extras.clone()));
            }
        }
    }
}
