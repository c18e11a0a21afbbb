//! Decide, without a package index, whether a set of requirements is satisfied by what is
//! installed in an environment.
//!
//! [`RequirementMatcher`] checks a single requirement against the installed distributions;
//! [`DependencyResolver`] walks the `Requires-Dist` graph below each root requirement and
//! collects the roots that aren't satisfied, along with the chain that led to the failure.

pub use error::ResolveError;
pub use installed::InstalledPackages;
pub use matcher::{RequirementMatcher, UnsatisfiedReason};
pub use resolver::{DependencyResolver, ResolutionResult, Unsatisfied};

mod error;
mod installed;
mod matcher;
mod resolver;
