//! Python version numbers and specifiers, implementing
//! [PEP 440](https://peps.python.org/pep-0440).
//!
//! ```rust
//! use std::str::FromStr;
//! use pybuild_pep440::{Version, VersionSpecifiers};
//!
//! let version = Version::from_str("1.19").unwrap();
//! let specifiers = VersionSpecifiers::from_str(">=1.16, <2.0").unwrap();
//! assert!(specifiers.contains(&version));
//! ```
//!
//! A few PEP 440 rules are easy to get wrong:
//!
//! * A lower epoch always means a lower version (`1.0 < 2!0.1`).
//! * `.devN` on a final release sorts before every pre-release of that release.
//! * Local versions sort above the public version (`1.0+local > 1.0`), yet `==1.0` matches
//!   `1.0+local`. Ordering and matching are therefore implemented separately.
//! * Pre-releases are excluded from matching unless the specifier asks for one. See
//!   [`VersionSpecifiers::matches`].
#![deny(missing_docs)]

pub use version::{
    LocalSegment, Operator, OperatorParseError, PrereleaseKind, Version, VersionParseError,
};
pub use version_specifier::{
    VersionSpecifier, VersionSpecifierParseError, VersionSpecifiers, VersionSpecifiersParseError,
};

mod version;
mod version_specifier;
