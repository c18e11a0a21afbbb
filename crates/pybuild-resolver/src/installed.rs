use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use pybuild_normalize::PackageName;
use pybuild_pypi_types::InstalledDistribution;

/// A read-only view of the distributions installed in an environment, keyed by normalized name.
pub trait InstalledPackages {
    fn get_package(&self, name: &PackageName) -> Option<&InstalledDistribution>;
}

impl<S: BuildHasher> InstalledPackages for HashMap<PackageName, InstalledDistribution, S> {
    fn get_package(&self, name: &PackageName) -> Option<&InstalledDistribution> {
        self.get(name)
    }
}

impl InstalledPackages for BTreeMap<PackageName, InstalledDistribution> {
    fn get_package(&self, name: &PackageName) -> Option<&InstalledDistribution> {
        self.get(name)
    }
}

impl<T: InstalledPackages + ?Sized> InstalledPackages for &T {
    fn get_package(&self, name: &PackageName) -> Option<&InstalledDistribution> {
        (**self).get_package(name)
    }
}
