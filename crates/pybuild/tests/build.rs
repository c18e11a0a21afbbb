#![cfg(feature = "python")]

use assert_cmd::Command;
use assert_fs::prelude::*;
use indoc::{formatdoc, indoc};
use predicates::str::contains;

const BACKEND: &str = indoc! {r#"
    import os
    import tarfile
    import zipfile

    NAME = "in_tree_project"
    VERSION = "0.1.0"


    def build_sdist(sdist_directory, config_settings=None):
        base = f"{NAME}-{VERSION}"
        filename = f"{base}.tar.gz"
        with tarfile.open(os.path.join(sdist_directory, filename), "w:gz") as tar:
            for name in ("pyproject.toml", "backend/in_tree.py"):
                tar.add(name, arcname=f"{base}/{name}")
        return filename


    def build_wheel(wheel_directory, config_settings=None, metadata_directory=None):
        filename = f"{NAME}-{VERSION}-py3-none-any.whl"
        with zipfile.ZipFile(os.path.join(wheel_directory, filename), "w") as wheel:
            wheel.writestr(
                f"{NAME}-{VERSION}.dist-info/METADATA",
                f"Metadata-Version: 2.1\nName: in-tree-project\nVersion: {VERSION}\n",
            )
        return filename
"#};

fn pybuild() -> Command {
    let mut command = Command::cargo_bin("pybuild").unwrap();
    command
        .env_remove("PYBUILD_NO_ISOLATION")
        .env_remove("PYBUILD_SKIP_DEPENDENCY_CHECK");
    command
}

/// A project with an in-tree backend that requires `requires`.
fn project(requires: &str) -> assert_fs::TempDir {
    let project = assert_fs::TempDir::new().unwrap();
    project
        .child("pyproject.toml")
        .write_str(&formatdoc! {r#"
            [build-system]
            requires = [{requires}]
            build-backend = "in_tree"
            backend-path = ["backend"]
        "#})
        .unwrap();
    project.child("backend/in_tree.py").write_str(BACKEND).unwrap();
    project
}

#[test]
fn wheel_via_sdist() {
    let project = project("");
    pybuild()
        .arg(project.path())
        .arg("--no-isolation")
        .assert()
        .success()
        .stderr(contains(
            "Successfully built in_tree_project-0.1.0.tar.gz and in_tree_project-0.1.0-py3-none-any.whl",
        ));
    project
        .child("dist/in_tree_project-0.1.0.tar.gz")
        .assert(predicates::path::is_file());
    project
        .child("dist/in_tree_project-0.1.0-py3-none-any.whl")
        .assert(predicates::path::is_file());
}

#[test]
fn sdist_into_outdir() {
    let project = project("");
    let outdir = assert_fs::TempDir::new().unwrap();
    pybuild()
        .arg(project.path())
        .args(["--sdist", "--no-isolation", "--outdir"])
        .arg(outdir.path())
        .assert()
        .success()
        .stderr(contains("Successfully built in_tree_project-0.1.0.tar.gz"));
    outdir
        .child("in_tree_project-0.1.0.tar.gz")
        .assert(predicates::path::is_file());
    project.child("dist").assert(predicates::path::missing());
}

#[test]
fn not_a_project() {
    let project = assert_fs::TempDir::new().unwrap();
    pybuild()
        .arg(project.path())
        .assert()
        .code(1)
        .stderr(contains("error: Source"))
        .stderr(contains(
            "does not appear to be a Python project: no pyproject.toml or setup.py",
        ));
}

#[test]
fn missing_dependencies() {
    let project = project(r#""pybuild-test-not-installed>=1""#);
    pybuild()
        .arg(project.path())
        .args(["--sdist", "--no-isolation"])
        .assert()
        .code(1)
        .stderr(contains(
            "error: Missing dependencies:\n\tpybuild-test-not-installed>=1",
        ));
}

#[test]
fn skip_dependency_check() {
    let project = project(r#""pybuild-test-not-installed>=1""#);
    pybuild()
        .arg(project.path())
        .args(["--sdist", "--no-isolation"])
        .env("PYBUILD_SKIP_DEPENDENCY_CHECK", "1")
        .assert()
        .success()
        .stderr(contains("Missing build dependencies for sdist (ignored)"));
}
