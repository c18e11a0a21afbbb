#![cfg(feature = "python")]

use pybuild_python::{AmbientEnvironment, Interpreter, PythonEnvironment};

#[test]
fn query_python_on_path() {
    let interpreter = Interpreter::find(None).unwrap();
    assert!(interpreter.sys_executable().is_absolute());
    assert_eq!(interpreter.version().release()[0], 3);
    assert!(!interpreter.sys_path().is_empty());
    assert!(
        interpreter
            .markers()
            .python_full_version
            .string
            .starts_with(&interpreter.markers().python_version.string)
    );
}

#[test]
fn ambient_environment_refuses_to_install() {
    let environment = AmbientEnvironment::new(Interpreter::find(None).unwrap());
    let err = environment.install(&["wheel".to_string()]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Installing requirements (wheel) into the ambient environment is disabled"
    );
    // Scanning the ambient site-packages works whatever is installed there.
    environment.installed().unwrap();
}
