//! End-to-end tests driving the `ocifit` binary against local Dockerfiles.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

const DOCKERFILE: &str = r#"
ARG UBUNTU_VERSION=22.04
FROM ubuntu:${UBUNTU_VERSION}
LABEL org.opencontainers.image.title="mpi-app"
ENV MPI_HOME=/opt/openmpi
RUN apt-get update && apt-get install -y openmpi-bin libopenmpi-dev
EXPOSE 9090 8080
WORKDIR /app
CMD ["mpirun", "-n", "2", "./app"]
"#;

/// Run `ocifit` with an isolated home and cache directory.
fn ocifit(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ocifit"))
        .args(args)
        .current_dir(home)
        .env("HOME", home)
        .env("OCIFIT_CACHE_DIR", home.join("cache"))
        .env_remove("OCIFIT_PARSER")
        .env_remove("OCIFIT_PATTERN")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run ocifit")
}

fn write_dockerfile(dir: &Path) -> String {
    let path = dir.join("Dockerfile");
    std::fs::write(&path, DOCKERFILE).unwrap();
    path.to_string_lossy().into_owned()
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

#[test]
fn test_compat_local_dockerfile_flat() {
    let home = TempDir::new().unwrap();
    let dockerfile = write_dockerfile(home.path());

    let output = ocifit(home.path(), &["compat", &dockerfile]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let spec = stdout_json(&output);
    assert_eq!(spec["base_image"], "ubuntu:22.04");
    assert_eq!(spec["os_name"], "ubuntu");
    assert_eq!(spec["expose"], serde_json::json!(["8080", "9090"]));
    assert_eq!(
        spec["packages"],
        serde_json::json!(["libopenmpi-dev", "openmpi-bin"])
    );
    assert_eq!(spec["cmd"], "mpirun -n 2 ./app");
    assert!(spec.get("uri").is_none());
    assert!(spec.get("volumes").is_none());
}

#[test]
fn test_compat_is_idempotent() {
    let home = TempDir::new().unwrap();
    let dockerfile = write_dockerfile(home.path());

    let first = ocifit(home.path(), &["compat", &dockerfile, "--compact"]);
    let second = ocifit(home.path(), &["compat", &dockerfile, "--compact"]);
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
    assert_eq!(String::from_utf8_lossy(&first.stdout).trim().lines().count(), 1);
}

#[test]
fn test_compat_compspec_parser() {
    let home = TempDir::new().unwrap();
    let dockerfile = write_dockerfile(home.path());

    let output = ocifit(
        home.path(),
        &["compat", &dockerfile, "--parser", "compspec", "--model", "mpi-rules"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let spec = stdout_json(&output);
    assert_eq!(spec["annotations"]["compat.parser"], "compspec");
    assert_eq!(spec["annotations"]["compat.model"], "mpi-rules");
    assert_eq!(spec["version"], "v1alpha1");
    let record = &spec["compatibilities"][0];
    assert_eq!(record["compspec.os.name"], "ubuntu");
    assert_eq!(record["compspec.expose"], "8080,9090");
    assert_eq!(record["compspec.env.MPI_HOME"], "/opt/openmpi");
    assert_eq!(record["compspec.package.openmpi-bin"], "true");
}

#[test]
fn test_compat_invalid_reference() {
    let home = TempDir::new().unwrap();

    let output = ocifit(home.path(), &["compat", "not-a-path-or-uri", "--save"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not-a-path-or-uri is not a valid Docker URI or existing filepath"));

    // Nothing was cached
    let listing = ocifit(home.path(), &["cache", "ls", "--quiet"]);
    assert!(listing.status.success());
    assert!(listing.stdout.is_empty());
}

#[test]
fn test_compat_save_without_uri_prints_spec() {
    let home = TempDir::new().unwrap();
    let dockerfile = write_dockerfile(home.path());

    let output = ocifit(home.path(), &["compat", &dockerfile, "--save"]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["base_image"], "ubuntu:22.04");
}

#[test]
fn test_compat_unknown_parser() {
    let home = TempDir::new().unwrap();
    let dockerfile = write_dockerfile(home.path());

    let output = ocifit(home.path(), &["compat", &dockerfile, "--parser", "podman"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown parser 'podman'"));
}

#[test]
fn test_parsers_lists_variants() {
    let home = TempDir::new().unwrap();

    let output = ocifit(home.path(), &["parsers", "--quiet"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "compspec\ndockerfile\n");
}

#[test]
fn test_cache_show_missing_entry() {
    let home = TempDir::new().unwrap();

    let output = ocifit(home.path(), &["cache", "show", "ghcr.io/org/app:1.0"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No cached spec for ghcr.io/org/app:1.0"));
}

#[test]
fn test_cache_commands_reject_unknown_parser() {
    let home = TempDir::new().unwrap();

    for args in [
        &["cache", "show", "ghcr.io/org/app:1.0", "--parser", "../../ocifit-escape"][..],
        &["cache", "rm", "ghcr.io/org/app:1.0", "--parser", "compsepc"][..],
        &["cache", "ls", "--parser", "compsepc"][..],
    ] {
        let output = ocifit(home.path(), args);
        assert!(!output.status.success(), "{args:?}");
        assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown parser"));
    }
    assert!(!home.path().parent().unwrap().join("ocifit-escape").exists());
    assert!(!home.path().join("cache").join("compsepc").exists());
}

#[test]
fn test_config_file_sets_default_parser() {
    let home = TempDir::new().unwrap();
    let dockerfile = write_dockerfile(home.path());
    let config = home.path().join("ocifit.yaml");
    std::fs::write(&config, "parser: compspec\n").unwrap();

    let output = ocifit(
        home.path(),
        &["compat", &dockerfile, "--config", config.to_str().unwrap()],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout_json(&output)["annotations"]["compat.parser"], "compspec");
}

#[test]
fn test_version() {
    let home = TempDir::new().unwrap();
    let output = ocifit(home.path(), &["version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("ocifit version "));
}
