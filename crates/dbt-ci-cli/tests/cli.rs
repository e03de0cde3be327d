//! End-to-end tests driving the dbt-ci binary

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

/// Scratch directories for one run: working dir, home, prod state and project
struct Sandbox {
    cwd: TempDir,
    home: TempDir,
    prod: TempDir,
    project: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            cwd: tempfile::tempdir().unwrap(),
            home: tempfile::tempdir().unwrap(),
            prod: tempfile::tempdir().unwrap(),
            project: tempfile::tempdir().unwrap(),
        }
    }

    fn with_prod_manifest(self, checksum: &str) -> Self {
        write_manifest(&self.prod.path().join("manifest.json"), checksum);
        self
    }

    fn with_local_manifest(self, checksum: &str) -> Self {
        let target = self.project.path().join("target");
        std::fs::create_dir_all(&target).unwrap();
        write_manifest(&target.join("manifest.json"), checksum);
        self
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("dbt-ci").unwrap();
        cmd.current_dir(self.cwd.path())
            .env("HOME", self.home.path())
            .env_remove("RUST_LOG")
            .arg("--prod-manifest-dir")
            .arg(self.prod.path())
            .arg("--dbt-project-dir")
            .arg(self.project.path());
        cmd
    }
}

fn write_manifest(path: &Path, orders_checksum: &str) {
    let manifest = json!({
        "metadata": {"dbt_version": "1.8.0", "project_name": "shop"},
        "nodes": {
            "model.shop.orders": {
                "unique_id": "model.shop.orders",
                "name": "orders",
                "resource_type": "model",
                "package_name": "shop",
                "original_file_path": "models/orders.sql",
                "checksum": {"name": "sha256", "checksum": orders_checksum},
                "depends_on": {"nodes": []}
            }
        }
    });
    std::fs::write(path, manifest.to_string()).unwrap();
}

/// Split the printed dry-run command line back into tokens
fn printed_tokens(stdout: &[u8]) -> Vec<String> {
    let line = String::from_utf8(stdout.to_vec()).unwrap();
    assert_eq!(line.lines().count(), 1, "{line}");
    shell_words::split(line.trim()).unwrap()
}

fn position(tokens: &[String], token: &str) -> usize {
    tokens
        .iter()
        .position(|t| t == token)
        .unwrap_or_else(|| panic!("missing {token} in {tokens:?}"))
}

#[test]
fn docker_dry_run_prints_command_in_order() {
    let sandbox = Sandbox::new().with_prod_manifest("a");

    let output = sandbox
        .cmd()
        .args([
            "--runner",
            "docker",
            "--docker-image",
            "foo:1",
            "--docker-network",
            "host",
            "--docker-volumes",
            "/a:/b:ro",
            "--dry-run",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let tokens = printed_tokens(&output.stdout);
    assert_eq!(&tokens[..2], ["docker", "run"]);

    let network = position(&tokens, "--network");
    assert_eq!(tokens[network + 1], "host");
    let volume = position(&tokens, "/a:/b:ro");
    assert_eq!(tokens[volume - 1], "-v");
    let image = position(&tokens, "foo:1");
    assert!(network < volume && volume < image, "{tokens:?}");
    assert_eq!(
        &tokens[image + 1..image + 7],
        ["dbt", "run", "--select", "state:modified+", "--state", "/state"]
    );
}

#[test]
fn malformed_volume_is_a_config_error() {
    let sandbox = Sandbox::new().with_prod_manifest("a");

    sandbox
        .cmd()
        .args(["--runner", "docker", "--docker-volumes", "/onlyhostpath", "--dry-run"])
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Invalid volume '/onlyhostpath'"));
}

#[test]
fn missing_prod_manifest_is_a_state_comparison_error() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .arg("--dry-run")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Production manifest not found"));
}

#[test]
fn unchanged_project_runs_nothing() {
    let sandbox = Sandbox::new()
        .with_prod_manifest("a")
        .with_local_manifest("a");

    sandbox
        .cmd()
        .args(["--selection-method", "manifest", "--dbt-executable", "dbt-ci-missing-dbt"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("No modified models"));
}

#[test]
fn manifest_method_dry_run_lists_changed_models() {
    let sandbox = Sandbox::new()
        .with_prod_manifest("a")
        .with_local_manifest("b");

    let output = sandbox
        .cmd()
        .args(["--selection-method", "manifest", "--mode", "build", "--target", "ci", "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Dry run").and(predicate::str::contains("Running").not()))
        .get_output()
        .stdout
        .clone();

    assert_eq!(
        printed_tokens(&output),
        ["dbt", "build", "--select", "orders+", "--target", "ci"]
    );
}

#[test]
fn missing_dbt_is_not_found() {
    let sandbox = Sandbox::new().with_prod_manifest("a");

    sandbox
        .cmd()
        .args(["--dbt-executable", "dbt-ci-missing-dbt"])
        .assert()
        .code(127)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn config_file_supplies_docker_settings() {
    let sandbox = Sandbox::new().with_prod_manifest("a");
    std::fs::write(
        sandbox.cwd.path().join("dbt-ci.toml"),
        "runner = \"docker\"\n\n[docker]\nimage = \"bar:2\"\nvolumes = [\"/data:/data\"]\n",
    )
    .unwrap();

    let output = sandbox
        .cmd()
        .args(["--docker-volumes", "/extra:/extra", "--dry-run"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let tokens = printed_tokens(&output.stdout);
    let image = position(&tokens, "bar:2");
    assert_eq!(&tokens[image + 1..image + 3], ["dbt", "run"]);
    assert!(position(&tokens, "/data:/data") < position(&tokens, "/extra:/extra"));
}

#[test]
fn unknown_mode_is_a_usage_error() {
    let sandbox = Sandbox::new().with_prod_manifest("a");

    sandbox
        .cmd()
        .args(["--mode", "compile"])
        .assert()
        .code(2);
}

#[cfg(unix)]
#[test]
fn local_run_mirrors_dbt_exit_code() {
    use std::os::unix::fs::PermissionsExt;

    let sandbox = Sandbox::new().with_prod_manifest("a");
    let bin = tempfile::tempdir().unwrap();
    let log = bin.path().join("dbt.log");
    let script = bin.path().join("dbt");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\necho \"$@\" >> '{log}'\nif [ \"$1\" = --quiet ]; then echo orders; exit 0; fi\nexit 5\n",
            log = log.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    sandbox
        .cmd()
        .arg("--dbt-executable")
        .arg(&script)
        .assert()
        .code(5)
        .stderr(predicate::str::contains("Running"));

    let prod = sandbox.prod.path().display().to_string();
    let calls = std::fs::read_to_string(&log).unwrap();
    let calls: Vec<&str> = calls.lines().collect();
    assert_eq!(
        calls,
        [
            format!("--quiet ls --select state:modified+ --state {prod} --resource-type model --output name"),
            format!("run --select state:modified+ --state {prod}"),
        ]
    );
}
