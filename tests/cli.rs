// ABOUTME: Integration tests for the stowage CLI commands.
// ABOUTME: Validates --help output, output directory handling and config errors.

mod support;

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn stowage_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("stowage"));
    cmd.env_remove("NXF_SINGULARITY_CACHEDIR")
        .env_remove("NXF_SINGULARITY_LIBRARYDIR")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_shows_commands() {
    stowage_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("images"));
}

#[test]
fn download_help_lists_cache_options() {
    stowage_cmd()
        .args(["download", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--cache-utilisation"))
        .stdout(predicate::str::contains("--cache-index"))
        .stdout(predicate::str::contains("--container-library"));
}

#[test]
fn unknown_container_system_is_rejected() {
    stowage_cmd()
        .args(["download", ".", "-s", "podman"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown container system"));
}

#[test]
fn download_without_containers_copies_the_tree() {
    let temp_dir = tempfile::tempdir().unwrap();
    let workflow = temp_dir.path().join("rnaseq");
    support::write_workflow(&workflow, "params.foo = 1\n", &[("fastqc", "quay.io/biocontainers/fastqc:0.12.1--hdfd78af_0")]);
    fs::create_dir_all(workflow.join(".git")).unwrap();
    fs::write(workflow.join(".git").join("HEAD"), "ref: refs/heads/main\n").unwrap();
    let outdir = temp_dir.path().join("out");

    stowage_cmd()
        .current_dir(temp_dir.path())
        .arg("download")
        .arg(&workflow)
        .args(["-r", "3.14.0", "-s", "none", "-o"])
        .arg(&outdir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Pipeline written to"));

    let tree = outdir.join("3_14_0");
    assert!(tree.join("main.nf").is_file());
    assert!(tree.join("modules/fastqc/main.nf").is_file());
    assert!(!tree.join(".git").exists(), ".git should not be copied");
    assert!(!outdir.join("none-images").exists());
}

#[test]
fn download_refuses_existing_outdir() {
    let temp_dir = tempfile::tempdir().unwrap();
    let workflow = temp_dir.path().join("rnaseq");
    support::write_workflow(&workflow, "", &[]);
    let outdir = temp_dir.path().join("out");
    fs::create_dir_all(&outdir).unwrap();

    stowage_cmd()
        .current_dir(temp_dir.path())
        .arg("download")
        .arg(&workflow)
        .args(["-s", "none", "-o"])
        .arg(&outdir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn download_force_replaces_existing_outdir() {
    let temp_dir = tempfile::tempdir().unwrap();
    let workflow = temp_dir.path().join("rnaseq");
    support::write_workflow(&workflow, "", &[]);
    let outdir = temp_dir.path().join("out");
    fs::create_dir_all(&outdir).unwrap();
    fs::write(outdir.join("stale.txt"), "old").unwrap();

    stowage_cmd()
        .current_dir(temp_dir.path())
        .arg("download")
        .arg(&workflow)
        .args(["-s", "none", "--force", "-o"])
        .arg(&outdir)
        .assert()
        .success();

    assert!(!outdir.join("stale.txt").exists());
    assert!(outdir.join("rnaseq").join("main.nf").is_file());
}

#[test]
fn docker_rejects_amend_cache() {
    let temp_dir = tempfile::tempdir().unwrap();
    let workflow = temp_dir.path().join("rnaseq");
    support::write_workflow(&workflow, "", &[]);

    stowage_cmd()
        .current_dir(temp_dir.path())
        .arg("download")
        .arg(&workflow)
        .args(["-s", "docker", "--cache-utilisation", "amend", "--cache-dir"])
        .arg(temp_dir.path().join("cache"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not supported for docker"));
}

#[test]
fn remote_cache_requires_an_index() {
    let temp_dir = tempfile::tempdir().unwrap();
    let workflow = temp_dir.path().join("rnaseq");
    support::write_workflow(&workflow, "", &[]);

    stowage_cmd()
        .current_dir(temp_dir.path())
        .arg("download")
        .arg(&workflow)
        .args(["-s", "singularity", "--cache-utilisation", "remote"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires --cache-index"));
}

#[test]
fn config_file_in_working_directory_is_used() {
    let temp_dir = tempfile::tempdir().unwrap();
    let workflow = temp_dir.path().join("rnaseq");
    support::write_workflow(&workflow, "", &[]);
    fs::write(temp_dir.path().join("stowage.yml"), "parallel: 0\n").unwrap();

    stowage_cmd()
        .current_dir(temp_dir.path())
        .arg("download")
        .arg(&workflow)
        .args(["-s", "none"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 1"));
}

#[test]
fn missing_pipeline_is_reported() {
    let temp_dir = tempfile::tempdir().unwrap();

    stowage_cmd()
        .current_dir(temp_dir.path())
        .args(["download", "nf-core/does-not-exist", "-s", "none"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a local directory"));
}

#[test]
fn json_errors_are_machine_readable() {
    let temp_dir = tempfile::tempdir().unwrap();

    stowage_cmd()
        .current_dir(temp_dir.path())
        .args(["--json", "download", "nowhere", "-s", "none"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(r#""event":"error""#));
}

#[test]
fn images_lists_module_containers() {
    let temp_dir = tempfile::tempdir().unwrap();
    let workflow = temp_dir.path().join("rnaseq");
    support::write_workflow(
        &workflow,
        "",
        &[
            ("fastqc", "quay.io/biocontainers/fastqc:0.12.1--hdfd78af_0"),
            ("multiqc", "https://depot.galaxyproject.org/singularity/multiqc:1.21--pyhdfd78af_0"),
        ],
    );

    stowage_cmd()
        .current_dir(temp_dir.path())
        .arg("images")
        .arg(&workflow)
        .arg("--legacy")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "quay.io/biocontainers/fastqc:0.12.1--hdfd78af_0\tbiocontainers-fastqc-0.12.1--hdfd78af_0.img",
        ))
        .stdout(predicate::str::contains("\tmultiqc-1.21--pyhdfd78af_0.img"));
}

#[test]
fn images_requires_a_workflow_tree() {
    let temp_dir = tempfile::tempdir().unwrap();

    stowage_cmd()
        .current_dir(temp_dir.path())
        .arg("images")
        .arg(temp_dir.path())
        .arg("--legacy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a workflow"));
}
