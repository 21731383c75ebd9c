mod common;

use std::{fs, process::Command};

use tempfile::TempDir;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_mtcnn-cli"))
}

#[test]
fn missing_arguments_fail_with_usage() {
    let output = cli().output().expect("execute CLI");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("input_dir") || stderr.contains("INPUT_DIR"));
}

#[test]
fn missing_model_directory_is_a_startup_error() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let input_dir = temp_dir.path().join("input");
    let output_dir = temp_dir.path().join("output");
    fs::create_dir_all(&input_dir).expect("create input dir");

    let output = cli()
        .args([
            input_dir.to_str().unwrap(),
            output_dir.to_str().unwrap(),
            "--model-dir",
            temp_dir.path().join("no-models").to_str().unwrap(),
        ])
        .output()
        .expect("execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("model directory not found"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn malformed_config_file_is_a_startup_error() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let input_dir = temp_dir.path().join("input");
    let output_dir = temp_dir.path().join("output");
    fs::create_dir_all(&input_dir).expect("create input dir");
    let config = temp_dir.path().join("settings.json");
    fs::write(&config, "{ definitely not json").expect("write config");

    let output = cli()
        .args([
            input_dir.to_str().unwrap(),
            output_dir.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
        ])
        .output()
        .expect("execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("failed to parse settings JSON"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn reports_the_three_counts_with_real_models() {
    let Some(model_dir) = common::find_model_dir() else {
        eprintln!("Skipping test: stage networks not found");
        return;
    };

    let temp_dir = TempDir::new().expect("create temp dir");
    let input_dir = temp_dir.path().join("input");
    let output_dir = temp_dir.path().join("output");
    fs::create_dir_all(&input_dir).expect("create input dir");
    common::seed_image(&input_dir, "alice", "a.jpg", 230);

    let output = cli()
        .args([
            input_dir.to_str().unwrap(),
            output_dir.to_str().unwrap(),
            "--model-dir",
            model_dir.to_str().unwrap(),
            "--image_size",
            "160",
            "--seed",
            "1",
        ])
        .output()
        .expect("execute CLI");

    if !output.status.success() {
        eprintln!("CLI stderr: {}", String::from_utf8_lossy(&output.stderr));
    }
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Total number of images: 1"));
    assert!(stdout.contains("Number of pre-aligned images: 0"));
}
