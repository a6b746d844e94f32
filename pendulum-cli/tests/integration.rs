//! Integration tests for the pendulum CLI.
//!
//! These tests run the actual binary and verify end-to-end behavior.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

fn binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pendulum"))
}

/// Fresh per-test output directory under the system temp dir.
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pendulum-cli-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

#[test]
fn help_lists_commands_and_controls() {
    let output = Command::new(binary_path())
        .arg("help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("run [options]"), "Should describe the run command");
    assert!(stderr.contains("--max-time"), "Should list run options");
    assert!(stderr.contains("TUI Controls"), "Should list the TUI keys");
}

#[test]
fn run_settles_and_writes_three_plots() {
    let dir = scratch_dir("settle");

    let output = Command::new(binary_path())
        .args(["run", "-o", dir.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "run failed: {}", stderr);
    assert!(stderr.contains("SETTLED"), "Should report settling: {}", stderr);

    for name in ["angle_graph.png", "ang_spd_graph.png", "phase_diagram.png"] {
        let path = dir.join(name);
        assert!(path.exists(), "Missing plot {:?}", path);
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[1..4], b"PNG", "{} should be a PNG", name);
    }

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn run_without_keep_leaves_no_files() {
    let dir = scratch_dir("no-keep");

    let output = Command::new(binary_path())
        .args(["run", "-t", "1", "--no-keep", "-o", dir.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not retained"));
    let leftover = fs::read_dir(&dir).map(|entries| entries.count()).unwrap_or(0);
    assert_eq!(leftover, 0, "plots should be removed after rendering");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn max_time_stops_early_and_json_goes_to_stdout() {
    let dir = scratch_dir("json");

    let output = Command::new(binary_path())
        .args(["run", "-t", "2", "--json", "-", "-o", dir.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("stdout should be JSON");

    assert_eq!(json["outcome"], "time limit");
    assert_eq!(json["iterations"], 200);
    assert_eq!(json["parameters"]["initial_angle_deg"], 70.0);
    let samples = json["samples"].as_array().unwrap();
    assert_eq!(samples.len(), 200);
    assert!(samples[0]["time"].as_f64().unwrap() > 0.0);
    assert!(json["generated_at"].as_str().is_some());

    // Early stops still plot what was logged
    assert!(dir.join("phase_diagram.png").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn undamped_run_stops_at_the_default_cap() {
    let dir = scratch_dir("undamped");

    let output = Command::new(binary_path())
        .args(["run", "-k", "0", "--no-keep", "--json", "-", "-o", dir.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No damping"), "Should explain the cap: {}", stderr);
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["outcome"], "time limit");
    assert_eq!(json["iterations"], 6000);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn max_time_is_not_overshot() {
    let dir = scratch_dir("short");

    let output = Command::new(binary_path())
        .args(["run", "-t", "0.07", "--no-keep", "--json", "-", "-o", dir.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["iterations"], 7);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn config_file_is_applied_and_flags_override_it() {
    let dir = scratch_dir("config");
    fs::create_dir_all(&dir).unwrap();
    let config_path = dir.join("sim.yaml");
    fs::write(&config_path, "damping: 0.0\nangle_deg: 10\nretain_plots: false\n").unwrap();

    let output = Command::new(binary_path())
        .args([
            "run",
            "-c",
            config_path.to_str().unwrap(),
            "-a",
            "20",
            "-t",
            "0.5",
            "--json",
            "-",
            "-o",
            dir.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["parameters"]["damping"], 0.0);
    assert_eq!(json["parameters"]["initial_angle_deg"], 20.0);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn zero_mass_is_rejected() {
    let output = Command::new(binary_path())
        .args(["run", "-m", "0"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "zero mass should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error"), "Should print an error: {}", stderr);
}

#[test]
fn non_numeric_input_is_rejected() {
    let output = Command::new(binary_path())
        .args(["run", "--gravity", "lots"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
}

#[test]
fn unknown_tui_argument_is_an_error() {
    let output = Command::new(binary_path())
        .arg("--bogus")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unexpected arguments"));
}
