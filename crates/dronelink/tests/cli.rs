#![cfg(all(unix, feature = "cli"))]

use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_region(tag: &str) -> String {
    format!(
        "dlcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .subsec_nanos()
    )
}

fn dronelink() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_dronelink"));
    command
        .env_remove("DRONELINK_REGION")
        .env_remove("DRONELINK_SOURCE")
        .arg("--log-level")
        .arg("error");
    command
}

fn probe(region: &str) -> Output {
    dronelink()
        .args(["--format", "json", "probe", "--region", region])
        .output()
        .expect("probe should run")
}

fn wait_for_frame(region: &str, timeout: Duration) -> serde_json::Value {
    let start = Instant::now();
    loop {
        let out = probe(region);
        if out.status.success() {
            let value: serde_json::Value =
                serde_json::from_slice(&out.stdout).expect("probe output should be json");
            if value["status"] == "frame" {
                return value;
            }
        }
        if start.elapsed() >= timeout {
            panic!("no frame published within {timeout:?}");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn spawn_producer(region: &str) -> Child {
    dronelink()
        .args([
            "produce",
            "--region",
            region,
            "--source",
            "pattern:64x48",
            "--interval",
            "10ms",
            "--no-snapshot",
        ])
        .stdout(Stdio::null())
        .spawn()
        .expect("producer should start")
}

fn send_signal(child: &Child, signal: &str) {
    let status = Command::new("kill")
        .arg(format!("-{signal}"))
        .arg(child.id().to_string())
        .status()
        .expect("kill should run");
    assert!(status.success());
}

fn send_sigterm(child: &Child) {
    send_signal(child, "TERM");
}

fn shutdown_steps(value: &serde_json::Value) -> Vec<&str> {
    value["shutdown"]
        .as_array()
        .expect("shutdown steps")
        .iter()
        .map(|s| s["step"].as_str().expect("step name"))
        .collect()
}

const SHUTDOWN_ORDER: [&str; 4] = [
    "land",
    "close flight link",
    "terminate producer",
    "release frame region",
];

#[test]
fn probe_of_missing_region_exits_with_region_error() {
    let out = probe(&unique_region("missing"));
    assert_eq!(out.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("attach failed"), "stderr: {stderr}");
}

#[test]
fn producer_publishes_frames_and_unlinks_on_sigterm() {
    let region = unique_region("produce");
    let mut child = spawn_producer(&region);

    let value = wait_for_frame(&region, Duration::from_secs(5));
    assert_eq!(value["header"]["width"], 64);
    assert_eq!(value["header"]["height"], 48);
    assert_eq!(value["header"]["payload_size"], 64 * 48 * 3);
    assert_eq!(value["detail"], "64x48 rgb8");

    send_sigterm(&child);
    let status = child.wait().expect("producer should exit");
    assert_eq!(status.code(), Some(0));

    assert_eq!(probe(&region).status.code(), Some(3));
}

#[test]
fn scripted_pilot_session_shuts_down_in_order() {
    let region = unique_region("pilot");
    let out = dronelink()
        .args([
            "--format",
            "json",
            "pilot",
            "--region",
            &region,
            "--source",
            "pattern:64x48",
            "--interval",
            "10ms",
            "--no-snapshot",
            "--keys",
            "1w5..",
            "--land-wait",
            "10ms",
        ])
        .stdin(Stdio::null())
        .output()
        .expect("pilot should run");

    let stderr = String::from_utf8_lossy(&out.stderr);
    assert_eq!(out.status.code(), Some(0), "stderr: {stderr}");

    let value: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("pilot summary should be json");
    assert_eq!(value["stop_reason"], "exit_key");
    assert_eq!(value["ticks"], 6);
    assert_eq!(value["commands_sent"], 5);
    assert_eq!(value["battery"], 100);

    assert_eq!(shutdown_steps(&value), SHUTDOWN_ORDER);
    assert!(value["shutdown"]
        .as_array()
        .unwrap()
        .iter()
        .all(|s| s["error"].is_null()));

    // The spawned producer took the region with it.
    assert_eq!(probe(&region).status.code(), Some(3));
}

#[test]
fn interrupted_pilot_runs_ordered_shutdown() {
    let region = unique_region("sigint");
    let idle = ".".repeat(3000);
    let child = dronelink()
        .args([
            "--format",
            "json",
            "pilot",
            "--region",
            &region,
            "--source",
            "pattern:64x48",
            "--interval",
            "10ms",
            "--no-snapshot",
            "--keys",
            &idle,
            "--land-wait",
            "10ms",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("pilot should start");

    wait_for_frame(&region, Duration::from_secs(5));
    send_signal(&child, "INT");
    let out = child.wait_with_output().expect("pilot should exit");

    let stderr = String::from_utf8_lossy(&out.stderr);
    assert_eq!(out.status.code(), Some(0), "stderr: {stderr}");

    let value: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("pilot summary should be json");
    assert_eq!(value["stop_reason"], "interrupted");
    assert!(value["ticks"].as_u64().unwrap() < 3000);
    assert_eq!(shutdown_steps(&value), SHUTDOWN_ORDER);
    assert!(value["shutdown"]
        .as_array()
        .unwrap()
        .iter()
        .all(|s| s["error"].is_null()));

    // The producer was stopped as a shutdown step, not by the signal.
    assert_eq!(probe(&region).status.code(), Some(3));
}

#[test]
fn oversized_frame_limits_are_usage_errors() {
    let out = dronelink()
        .args([
            "produce",
            "--region",
            &unique_region("huge"),
            "--no-snapshot",
            "--max-width",
            "4294967295",
            "--max-height",
            "4294967295",
        ])
        .output()
        .expect("produce should run");
    assert_eq!(out.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("invalid frame limits"), "stderr: {stderr}");
}

#[test]
fn probe_rejects_malformed_region_name() {
    let out = probe("cam/zero");
    assert_eq!(out.status.code(), Some(64));
}

#[test]
fn pilot_without_producer_fails_to_attach() {
    let out = dronelink()
        .args([
            "pilot",
            "--no-spawn",
            "--region",
            &unique_region("nospawn"),
            "--attach-attempts",
            "1",
            "--keys",
            "",
        ])
        .stdin(Stdio::null())
        .output()
        .expect("pilot should run");
    assert_eq!(out.status.code(), Some(3));
    assert!(out.stdout.is_empty());
}

#[test]
fn pilot_attaches_to_external_producer_and_leaves_it_running() {
    let region = unique_region("external");
    let mut child = spawn_producer(&region);
    wait_for_frame(&region, Duration::from_secs(5));

    let out = dronelink()
        .args([
            "--format",
            "json",
            "pilot",
            "--no-spawn",
            "--region",
            &region,
            "--keys",
            "..",
            "--land-wait",
            "10ms",
        ])
        .stdin(Stdio::null())
        .output()
        .expect("pilot should run");
    assert_eq!(out.status.code(), Some(0));

    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert!(value["frames_rendered"].as_u64().unwrap() >= 1);
    assert_eq!(probe(&region).status.code(), Some(0));

    send_sigterm(&child);
    assert_eq!(child.wait().unwrap().code(), Some(0));
}

#[test]
fn version_prints_package_version() {
    let out = dronelink()
        .arg("version")
        .output()
        .expect("version should run");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(
        stdout.trim(),
        format!("dronelink {}", env!("CARGO_PKG_VERSION"))
    );
}
