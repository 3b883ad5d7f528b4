//! The `hfscan` binary end to end, on the built-in simulator.

use std::{
    env, fs,
    path::PathBuf,
    process::{Command, Stdio},
    time::Duration,
};

use hfscan_common::{DeviceState, StatusSnapshot};

use crate::common::{KillOnDrop, wait_until};

fn test_dir(name: &str) -> PathBuf {
    let dir = env::temp_dir().join(format!("hfscan_it_{name}_{}", std::process::id()));
    drop(fs::remove_dir_all(&dir));
    fs::create_dir_all(&dir).expect("failed to create test dir");
    dir
}

fn write_config(dir: &PathBuf, extra: &str) -> PathBuf {
    let path = dir.join("hfscan.toml");
    fs::write(
        &path,
        format!(
            r#"
            [scan_services]
            hfgcs = "yes"

            [sdr_selection]
            selected_devices = "all"

            [sdr]
            sample_rate = 1000

            [app]
            poll_interval_ms = 100

            [worker]
            scan_interval_ms = 20
            capture_secs = 0.01

            [db]
            path = ":memory:"

            [simulator]
            devices = ["SIM2", "SIM1"]
            {extra}
            "#
        ),
    )
    .expect("failed to write config");
    path
}

fn hfscan(args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_hfscan"));
    cmd.args(args).env("HFSCAN_INTEGRATION_TEST", "1");
    cmd
}

#[test]
fn devices_lists_simulated_receivers_sorted() {
    let dir = test_dir("devices");
    let config = write_config(&dir, "");
    let output = hfscan(&["devices", "--config", config.to_str().unwrap()])
        .output()
        .expect("failed to run hfscan");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "SIM1\nSIM2\n");
}

#[test]
fn missing_config_is_an_error() {
    let output = hfscan(&["devices", "--config", "/nonexistent/hfscan.toml"])
        .output()
        .expect("failed to run hfscan");
    assert!(!output.status.success());
}

#[test]
fn recent_messages_on_empty_store() {
    let dir = test_dir("messages");
    let config = write_config(&dir, "");
    let output = hfscan(&[
        "messages",
        "--config",
        config.to_str().unwrap(),
        "recent",
        "--category",
        "hfgcs",
    ])
    .output()
    .expect("failed to run hfscan");
    assert!(output.status.success());
    let messages: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(messages, serde_json::json!([]));

    let output = hfscan(&["messages", "--config", config.to_str().unwrap(), "delete", "js8", "1"])
        .output()
        .expect("failed to run hfscan");
    assert!(!output.status.success(), "deleting a missing message fails");
}

#[tokio::test]
async fn run_exports_status_for_the_dashboard() {
    let dir = test_dir("run");
    let config = write_config(&dir, "fail_open = [\"SIM2\"]");
    let child = hfscan(&["run", "--config", config.to_str().unwrap()])
        .stdout(Stdio::null())
        .spawn()
        .expect("failed to start hfscan");
    let _guard = KillOnDrop(child);

    let status_file = dir.join("hfscan_data").join("status.json");
    let read_status = || -> Option<StatusSnapshot> {
        serde_json::from_slice(&fs::read(&status_file).ok()?).ok()
    };
    assert!(
        wait_until(Duration::from_secs(10), || {
            read_status().is_some_and(|s| s.per_device_state.get("SIM1") == Some(&DeviceState::Active))
        })
        .await,
        "SIM1 reported active"
    );

    let status = read_status().expect("status readable");
    assert_eq!(status.detected_devices, vec!["SIM1".to_string(), "SIM2".to_string()]);
    assert_eq!(status.selected_devices, status.detected_devices);
    assert!(
        status.per_device_state.contains_key("SIM2"),
        "SIM2 keeps being retried"
    );

    let dashboard: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.join("hfscan_data").join("config.json")).unwrap())
            .unwrap();
    assert_eq!(dashboard["scan_services"]["hfgcs"], true);
    assert_eq!(dashboard["selected_devices"], "all");
    assert!(dir.join("hfscan_data").join("messages.json").exists());
}
