//! Reconciliation, liveness and shutdown behavior of the worker supervisor.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use hfscan_common::{DeviceState, ServiceState};
use hfscan_scanner::app::{TelemetryExporter, WorkerPhase};

use crate::common::{AlwaysDetector, Harness, ScriptedDriver, settings, wait_until};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn all_policy_tracks_detected_devices() {
    let driver = ScriptedDriver::with_devices(&["S1", "S2"]);
    let mut h = Harness::new(&settings("hfgcs = true", "all"), driver.clone());

    let report = h.supervisor.tick().await;
    assert_eq!(report.started, vec!["S1".to_string(), "S2".to_string()]);
    assert_eq!(h.supervisor.running_devices(), report.started);
    let s1_thread = h.supervisor.worker_thread("S1");
    assert!(wait_until(WAIT, || driver.opens("S2") == 1).await, "S2 opened");

    driver.set_devices(&["S1"]);
    let report = h.supervisor.tick().await;
    assert_eq!(report.stopped, vec!["S2".to_string()]);
    assert!(report.started.is_empty());
    assert_eq!(h.supervisor.running_devices(), vec!["S1".to_string()]);
    assert_eq!(h.supervisor.worker_thread("S1"), s1_thread, "S1 untouched");
    assert_eq!(driver.closes("S2"), 1, "S2 released when joined");
    assert_eq!(driver.closes("S1"), 0);

    h.supervisor.shutdown().await;
    assert_eq!(driver.closes("S1"), driver.opens("S1"));
}

#[tokio::test]
async fn explicit_selection_starts_only_detected_ids() {
    let driver = ScriptedDriver::with_devices(&["S1", "S2"]);
    let mut h = Harness::new(&settings("js8 = 1", "S1,S3"), driver.clone());

    let report = h.supervisor.tick().await;
    assert_eq!(report.detected, vec!["S1".to_string(), "S2".to_string()]);
    assert_eq!(report.selected, vec!["S1".to_string()]);
    assert_eq!(report.started, vec!["S1".to_string()]);

    driver.set_devices(&["S1", "S2", "S3"]);
    let report = h.supervisor.tick().await;
    assert_eq!(report.started, vec!["S3".to_string()], "plugged-in S3 picked up");
    assert_eq!(driver.opens("S2"), 0, "unselected device never opened");
    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn never_two_workers_for_one_device() {
    let driver = ScriptedDriver::with_devices(&["S1"]);
    let mut h = Harness::new(&settings("hfgcs = true", "all"), driver.clone());

    h.supervisor.tick().await;
    let thread = h.supervisor.worker_thread("S1");
    for _ in 0..5 {
        let report = h.supervisor.tick().await;
        assert!(report.started.is_empty());
        assert!(report.stopped.is_empty());
    }
    assert_eq!(h.supervisor.worker_thread("S1"), thread);
    assert!(wait_until(WAIT, || driver.opens("S1") == 1).await);
    h.supervisor.shutdown().await;
    assert_eq!(driver.opens("S1"), 1);
    assert_eq!(driver.closes("S1"), 1);
}

#[tokio::test]
async fn disabled_categories_idle_and_report_stopped_services() {
    let driver = ScriptedDriver::with_devices(&["S1"]);
    let mut h = Harness::new(&settings("", "all"), driver.clone());

    let report = h.supervisor.tick().await;
    assert!(
        wait_until(WAIT, || h.supervisor.worker_phase("S1") == Some(WorkerPhase::Scanning)).await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(driver.total_tunes(), 0, "idle worker never tunes");

    let status = TelemetryExporter::snapshot(&report, &h.supervisor);
    assert!(
        status
            .per_category_service_state
            .values()
            .all(|&s| s == ServiceState::Stopped)
    );
    assert_eq!(status.per_device_state["S1"], DeviceState::Active);
    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn enabling_a_category_takes_effect_without_restart() {
    let driver = ScriptedDriver::with_devices(&["S1"]);
    let mut h = Harness::new(&settings("js8 = false", "all"), driver.clone());

    h.supervisor.tick().await;
    let thread = h.supervisor.worker_thread("S1");
    assert!(
        wait_until(WAIT, || h.supervisor.worker_phase("S1") == Some(WorkerPhase::Scanning)).await
    );
    assert!(driver.tunes("S1").is_empty());

    h.source.set(&settings("js8 = true", "all"));
    assert!(
        wait_until(WAIT, || driver.tunes("S1").contains(&7078000)).await,
        "js8 frequency enters the rotation"
    );
    let report = h.supervisor.tick().await;
    assert!(report.started.is_empty() && report.stopped.is_empty());
    assert_eq!(h.supervisor.worker_thread("S1"), thread, "same worker thread");
    assert_eq!(driver.opens("S1"), 1, "handle kept open");
    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn radio_parameter_change_restarts_worker() {
    let driver = ScriptedDriver::with_devices(&["S1"]);
    let mut h = Harness::new(&settings("hfgcs = true", "all"), driver.clone());

    h.supervisor.tick().await;
    let before = h.supervisor.worker_thread("S1");
    h.source
        .set(&format!("{}\nppm_correction = 5\n", settings("hfgcs = true", "all")));
    let report = h.supervisor.tick().await;
    assert_eq!(report.stopped, vec!["S1".to_string()]);
    assert_eq!(report.started, vec!["S1".to_string()]);
    assert_ne!(h.supervisor.worker_thread("S1"), before);
    h.supervisor.shutdown().await;
    assert_eq!(driver.opens("S1"), driver.closes("S1"));
}

#[tokio::test]
async fn failed_open_is_retried_on_next_tick() {
    let driver = ScriptedDriver::with_devices(&["S1"]);
    driver.script().fail_open.insert("S1".to_string());
    let mut h = Harness::new(&settings("hfgcs = true", "all"), driver.clone());

    let report = h.supervisor.tick().await;
    assert_eq!(report.started, vec!["S1".to_string()]);
    assert!(
        wait_until(WAIT, || h.supervisor.running_devices().is_empty()).await,
        "worker gives up after one attempt"
    );
    assert_eq!(
        h.supervisor.device_states()["S1"],
        DeviceState::Inactive,
        "exited worker reported inactive"
    );

    driver.script().fail_open.clear();
    let report = h.supervisor.tick().await;
    assert_eq!(report.started, vec!["S1".to_string()], "no blacklisting");
    assert!(wait_until(WAIT, || driver.opens("S1") == 1).await);
    assert_eq!(h.supervisor.device_states()["S1"], DeviceState::Active);
    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn enumeration_fault_leaves_process_running_without_workers() {
    let driver = ScriptedDriver::with_devices(&["S1"]);
    let mut h = Harness::new(&settings("hfgcs = true", "all"), driver.clone());
    h.supervisor.tick().await;

    driver.script().enumeration_fault = true;
    let report = h.supervisor.tick().await;
    assert!(report.enumeration_fault.is_some());
    assert!(report.detected.is_empty());
    assert_eq!(report.stopped, vec!["S1".to_string()]);
    let status = TelemetryExporter::snapshot(&report, &h.supervisor);
    assert!(status.hardware_fault.is_some());
    assert!(status.per_device_state.is_empty());

    driver.script().enumeration_fault = false;
    let report = h.supervisor.tick().await;
    assert_eq!(report.started, vec!["S1".to_string()]);
    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn stuck_worker_is_force_released_and_not_duplicated() {
    let driver = ScriptedDriver::with_devices(&["S1"]);
    driver.script().capture_delay = Duration::from_millis(600);
    let mut h = Harness::with_options(
        &settings("hfgcs = true", "all"),
        driver.clone(),
        Arc::new(AlwaysDetector),
        Duration::from_millis(50),
    );

    h.supervisor.tick().await;
    assert!(wait_until(WAIT, || driver.in_capture("S1")).await);

    driver.set_devices(&[]);
    let report = h.supervisor.tick().await;
    assert_eq!(report.stopped, vec!["S1".to_string()]);
    assert_eq!(h.supervisor.draining_devices(), vec!["S1".to_string()]);

    driver.set_devices(&["S1"]);
    let report = h.supervisor.tick().await;
    assert!(report.started.is_empty(), "no second worker while the first drains");

    assert!(wait_until(WAIT, || driver.closes("S1") == 1).await, "released");
    driver.script().capture_delay = Duration::ZERO;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let report = h.supervisor.tick().await;
    assert_eq!(report.started, vec!["S1".to_string()]);
    assert!(h.supervisor.draining_devices().is_empty());

    h.supervisor.shutdown().await;
    assert_eq!(driver.opens("S1"), driver.closes("S1"), "each handle closed once");
}

#[tokio::test]
async fn out_of_range_reload_keeps_workers_running() {
    let driver = ScriptedDriver::with_devices(&["S1"]);
    let mut h = Harness::new(&settings("hfgcs = true", "all"), driver.clone());

    h.supervisor.tick().await;
    let thread = h.supervisor.worker_thread("S1");
    for bad in [
        "gain = nan",
        "center_freq_hz = nan",
        "[app]\npoll_interval_ms = 0",
        "[worker]\nscan_interval_ms = 0",
    ] {
        h.source
            .set(&format!("{}\n{bad}\n", settings("hfgcs = true", "all")));
        for _ in 0..3 {
            let report = h.supervisor.tick().await;
            assert!(report.stopped.is_empty(), "restarted on '{bad}'");
            assert!(report.started.is_empty(), "restarted on '{bad}'");
        }
        assert_eq!(h.supervisor.worker_thread("S1"), thread, "same worker after '{bad}'");
    }
    assert!(wait_until(WAIT, || driver.opens("S1") == 1).await);
    h.supervisor.shutdown().await;
    assert_eq!(driver.opens("S1"), 1, "handle never reopened");
    assert_eq!(driver.closes("S1"), 1);
}

#[tokio::test]
async fn stuck_workers_are_joined_concurrently() {
    const JOIN_TIMEOUT: Duration = Duration::from_millis(300);

    let driver = ScriptedDriver::with_devices(&["S1", "S2"]);
    driver.script().capture_delay = Duration::from_secs(2);
    let mut h = Harness::with_options(
        &settings("hfgcs = true", "all"),
        driver.clone(),
        Arc::new(AlwaysDetector),
        JOIN_TIMEOUT,
    );

    h.supervisor.tick().await;
    assert!(wait_until(WAIT, || driver.in_capture("S1") && driver.in_capture("S2")).await);

    driver.set_devices(&[]);
    let started = Instant::now();
    let report = h.supervisor.tick().await;
    let elapsed = started.elapsed();
    assert_eq!(report.stopped, vec!["S1".to_string(), "S2".to_string()]);
    assert!(elapsed >= JOIN_TIMEOUT, "returned before the timeout: {elapsed:?}");
    assert!(
        elapsed < JOIN_TIMEOUT * 2 - Duration::from_millis(50),
        "joins serialized: {elapsed:?}"
    );
    assert_eq!(
        h.supervisor.draining_devices(),
        vec!["S1".to_string(), "S2".to_string()]
    );

    driver.script().capture_delay = Duration::ZERO;
    assert!(
        wait_until(WAIT, || driver.closes("S1") == 1 && driver.closes("S2") == 1).await,
        "both handles released"
    );
    h.supervisor.shutdown().await;
}
