//! Scan loop behavior observed through the scripted driver.

use std::{sync::Arc, time::Duration};

use hfscan_common::ScanCategory;
use hfscan_scanner::app::WorkerPhase;

use crate::common::{AlwaysDetector, Harness, ScriptedDriver, settings, wait_until};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn frequencies_are_visited_round_robin() {
    let driver = ScriptedDriver::with_devices(&["S1"]);
    let mut h = Harness::new(&settings("hfgcs = true", "all"), driver.clone());
    h.supervisor.tick().await;

    let table = ScanCategory::PrimaryVoice.frequencies();
    assert!(wait_until(WAIT, || driver.tunes("S1").len() >= 2 * table.len()).await);
    h.supervisor.shutdown().await;

    let tunes = driver.tunes("S1");
    let expected: Vec<u32> = table.iter().chain(table.iter()).copied().collect();
    assert_eq!(tunes[..expected.len()], expected[..]);
}

#[tokio::test]
async fn capture_fault_reopens_inside_the_same_worker() {
    let driver = ScriptedDriver::with_devices(&["S1"]);
    driver.script().capture_faults.insert("S1".to_string(), 1);
    let mut h = Harness::new(&settings("hfgcs = true", "all"), driver.clone());

    h.supervisor.tick().await;
    let thread = h.supervisor.worker_thread("S1");
    assert!(wait_until(WAIT, || driver.opens("S1") == 2).await, "re-opened");
    assert_eq!(driver.closes("S1"), 1, "faulted handle closed before re-open");
    assert!(
        wait_until(WAIT, || h.supervisor.worker_phase("S1") == Some(WorkerPhase::Scanning)).await
    );

    let report = h.supervisor.tick().await;
    assert!(report.started.is_empty(), "supervisor does not spawn a second worker");
    assert_eq!(h.supervisor.worker_thread("S1"), thread);
    assert_eq!(h.supervisor.running_devices(), vec!["S1".to_string()]);

    h.supervisor.shutdown().await;
    assert_eq!(driver.closes("S1"), 2);
}

#[tokio::test]
async fn empty_capture_is_a_soft_miss() {
    let driver = ScriptedDriver::with_devices(&["S1"]);
    driver.script().empty_captures = true;
    let mut h = Harness::with_options(
        &settings("js8 = true", "all"),
        driver.clone(),
        Arc::new(AlwaysDetector),
        Duration::from_secs(5),
    );

    h.supervisor.tick().await;
    assert!(wait_until(WAIT, || driver.tunes("S1").len() >= 4).await);
    assert_eq!(driver.opens("S1"), 1, "no reopen on empty captures");
    assert!(h.events.try_recv().is_err(), "nothing detected in empty blocks");
    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn detections_reach_the_relay_channel() {
    let driver = ScriptedDriver::with_devices(&["S1"]);
    let mut h = Harness::with_options(
        &settings("js8 = true", "all"),
        driver.clone(),
        Arc::new(AlwaysDetector),
        Duration::from_secs(5),
    );

    h.supervisor.tick().await;
    let event = tokio::time::timeout(WAIT, h.events.recv())
        .await
        .expect("detection within timeout")
        .expect("channel open");
    assert_eq!(event.device_id, "S1");
    assert_eq!(event.category, ScanCategory::DigitalText);
    assert_eq!(event.frequency_hz, 7078000);
    assert_eq!(event.callsign.as_deref(), Some("TEST"));
    assert!(event.raw_artifact_ref.is_none(), "recordings disabled in harness");
    h.supervisor.shutdown().await;
}

#[tokio::test]
async fn stop_is_observed_within_one_iteration() {
    let driver = ScriptedDriver::with_devices(&["S1", "S2"]);
    let mut h = Harness::new(&settings("hfgcs = true", "all"), driver.clone());
    h.supervisor.tick().await;
    assert!(wait_until(WAIT, || driver.opens("S1") == 1 && driver.opens("S2") == 1).await);

    let started = std::time::Instant::now();
    h.supervisor.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(h.supervisor.running_devices().is_empty());
    assert!(h.supervisor.device_states().is_empty());
    assert_eq!(driver.closes("S1"), 1);
    assert_eq!(driver.closes("S2"), 1);
}
