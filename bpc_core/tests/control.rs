use bpc_core::calibration::{CalPoint, PointState};
use bpc_core::mocks::ScriptedBus;
use bpc_core::poller::PollCfg;
use bpc_core::{Controller, MonitorError, MonitorEvent};
use bpc_traits::clock::test_clock::TestClock;
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn controller() -> Controller {
    let cfg = PollCfg {
        failure_budget: 3,
        tick_interval_ms: 0,
        settle_override_ms: Some(0),
    };
    Controller::with_settings(16, cfg).with_clock(Arc::new(TestClock::new()))
}

fn rig() -> ScriptedBus {
    ScriptedBus::standard_rig([7.0, 7.01, 7.02], [25.0, 25.1, 25.2], [95.0, 95.1, 95.2])
}

fn assert_err(err: bpc_core::Report, want: fn(&MonitorError) -> bool) {
    let e = err.downcast_ref::<MonitorError>().expect("typed error");
    assert!(want(e), "unexpected error: {e}");
}

/// Block until the loop has produced a sample that was acquired after
/// this call (pre-queued events are drained first).
fn await_fresh_sample(events: &crossbeam_channel::Receiver<MonitorEvent>) {
    while events.try_recv().is_ok() {}
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if let Ok(MonitorEvent::Sample(_)) = events.recv_timeout(Duration::from_millis(100)) {
            return;
        }
    }
    panic!("no fresh sample before the deadline");
}

#[rstest]
fn operations_require_a_connection() {
    let mut c = controller();
    assert_err(c.start_charting().unwrap_err(), |e| {
        matches!(e, MonitorError::NotConnected)
    });
    assert_err(c.start_calibration().unwrap_err(), |e| {
        matches!(e, MonitorError::NotConnected)
    });
    let dir = tempdir().unwrap();
    assert_err(
        c.start_recording(Some(dir.path()), Some("x")).unwrap_err(),
        |e| matches!(e, MonitorError::NotConnected),
    );
    assert_err(
        c.read_slope(Duration::from_millis(10)).unwrap_err(),
        |e| matches!(e, MonitorError::NotConnected),
    );
}

#[rstest]
fn recording_preconditions_are_checked_first() {
    let mut c = controller();
    assert_err(c.start_recording(None, Some("x")).unwrap_err(), |e| {
        matches!(e, MonitorError::NoTargetDirectory)
    });
    let dir = tempdir().unwrap();
    assert_err(c.start_recording(Some(dir.path()), None).unwrap_err(), |e| {
        matches!(e, MonitorError::NoUserLabel)
    });
    assert_err(
        c.start_recording(Some(dir.path()), Some("  ")).unwrap_err(),
        |e| matches!(e, MonitorError::NoUserLabel),
    );
}

#[rstest]
fn empty_bus_fails_to_connect() {
    let mut c = controller();
    let err = c.connect(ScriptedBus::new()).unwrap_err();
    assert_err(err, |e| matches!(e, MonitorError::NoDevicesFound));
    assert!(!c.is_connected());
}

#[rstest]
fn faulted_bus_yields_no_devices() {
    let mut c = controller();
    let err = c.connect(bpc_core::mocks::DeadBus).unwrap_err();
    assert_err(err, |e| matches!(e, MonitorError::NoDevicesFound));
    assert!(!c.is_connected());
}

#[rstest]
fn connect_discovers_devices_and_starts_polling() {
    let mut c = controller();
    let events = c.events();
    c.connect(rig()).unwrap();
    assert!(c.is_connected());
    assert_eq!(c.devices().len(), 3);
    // Connecting twice is a no-op.
    c.connect(rig()).unwrap();

    await_fresh_sample(&events);
    let latest = c.latest().expect("sample after polling started");
    assert!(latest.ph.is_some());
    assert!(latest.temperature.is_some());

    c.disconnect().unwrap();
    assert!(!c.is_connected());
    // Disconnecting again is harmless.
    c.disconnect().unwrap();
}

#[rstest]
fn charting_toggles_and_clear_resets_the_window() {
    let mut c = controller();
    c.connect(rig()).unwrap();
    assert!(!c.is_charting());
    c.start_charting().unwrap();
    assert!(c.is_charting());
    c.start_charting().unwrap(); // idempotent
    c.clear_chart().unwrap();
    assert!(!c.is_charting());
    c.stop_charting().unwrap(); // idempotent
}

#[rstest]
fn recording_writes_samples_and_stops_cleanly() {
    let mut c = controller();
    let events = c.events();
    c.connect(rig()).unwrap();
    let dir = tempdir().unwrap();

    let path = c.start_recording(Some(dir.path()), Some("batch")).unwrap();
    assert!(c.is_recording());
    assert!(
        path.file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("batch_")
    );
    // Starting again while recording keeps the same file.
    let same = c.start_recording(Some(dir.path()), Some("batch")).unwrap();
    assert_eq!(path, same);

    await_fresh_sample(&events);
    c.stop_recording().unwrap();
    assert!(!c.is_recording());

    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("Bioprocess Data Log"));
    assert!(lines.nth(2).unwrap().starts_with("Time\t"));
    assert!(lines.next().is_some(), "expected at least one data line");

    // A second run gets its own file even within the same second.
    let second = c.start_recording(Some(dir.path()), Some("batch")).unwrap();
    assert_ne!(path, second);
    c.stop_recording().unwrap();
}

#[rstest]
fn calibration_and_recording_are_mutually_exclusive() {
    let mut c = controller();
    c.connect(rig()).unwrap();
    let dir = tempdir().unwrap();
    c.start_recording(Some(dir.path()), Some("x")).unwrap();

    c.start_calibration().unwrap();
    assert!(c.is_calibrating());
    assert!(!c.is_recording());

    let err = c.start_recording(Some(dir.path()), Some("x")).unwrap_err();
    assert_err(err, |e| matches!(e, MonitorError::State(_)));

    c.end_calibration().unwrap();
    assert!(!c.is_calibrating());
    c.start_recording(Some(dir.path()), Some("x")).unwrap();
}

#[rstest]
fn one_point_mode_gates_the_reference_points() {
    let mut c = controller();
    c.connect(rig()).unwrap();
    c.start_calibration().unwrap();
    c.set_calibration_mode(1).unwrap();
    let err = c.request_calibration_point(CalPoint::High).unwrap_err();
    assert_err(err, |e| {
        matches!(e, MonitorError::PointNotEnabled(CalPoint::High))
    });
    assert!(c.set_calibration_mode(4).is_err());

    c.request_calibration_point(CalPoint::Mid).unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while c.calibration_state(CalPoint::Mid) != PointState::Confirmed {
        assert!(
            std::time::Instant::now() < deadline,
            "mid point never confirmed"
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[rstest]
fn slope_readback_round_trips_through_the_loop() {
    let mut c = controller();
    c.connect(rig()).unwrap();
    let slope = c.read_slope(Duration::from_secs(5)).unwrap();
    assert_eq!(slope.acid, 99.7);
    assert_eq!(slope.base, 100.3);
    assert_eq!(slope.zero, -0.89);
}

#[rstest]
fn disconnect_resets_toggles_and_closes_the_log() {
    let mut c = controller();
    c.connect(rig()).unwrap();
    let dir = tempdir().unwrap();
    c.start_recording(Some(dir.path()), Some("x")).unwrap();
    c.start_charting().unwrap();
    c.disconnect().unwrap();
    assert!(!c.is_connected());
    assert!(!c.is_recording());
    assert!(!c.is_charting());
    assert!(!c.is_calibrating());
}
