use bpc_core::device::{DeviceHandle, DeviceKind, SlopeReading};
use bpc_core::events::MonitorEvent;
use bpc_core::mocks::{DO_ADDRESS, PH_ADDRESS, RTD_ADDRESS, ScriptedBus};
use bpc_core::poller::{BusRequest, PollCfg, PollLoop, PollStatus};
use bpc_core::session::Shared;
use bpc_core::store::Sample;
use bpc_core::util::CancellableClock;
use bpc_traits::clock::test_clock::TestClock;
use chrono::{Local, TimeDelta};
use crossbeam_channel as xch;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

struct Rig {
    poll: PollLoop<ScriptedBus>,
    shared: Arc<Shared>,
    shutdown: Arc<AtomicBool>,
    events: xch::Receiver<MonitorEvent>,
    requests: xch::Sender<BusRequest>,
}

fn standard_handles() -> Vec<DeviceHandle> {
    vec![
        DeviceHandle::new(PH_ADDRESS, DeviceKind::Ph).with_settle(Duration::ZERO),
        DeviceHandle::new(RTD_ADDRESS, DeviceKind::Temperature).with_settle(Duration::ZERO),
        DeviceHandle::new(DO_ADDRESS, DeviceKind::DissolvedOxygen).with_settle(Duration::ZERO),
    ]
}

fn rig(bus: ScriptedBus, devices: Vec<DeviceHandle>, cfg: PollCfg) -> Rig {
    let shared = Arc::new(Shared::new(16));
    let shutdown = Arc::new(AtomicBool::new(false));
    let (events_tx, events_rx) = xch::unbounded();
    let (req_tx, req_rx) = xch::bounded(4);
    let clock = CancellableClock::new(Arc::new(TestClock::new()), shutdown.clone());
    let poll = PollLoop::new(
        bus,
        devices,
        shared.clone(),
        shutdown.clone(),
        events_tx,
        req_rx,
        clock,
        cfg,
    );
    Rig {
        poll,
        shared,
        shutdown,
        events: events_rx,
        requests: req_tx,
    }
}

fn next_sample(events: &xch::Receiver<MonitorEvent>) -> Sample {
    loop {
        match events.try_recv().expect("expected a pending event") {
            MonitorEvent::Sample(s) => return s,
            _ => continue,
        }
    }
}

#[test]
fn successful_ticks_fill_the_store_in_order() {
    let bus = ScriptedBus::standard_rig(
        [7.00, 7.01, 7.02, 7.03, 7.04],
        [25.0, 25.1, 25.2, 25.3, 25.4],
        [95.0, 95.1, 95.2, 95.3, 95.4],
    );
    let mut r = rig(bus, standard_handles(), PollCfg::default());
    for _ in 0..5 {
        assert_eq!(r.poll.step(), PollStatus::Running);
    }
    let store = r.shared.store.lock().unwrap();
    assert_eq!(store.len(), 5);
    let latest = store.latest().unwrap();
    assert_eq!(latest.ph, Some(7.04));
    assert_eq!(latest.temperature, Some(25.4));
    assert_eq!(latest.dissolved_oxygen, Some(95.4));
    let window = store.window_since(Local::now() - TimeDelta::hours(1));
    assert!(window.windows(2).all(|w| w[0].at <= w[1].at));
    drop(store);
    assert_eq!(next_sample(&r.events).ph, Some(7.00));
}

#[test]
fn temperature_feeds_back_into_ph_compensation() {
    let bus = ScriptedBus::standard_rig([7.0], [31.5], [95.0]);
    let mut r = rig(bus, standard_handles(), PollCfg::default());
    assert_eq!(
        r.shared.run.lock().unwrap().ph_compensation_c,
        bpc_core::INITIAL_COMPENSATION_C
    );
    assert_eq!(r.poll.step(), PollStatus::Running);
    assert_eq!(r.shared.run.lock().unwrap().ph_compensation_c, 31.5);
}

#[test]
fn failed_device_aborts_the_whole_tick() {
    // DO handle present but no DO device on the bus.
    let bus = ScriptedBus::new()
        .with_device(PH_ADDRESS, "pH", [7.0])
        .with_device(RTD_ADDRESS, "RTD", [25.0]);
    let mut r = rig(bus, standard_handles(), PollCfg::default());
    assert_eq!(r.poll.step(), PollStatus::Running);
    assert!(r.shared.store.lock().unwrap().is_empty());
    assert!(matches!(
        r.events.try_recv().unwrap(),
        MonitorEvent::Warning { .. }
    ));
}

#[test]
fn exhausted_failure_budget_is_a_fatal_disconnect() {
    let bus = ScriptedBus::standard_rig([7.0], [25.0], [95.0]);
    bus.starve_handle().store(true, Ordering::Relaxed);
    let mut r = rig(bus, standard_handles(), PollCfg::default());
    assert_eq!(r.poll.step(), PollStatus::Running);
    assert_eq!(r.poll.step(), PollStatus::Running);
    assert_eq!(r.poll.step(), PollStatus::Disconnected);
    assert!(r.shutdown.load(Ordering::Relaxed));
    let run = r.shared.run.lock().unwrap();
    assert!(!run.connected);
    assert!(!run.charting);
    assert!(!run.recording);
    drop(run);
    let fatal = r
        .events
        .try_iter()
        .any(|e| matches!(e, MonitorEvent::FatalDisconnect { .. }));
    assert!(fatal);
}

#[test]
fn a_good_tick_resets_the_failure_count() {
    let bus = ScriptedBus::standard_rig([7.0], [25.0], [95.0]);
    let starve = bus.starve_handle();
    let mut r = rig(bus, standard_handles(), PollCfg::default());
    // Two dry ticks, one good tick, two more dry ticks: the budget of
    // three is never hit because the good tick resets the count.
    starve.store(true, Ordering::Relaxed);
    assert_eq!(r.poll.step(), PollStatus::Running);
    assert_eq!(r.poll.step(), PollStatus::Running);
    starve.store(false, Ordering::Relaxed);
    assert_eq!(r.poll.step(), PollStatus::Running);
    starve.store(true, Ordering::Relaxed);
    assert_eq!(r.poll.step(), PollStatus::Running);
    assert_eq!(r.poll.step(), PollStatus::Running);
    assert_eq!(r.shared.store.lock().unwrap().len(), 1);
}

#[test]
fn shutdown_stops_before_the_next_tick() {
    let bus = ScriptedBus::standard_rig([7.0], [25.0], [95.0]);
    let mut r = rig(bus, standard_handles(), PollCfg::default());
    r.shutdown.store(true, Ordering::Relaxed);
    assert_eq!(r.poll.step(), PollStatus::Stopped);
    assert!(r.shared.store.lock().unwrap().is_empty());
}

#[test]
fn charting_emits_window_snapshots() {
    let bus = ScriptedBus::standard_rig([7.0, 7.1], [25.0; 2], [95.0; 2]);
    let mut r = rig(bus, standard_handles(), PollCfg::default());
    {
        let mut run = r.shared.run.lock().unwrap();
        run.charting = true;
        run.chart_start = Local::now() - TimeDelta::seconds(1);
    }
    r.poll.step();
    r.poll.step();
    let windows: Vec<Vec<Sample>> = r
        .events
        .try_iter()
        .filter_map(|e| match e {
            MonitorEvent::ChartWindow(w) => Some(w),
            _ => None,
        })
        .collect();
    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].len(), 1);
    assert_eq!(windows[1].len(), 2);
}

#[test]
fn slope_requests_are_serviced_between_ticks() {
    let bus = ScriptedBus::standard_rig([7.0], [25.0], [95.0]);
    let mut r = rig(bus, standard_handles(), PollCfg::default());
    let (tx, rx) = xch::bounded(1);
    r.requests.send(BusRequest::Slope { reply: tx }).unwrap();
    r.poll.step();
    let slope = rx.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
    assert_eq!(
        slope,
        SlopeReading {
            acid: 99.7,
            base: 100.3,
            zero: -0.89
        }
    );
}

#[test]
fn requested_calibration_point_is_confirmed() {
    use bpc_core::calibration::{CalPoint, PointState};
    let bus = ScriptedBus::standard_rig([7.0], [25.0], [95.0]);
    let sent = bus.calibration_log();
    let mut r = rig(bus, standard_handles(), PollCfg::default());
    {
        let mut session = r.shared.calibration.lock().unwrap();
        session.begin();
        session.request(CalPoint::Mid).unwrap();
    }
    r.poll.step();
    let session = r.shared.calibration.lock().unwrap();
    assert_eq!(session.state(CalPoint::Mid), PointState::Confirmed);
    assert_eq!(*sent.lock().unwrap(), vec!["Cal,mid,7.00".to_string()]);
}
