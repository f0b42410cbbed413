use bpc_core::datalog::DataLog;
use bpc_core::store::Sample;
use chrono::{Local, TimeZone};
use rstest::rstest;
use tempfile::tempdir;

fn sample() -> Sample {
    Sample {
        at: Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
        ph: Some(7.004),
        temperature: Some(25.13),
        dissolved_oxygen: None,
    }
}

#[rstest]
fn header_and_lines_match_the_log_format() {
    let dir = tempdir().unwrap();
    let started = Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 50).unwrap();
    let mut log = DataLog::create(dir.path(), "batch7", started).unwrap();
    log.append(&sample()).unwrap();
    log.close().unwrap();

    let name = log.path().file_name().unwrap().to_str().unwrap();
    assert_eq!(name, "batch7_20260314092650.txt");

    let text = std::fs::read_to_string(log.path()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Bioprocess Data Log");
    assert_eq!(lines[1], "Start time:\t2026-03-14 09:26:50");
    assert_eq!(lines[2], "");
    assert_eq!(lines[3], "Time\tpH\tRTD\tDO");
    assert_eq!(lines[4], "2026-03-14 09:26:53\t7.004\t25.130\tNaN");
}

#[rstest]
fn closed_log_refuses_appends() {
    let dir = tempdir().unwrap();
    let mut log = DataLog::create(dir.path(), "x", Local::now()).unwrap();
    log.close().unwrap();
    assert!(log.is_closed());
    assert!(log.append(&sample()).is_err());
}

#[rstest]
fn same_second_restart_gets_a_distinct_file() {
    let dir = tempdir().unwrap();
    let started = Local.with_ymd_and_hms(2026, 3, 14, 10, 0, 0).unwrap();
    let first = DataLog::create(dir.path(), "run", started).unwrap();
    let second = DataLog::create(dir.path(), "run", started).unwrap();
    assert_ne!(first.path(), second.path());
    assert!(second.path().to_str().unwrap().ends_with("_1.txt"));
}
