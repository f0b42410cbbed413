use bpc_core::store::{RingStore, Sample};
use chrono::{Local, TimeDelta};
use rstest::rstest;

fn sample(offset_s: i64, ph: f64) -> Sample {
    Sample {
        at: Local::now() + TimeDelta::seconds(offset_s),
        ph: Some(ph),
        temperature: Some(25.0),
        dissolved_oxygen: Some(95.0),
    }
}

#[rstest]
#[case(1)]
#[case(7)]
#[case(100)]
fn length_never_exceeds_capacity(#[case] capacity: usize) {
    let mut store = RingStore::new(capacity);
    for i in 0..(capacity + 13) {
        store.push(sample(i as i64, 7.0));
        assert!(store.len() <= capacity);
    }
    assert_eq!(store.len(), capacity);
}

#[rstest]
fn overflow_evicts_oldest_first() {
    let mut store = RingStore::new(3);
    for i in 0..5 {
        store.push(sample(i, f64::from(i as i32)));
    }
    let window = store.window_since(Local::now() - TimeDelta::hours(1));
    let phs: Vec<f64> = window.iter().filter_map(|s| s.ph).collect();
    assert_eq!(phs, vec![2.0, 3.0, 4.0]);
    assert_eq!(store.latest().and_then(|s| s.ph), Some(4.0));
}

#[rstest]
fn window_is_a_chronological_suffix() {
    let mut store = RingStore::new(10);
    let t0 = Local::now();
    for i in -3..4 {
        store.push(sample(i, 7.0 + i as f64 * 0.01));
    }
    let window = store.window_since(t0);
    assert_eq!(window.len(), 4); // offsets 0..=3
    assert!(window.windows(2).all(|w| w[0].at <= w[1].at));
}

#[rstest]
fn window_after_everything_is_empty() {
    let mut store = RingStore::new(10);
    store.push(sample(0, 7.0));
    assert!(store.window_since(Local::now() + TimeDelta::hours(1)).is_empty());
}

#[rstest]
fn clear_empties_without_changing_capacity() {
    let mut store = RingStore::new(5);
    for i in 0..5 {
        store.push(sample(i, 7.0));
    }
    store.clear();
    assert!(store.is_empty());
    assert_eq!(store.capacity(), 5);
    store.push(sample(9, 7.1));
    assert_eq!(store.len(), 1);
}
