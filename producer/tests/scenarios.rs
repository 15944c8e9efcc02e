//! End-to-end scenarios from spec.md §8, exercised through the same
//! building blocks `producer`'s `main` composes (`pm_shm`, `pm_point`,
//! `pm_thread`), since a binary crate has no library surface for an
//! integration test to call into directly.

use std::time::Duration;

use pm_config::MAX_NUM_POINTS;
use pm_point::Point;

fn test_key(offset: i32) -> i32 {
    0x7072_6f00 + offset
}

fn run_script_synchronously(base: *mut Point, script: &str) {
    for task in script.lines().filter_map(pm_point::parse_line) {
        // Short-delay scenarios only; this harness runs tasks inline
        // rather than scheduling them on a worker thread.
        std::thread::sleep(Duration::from_millis(task.delay_seconds().min(1) * 5));
        if task.is_install() {
            pm_point::install(base, task.index, task.point);
        } else {
            pm_point::invalidate(base, task.index);
        }
    }
}

#[test]
fn scenario_one_two_installs_rest_invalid() {
    let key = test_key(1);
    let size = MAX_NUM_POINTS * std::mem::size_of::<Point>();
    let Some(addr) = pm_shm::connect(key, size) else {
        eprintln!("skipping: SysV shm unavailable in this sandbox");
        return;
    };
    let base = addr as *mut Point;
    unsafe { std::ptr::write_bytes(base, 0, MAX_NUM_POINTS) };

    run_script_synchronously(base, "0 1.0 2.0 0\n1 3.0 4.0 0\n");

    let summary = pm_point::show_points(base as *const Point, MAX_NUM_POINTS);
    assert_eq!(summary.valid_count, 2);
    assert_eq!(summary.avg_x, 2.0);
    assert_eq!(summary.avg_y, 3.0);

    let _ = pm_shm::detach(addr);
    let _ = pm_shm::destroy(key);
}

#[test]
fn scenario_two_install_then_invalidate_same_slot() {
    let key = test_key(2);
    let size = MAX_NUM_POINTS * std::mem::size_of::<Point>();
    let Some(addr) = pm_shm::connect(key, size) else {
        eprintln!("skipping: SysV shm unavailable in this sandbox");
        return;
    };
    let base = addr as *mut Point;
    unsafe { std::ptr::write_bytes(base, 0, MAX_NUM_POINTS) };

    run_script_synchronously(base, "0 1.0 2.0 1\n0 0 0 -1\n");

    let summary = pm_point::show_points(base as *const Point, MAX_NUM_POINTS);
    assert_eq!(summary.valid_count, 0);

    let _ = pm_shm::detach(addr);
    let _ = pm_shm::destroy(key);
}

#[test]
fn scenario_three_malformed_lines_dropped() {
    let key = test_key(3);
    let size = MAX_NUM_POINTS * std::mem::size_of::<Point>();
    let Some(addr) = pm_shm::connect(key, size) else {
        eprintln!("skipping: SysV shm unavailable in this sandbox");
        return;
    };
    let base = addr as *mut Point;
    unsafe { std::ptr::write_bytes(base, 0, MAX_NUM_POINTS) };

    run_script_synchronously(base, "20 0 0 0\nabc\n3 9.0 9.0 0\n");

    let summary = pm_point::show_points(base as *const Point, MAX_NUM_POINTS);
    assert_eq!(summary.valid_count, 1);

    let slot3 = unsafe { *base.add(3) };
    assert_eq!(slot3, Point::valid(9.0, 9.0));

    let _ = pm_shm::detach(addr);
    let _ = pm_shm::destroy(key);
}

#[test]
fn worker_cancelled_mid_sleep_writes_nothing() {
    let key = test_key(4);
    let size = MAX_NUM_POINTS * std::mem::size_of::<Point>();
    let Some(addr) = pm_shm::connect(key, size) else {
        eprintln!("skipping: SysV shm unavailable in this sandbox");
        return;
    };
    let base_usize = addr as usize;
    unsafe { std::ptr::write_bytes(addr as *mut Point, 0, MAX_NUM_POINTS) };

    let handle = pm_thread::execute(move || {
        pm_thread::cancellable_sleep(Duration::from_secs(10));
        if pm_thread::is_canceled() {
            return;
        }
        pm_point::install(base_usize as *mut Point, 0, Point::valid(1.0, 1.0));
    })
    .expect("execute should succeed");

    std::thread::sleep(Duration::from_millis(30));
    assert!(pm_thread::kill(handle).is_ok());
    assert!(pm_thread::wait(handle).is_ok());

    let summary = pm_point::show_points(addr as *const Point, MAX_NUM_POINTS);
    assert_eq!(summary.valid_count, 0);

    let _ = pm_shm::detach(addr);
    let _ = pm_shm::destroy(key);
}
