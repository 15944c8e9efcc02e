use pm_log::{log_event, log_warn, Level};

use crate::point::{Point, PointSummary, PointTask};

/// Copy `point` into slot `idx` of the region at `base`. A no-op (logged
/// at Warning, never a panic) if `idx` is out of range — script-derived
/// indices reach this layer already validated by the parser, but this is
/// defense in depth, not the only check.
///
/// # Safety
/// `base` must point to at least `pm_config::MAX_NUM_POINTS` valid,
/// writable `Point` slots.
pub fn install(base: *mut Point, idx: usize, point: Point) {
    if idx >= pm_config::MAX_NUM_POINTS {
        log_warn!("pm_point::install: index {idx} out of range, ignored");
        return;
    }
    unsafe {
        std::ptr::write(base.add(idx), point);
    }
}

/// Clear the `valid` field of slot `idx`. Same bounds-check/no-panic
/// contract as [`install`].
///
/// # Safety
/// `base` must point to at least `pm_config::MAX_NUM_POINTS` valid,
/// writable `Point` slots.
pub fn invalidate(base: *mut Point, idx: usize) {
    if idx >= pm_config::MAX_NUM_POINTS {
        log_warn!("pm_point::invalidate: index {idx} out of range, ignored");
        return;
    }
    unsafe {
        (*base.add(idx)).valid = 0;
    }
}

/// Compute the valid count and mean `x`/`y` over `max` slots starting at
/// `base`, log the human-readable summary line, and return it.
///
/// # Safety
/// `base` must point to at least `max` valid, readable `Point` slots.
pub fn show_points(base: *const Point, max: usize) -> PointSummary {
    let mut valid_count = 0usize;
    let mut sum_x = 0f32;
    let mut sum_y = 0f32;

    for i in 0..max {
        let point = unsafe { *base.add(i) };
        if point.is_valid() {
            valid_count += 1;
            sum_x += point.x;
            sum_y += point.y;
        }
    }

    let (avg_x, avg_y) = if valid_count > 0 {
        (sum_x / valid_count as f32, sum_y / valid_count as f32)
    } else {
        (0.0, 0.0)
    };

    log_event(
        Level::Info,
        format!("valid_count={valid_count} avg_x={avg_x:.3} avg_y={avg_y:.3}"),
    )
    .ok();

    PointSummary {
        valid_count,
        avg_x,
        avg_y,
    }
}

/// Log one line describing a parsed task, as the producer's post-parse
/// dump does for every task before running.
pub fn show_task(task: &PointTask) {
    if task.is_install() {
        log_event(
            Level::Info,
            format!(
                "task: install index={} point=({:.3}, {:.3}) after {}s",
                task.index, task.point.x, task.point.y, task.delay
            ),
        )
        .ok();
    } else {
        log_event(
            Level::Info,
            format!(
                "task: invalidate index={} after {}s",
                task.index,
                task.delay_seconds()
            ),
        )
        .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> Vec<Point> {
        vec![Point::invalid(); pm_config::MAX_NUM_POINTS]
    }

    #[test]
    fn install_writes_in_range_slot() {
        let mut region = region();
        install(region.as_mut_ptr(), 3, Point::valid(9.0, 9.0));
        assert_eq!(region[3], Point::valid(9.0, 9.0));
    }

    #[test]
    fn install_out_of_range_is_noop() {
        let mut region = region();
        install(region.as_mut_ptr(), 999, Point::valid(1.0, 1.0));
        assert!(region.iter().all(|p| !p.is_valid()));
    }

    #[test]
    fn invalidate_clears_valid_flag_only() {
        let mut region = region();
        install(region.as_mut_ptr(), 0, Point::valid(5.0, 5.0));
        invalidate(region.as_mut_ptr(), 0);
        assert!(!region[0].is_valid());
    }

    #[test]
    fn show_points_computes_mean_over_valid_slots_only() {
        let mut region = region();
        install(region.as_mut_ptr(), 0, Point::valid(1.0, 2.0));
        install(region.as_mut_ptr(), 1, Point::valid(3.0, 4.0));
        let summary = show_points(region.as_ptr(), region.len());
        assert_eq!(summary.valid_count, 2);
        assert_eq!(summary.avg_x, 2.0);
        assert_eq!(summary.avg_y, 3.0);
    }

    #[test]
    fn show_points_on_empty_region_reports_zero() {
        let region = region();
        let summary = show_points(region.as_ptr(), region.len());
        assert_eq!(summary.valid_count, 0);
        assert_eq!(summary.avg_x, 0.0);
        assert_eq!(summary.avg_y, 0.0);
    }
}
