use std::path::Path;

use pm_log::log_warn;

use crate::point::{Point, PointTask};

/// Parse one whitespace-delimited script line (`<index> <x> <y> <delay>`).
/// Malformed lines (fewer than four parseable fields) and out-of-range
/// indices are dropped with a logged warning rather than surfaced as an
/// error — spec.md §3 makes these line-local, non-fatal events.
pub fn parse_line(line: &str) -> Option<PointTask> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        log_warn!("pm_point: malformed script line (need 4 fields): {line:?}");
        return None;
    }

    let index: usize = match fields[0].parse() {
        Ok(v) => v,
        Err(_) => {
            log_warn!("pm_point: malformed index in script line: {line:?}");
            return None;
        }
    };
    let x: f32 = match fields[1].parse() {
        Ok(v) => v,
        Err(_) => {
            log_warn!("pm_point: malformed x in script line: {line:?}");
            return None;
        }
    };
    let y: f32 = match fields[2].parse() {
        Ok(v) => v,
        Err(_) => {
            log_warn!("pm_point: malformed y in script line: {line:?}");
            return None;
        }
    };
    let delay: i32 = match fields[3].parse() {
        Ok(v) => v,
        Err(_) => {
            log_warn!("pm_point: malformed delay in script line: {line:?}");
            return None;
        }
    };

    if index >= pm_config::MAX_NUM_POINTS {
        log_warn!(
            "pm_point: index {index} out of range [0, {}), dropping line: {line:?}",
            pm_config::MAX_NUM_POINTS
        );
        return None;
    }

    let point = if delay >= 0 {
        Point::valid(x, y)
    } else {
        Point::invalid()
    };

    Some(PointTask {
        index,
        delay,
        point,
    })
}

/// Parse every line of `path` into a task sequence, dropping malformed
/// lines in place (parsing never fails outright on bad content — only on
/// the file itself being unreadable).
pub fn parse_script(path: &Path) -> std::io::Result<Vec<PointTask>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().filter_map(parse_line).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_install_line() {
        let task = parse_line("0 1.0 2.0 0").unwrap();
        assert_eq!(task.index, 0);
        assert_eq!(task.delay, 0);
        assert_eq!(task.point, Point::valid(1.0, 2.0));
    }

    #[test]
    fn parses_negative_delay_as_invalidate() {
        let task = parse_line("0 0 0 -1").unwrap();
        assert_eq!(task.index, 0);
        assert_eq!(task.delay, -1);
        assert!(!task.is_install());
    }

    #[test]
    fn drops_malformed_line() {
        assert!(parse_line("abc").is_none());
    }

    #[test]
    fn drops_out_of_range_index() {
        assert!(parse_line("20 0 0 0").is_none());
    }

    #[test]
    fn scenario_three_script() {
        let tasks: Vec<PointTask> = "20 0 0 0\nabc\n3 9.0 9.0 0\n"
            .lines()
            .filter_map(parse_line)
            .collect();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].index, 3);
        assert_eq!(tasks[0].point, Point::valid(9.0, 9.0));
    }

    #[test]
    fn parsing_twice_is_idempotent() {
        let script = "0 1.0 2.0 0\n1 3.0 4.0 0\n";
        let first: Vec<PointTask> = script.lines().filter_map(parse_line).collect();
        let second: Vec<PointTask> = script.lines().filter_map(parse_line).collect();
        assert_eq!(first, second);
    }
}
