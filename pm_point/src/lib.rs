//! `Point`/`PointTask` payload types and the helpers that operate on a raw
//! shared-region base pointer: install, invalidate, aggregate stats, and
//! the producer's script parser.

mod ops;
mod point;
mod script;

pub use ops::{install, invalidate, show_points, show_task};
pub use point::{Point, PointSummary, PointTask};
pub use script::{parse_line, parse_script};
