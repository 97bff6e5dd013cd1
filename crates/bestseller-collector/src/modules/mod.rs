//! 백필 모듈.

pub mod backfill;
pub mod date_range;

pub use backfill::{run_backfill, run_backfill_until, SnapshotSink, SnapshotSource};
pub use date_range::{parse_date, DateRange};
