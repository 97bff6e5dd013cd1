//! 스토리지 구현.

pub mod warehouse;

pub use warehouse::{DatabaseConfig, LoadOutcome, LoadReport, Warehouse};
