//! NYT 베스트셀러 히스토리 백필 collector.
//!
//! 이 crate는 날짜 구간의 베스트셀러 목록을 수집해 스타 스키마에 적재하는
//! 바이너리를 제공합니다:
//! - 환경변수 기반 설정 (DB 접속, NYT API 키, 재시도 정책)
//! - 날짜별 조회 → 적재 백필 루프
//! - 수집 통계

pub mod config;
pub mod error;
pub mod modules;
pub mod stats;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use stats::CollectionStats;
