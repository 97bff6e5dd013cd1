//! 베스트셀러 데이터 수집 및 저장.
//!
//! 이 crate는 다음을 제공합니다:
//! - NYT Books API overview 클라이언트 (요청 한도 재시도 포함)
//! - overview 응답 → 스타 스키마 행 정규화
//! - PostgreSQL 스타 스키마 저장소 (dim_dates, dim_books, dim_lists, fact_book_rankings)

pub mod error;
pub mod provider;
pub mod snapshot;
pub mod storage;

pub use error::{DataError, Result};
pub use provider::{FetchOutcome, NytApiConfig, NytBooksClient, OverviewResponse, RetryPolicy};
pub use snapshot::{BookKey, DailySnapshot, DateRow, RankingEntry, SnapshotError};
pub use storage::{DatabaseConfig, LoadOutcome, LoadReport, Warehouse};
