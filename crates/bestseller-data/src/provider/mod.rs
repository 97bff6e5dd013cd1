//! 외부 데이터 소스.

pub mod nyt;

pub use nyt::{FetchOutcome, NytApiConfig, NytBooksClient, OverviewResponse, RetryPolicy};
