//! overview 응답을 스타 스키마 행으로 정규화.
//!
//! 응답 하나는 발행일 하나를 공유하므로 날짜 차원 행은 항상 1개이고,
//! 목록/도서 차원 행은 스냅샷 안에서 중복 제거됩니다.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use crate::provider::nyt::OverviewResponse;

/// 정규화할 수 없는 응답 형태.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// 응답이 없거나 `results`가 비어 있음
    #[error("results are empty")]
    NoResults,
    /// `results.lists`가 없거나 비어 있음
    #[error("lists are empty")]
    NoLists,
    /// `published_date`가 없거나 형식이 잘못됨
    #[error("invalid published_date: {0}")]
    InvalidDate(String),
}

/// `dim_dates` 행.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRow {
    pub date: NaiveDate,
    pub year: i32,
    pub quarter: i32,
    pub month: i32,
    pub day: i32,
}

impl DateRow {
    pub fn new(date: NaiveDate) -> Self {
        let month = date.month() as i32;
        Self {
            date,
            year: date.year(),
            quarter: (month - 1) / 3 + 1,
            month,
            day: date.day() as i32,
        }
    }
}

/// `dim_books` 자연 키 (title, author, publisher).
///
/// author/publisher가 없으면 빈 문자열로 저장합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BookKey {
    pub title: String,
    pub author: String,
    pub publisher: String,
}

/// (목록, 도서, 순위) 한 건. `fact_book_rankings` 행의 재료.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingEntry {
    pub list_name: String,
    pub book: BookKey,
    pub rank: i32,
}

/// 하루치 스냅샷.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailySnapshot {
    pub date: DateRow,
    /// 등장 순서대로 중복 제거된 목록 이름
    pub lists: Vec<String>,
    /// 등장 순서대로 중복 제거된 도서 키
    pub books: Vec<BookKey>,
    pub rankings: Vec<RankingEntry>,
    /// 제목/순위/목록 이름이 없어 버린 항목 수
    pub dropped_entries: usize,
}

impl DailySnapshot {
    /// 응답을 정규화합니다. 응답이 없으면 [`SnapshotError::NoResults`].
    pub fn from_response(
        response: Option<&OverviewResponse>,
    ) -> Result<Self, SnapshotError> {
        let results = response
            .and_then(|r| r.results.as_ref())
            .ok_or(SnapshotError::NoResults)?;

        if results.lists().is_empty() {
            return Err(SnapshotError::NoLists);
        }

        let raw_date = results.published_date.as_deref().unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date.trim(), "%Y-%m-%d")
            .map_err(|_| SnapshotError::InvalidDate(raw_date.to_string()))?;

        let mut snapshot = Self {
            date: DateRow::new(date),
            lists: Vec::new(),
            books: Vec::new(),
            rankings: Vec::new(),
            dropped_entries: 0,
        };
        let mut seen_lists = HashSet::new();
        let mut seen_books = HashSet::new();
        let mut seen_pairs = HashSet::new();

        for list in results.lists() {
            let Some(list_name) = non_blank(list.list_name.as_deref()) else {
                snapshot.dropped_entries += list.books().len();
                continue;
            };

            for book in list.books() {
                let (Some(title), Some(rank)) = (non_blank(book.title.as_deref()), book.rank)
                else {
                    snapshot.dropped_entries += 1;
                    continue;
                };

                let key = BookKey {
                    title: title.to_string(),
                    author: book.author.as_deref().unwrap_or_default().trim().to_string(),
                    publisher: book.publisher.as_deref().unwrap_or_default().trim().to_string(),
                };

                // 같은 목록에 같은 책이 두 번 나오면 첫 순위만 남긴다
                if !seen_pairs.insert((list_name.to_string(), key.clone())) {
                    continue;
                }
                if seen_lists.insert(list_name.to_string()) {
                    snapshot.lists.push(list_name.to_string());
                }
                if seen_books.insert(key.clone()) {
                    snapshot.books.push(key.clone());
                }
                snapshot.rankings.push(RankingEntry {
                    list_name: list_name.to_string(),
                    book: key,
                    rank,
                });
            }
        }

        Ok(snapshot)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
