//! 닫힌 날짜 구간.

use chrono::NaiveDate;

use crate::error::CollectorError;
use crate::Result;

/// 기본 백필 시작일
pub const DEFAULT_START: (i32, u32, u32) = (2021, 9, 28);
/// 기본 백필 종료일
pub const DEFAULT_END: (i32, u32, u32) = (2023, 12, 31);

/// `start..=end` 날짜 구간 (하루 단위).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// 기본 백필 구간 (2021-09-28 ~ 2023-12-31).
    pub fn historical() -> Self {
        let ymd = |(y, m, d): (i32, u32, u32)| {
            NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
        };
        Self::new(ymd(DEFAULT_START), ymd(DEFAULT_END))
    }

    /// CLI 인자로부터 구간 구성. 빠진 쪽은 기본 구간 값을 사용.
    pub fn from_args(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let default = Self::historical();
        let start = start.map(parse_date).transpose()?.unwrap_or(default.start);
        let end = end.map(parse_date).transpose()?.unwrap_or(default.end);

        if start > end {
            return Err(CollectorError::InvalidArgument(format!(
                "시작일({})이 종료일({})보다 늦습니다",
                start, end
            )));
        }

        Ok(Self::new(start, end))
    }

    /// 구간의 일 수 (start > end면 0).
    pub fn len(&self) -> usize {
        ((self.end - self.start).num_days() + 1).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |date| *date <= end)
    }
}

/// `YYYY-MM-DD` 파싱.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        CollectorError::InvalidArgument(format!("날짜 형식 오류 ({}): {}", value, e))
    })
}
