//! 수집 통계 구조체.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 백필 작업 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    /// 처리한 날짜 수
    pub total: usize,
    /// 적재 성공 날짜 수
    pub success: usize,
    /// 빈 데이터 (조회 성공, results/lists 없음)
    pub empty: usize,
    /// 건너뛴 날짜 수 (200/429 이외의 응답)
    pub skipped: usize,
    /// 요청 한도 재시도 소진
    pub exhausted: usize,
    /// 에러 횟수 (전송 실패, DB 실패, 잘못된 발행일)
    pub errors: usize,
    /// 새로 삽입된 팩트 행 수
    pub facts_inserted: u64,
    /// 이미 존재해서 건너뛴 팩트 행 수
    pub facts_skipped: u64,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CollectionStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 성공률 계산 (%)
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.success as f64 / self.total as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total = self.total,
            success = self.success,
            empty = self.empty,
            skipped = self.skipped,
            exhausted = self.exhausted,
            errors = self.errors,
            facts_inserted = self.facts_inserted,
            facts_skipped = self.facts_skipped,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "수집 완료"
        );
    }
}
