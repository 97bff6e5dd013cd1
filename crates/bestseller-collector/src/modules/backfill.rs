//! 날짜 구간 백필 모듈.
//!
//! 구간의 날짜마다 순차적으로 조회 → 적재를 수행합니다. 하루의 실패는
//! 통계와 로그에만 남고 다음 날짜 처리를 막지 않습니다.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bestseller_data::{FetchOutcome, LoadOutcome, NytBooksClient, OverviewResponse, Warehouse};
use chrono::NaiveDate;

use super::date_range::DateRange;
use crate::CollectionStats;

/// 하루치 overview 스냅샷 소스.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, date: NaiveDate) -> FetchOutcome;
}

/// 스냅샷 적재 대상.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn load(&self, response: Option<&OverviewResponse>) -> LoadOutcome;
}

#[async_trait]
impl SnapshotSource for NytBooksClient {
    async fn fetch(&self, date: NaiveDate) -> FetchOutcome {
        NytBooksClient::fetch(self, date).await
    }
}

#[async_trait]
impl SnapshotSink for Warehouse {
    async fn load(&self, response: Option<&OverviewResponse>) -> LoadOutcome {
        Warehouse::load(self, response).await
    }
}

/// 구간 전체 백필.
pub async fn run_backfill<S, K>(
    source: &S,
    sink: &K,
    range: DateRange,
    request_delay: Duration,
) -> CollectionStats
where
    S: SnapshotSource + ?Sized,
    K: SnapshotSink + ?Sized,
{
    run_backfill_until(source, sink, range, request_delay, std::future::pending()).await
}

/// `shutdown`이 완료되면 진행 중인 날짜를 중단하고 반환하는 백필.
///
/// 중단된 날짜의 트랜잭션은 커밋되지 않고 롤백됩니다.
pub async fn run_backfill_until<S, K, F>(
    source: &S,
    sink: &K,
    range: DateRange,
    request_delay: Duration,
    shutdown: F,
) -> CollectionStats
where
    S: SnapshotSource + ?Sized,
    K: SnapshotSink + ?Sized,
    F: Future<Output = ()>,
{
    let start = Instant::now();
    let mut stats = CollectionStats::new();
    let total_days = range.len();
    tokio::pin!(shutdown);

    tracing::info!(
        start_date = %range.start,
        end_date = %range.end,
        days = total_days,
        "백필 시작"
    );

    for (idx, date) in range.iter().enumerate() {
        if idx > 0 && !request_delay.is_zero() {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("종료 신호 수신, 백필 중단");
                    break;
                }
                _ = tokio::time::sleep(request_delay) => {}
            }
        }

        tracing::info!(
            date = %date,
            progress = format!("{}/{}", idx + 1, total_days),
            "Processing data"
        );

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!(date = %date, "종료 신호 수신, 백필 중단");
                break;
            }
            day = process_date(source, sink, date) => {
                stats.total += 1;
                tally(&mut stats, date, day);
            }
        }
    }

    stats.elapsed = start.elapsed();
    stats
}

/// 하루 처리 결과.
#[derive(Debug)]
struct DayResult {
    fetch: FetchOutcome,
    load: LoadOutcome,
}

async fn process_date<S, K>(source: &S, sink: &K, date: NaiveDate) -> DayResult
where
    S: SnapshotSource + ?Sized,
    K: SnapshotSink + ?Sized,
{
    let fetch = source.fetch(date).await;
    let load = match &fetch {
        FetchOutcome::Fetched(response) => sink.load(Some(response)).await,
        _ => sink.load(None).await,
    };
    DayResult { fetch, load }
}

fn tally(stats: &mut CollectionStats, date: NaiveDate, day: DayResult) {
    match day.fetch {
        FetchOutcome::Fetched(_) => {}
        FetchOutcome::Unavailable { status } => {
            stats.skipped += 1;
            tracing::warn!(date = %date, status, "응답 없음, 날짜 건너뜀");
            return;
        }
        FetchOutcome::Exhausted { attempts } => {
            stats.exhausted += 1;
            tracing::warn!(date = %date, attempts, "요청 한도 재시도 소진, 날짜 건너뜀");
            return;
        }
        FetchOutcome::Failed(e) => {
            stats.errors += 1;
            tracing::error!(date = %date, error = %e, "조회 실패, 날짜 건너뜀");
            return;
        }
    }

    match day.load {
        LoadOutcome::Loaded(report) => {
            stats.success += 1;
            stats.facts_inserted += report.facts_inserted;
            stats.facts_skipped += report.facts_skipped;
        }
        LoadOutcome::NoResults | LoadOutcome::NoLists => {
            stats.empty += 1;
            tracing::debug!(date = %date, "데이터 없음");
        }
        LoadOutcome::Invalid(reason) | LoadOutcome::Failed(reason) => {
            stats.errors += 1;
            tracing::error!(date = %date, error = %reason, "적재 실패");
        }
    }
}
