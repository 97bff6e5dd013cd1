//! 베스트셀러 스타 스키마 저장소.
//!
//! 하루치 스냅샷을 하나의 트랜잭션으로 적재합니다:
//! 날짜 → 목록 → 도서 차원을 먼저 upsert하고 대리 키를 조회한 뒤
//! `fact_book_rankings`에 팩트 행을 씁니다. 차원 행은 중복 키에서 건너뛰고
//! (ON CONFLICT DO NOTHING), 대리 키는 삽입 여부와 관계없이 항상 다시 조회합니다.

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDate;
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{DataError, Result};
use crate::provider::nyt::OverviewResponse;
use crate::snapshot::{BookKey, DailySnapshot, DateRow, SnapshotError};

/// 데이터베이스 설정.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: SecretString,
    /// 풀의 최대 연결 수
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    /// 접속 옵션 생성.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(self.password.expose_secret())
    }
}

/// 적재 결과 집계.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// 새로 삽입된 날짜 행 (0 또는 1)
    pub new_dates: u64,
    pub new_lists: u64,
    pub new_books: u64,
    pub facts_inserted: u64,
    /// 이미 존재해서 건너뛴 팩트 행
    pub facts_skipped: u64,
}

/// 하루 적재 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(LoadReport),
    /// 응답이 없거나 `results`가 비어 있음 (DB 미접속)
    NoResults,
    /// `results.lists`가 비어 있음 (DB 미접속)
    NoLists,
    /// 발행일 형식 오류 (DB 미접속)
    Invalid(String),
    /// DB 오류, 해당 날짜는 롤백됨
    Failed(String),
}

/// 스타 스키마 저장소.
#[derive(Clone)]
pub struct Warehouse {
    pool: PgPool,
}

impl Warehouse {
    /// 새로운 연결 풀을 생성합니다.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!(host = %config.host, port = config.port, database = %config.database, "Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(config.connect_options())
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// 기존 연결 풀에서 생성합니다.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 스키마 마이그레이션을 실행합니다.
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations...");
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully");
        Ok(())
    }

    /// 데이터베이스 상태를 확인합니다.
    pub async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(true)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// overview 응답 하나를 적재합니다.
    ///
    /// 실패하지 않습니다. 빈 응답은 DB에 접속하지 않고 반환하며,
    /// DB 오류는 로그를 남기고 [`LoadOutcome::Failed`]로 보고합니다.
    pub async fn load(&self, response: Option<&OverviewResponse>) -> LoadOutcome {
        let snapshot = match DailySnapshot::from_response(response) {
            Ok(snapshot) => snapshot,
            Err(SnapshotError::NoResults) => {
                info!("Results are empty!");
                return LoadOutcome::NoResults;
            }
            Err(SnapshotError::NoLists) => {
                info!("Lists are empty!");
                return LoadOutcome::NoLists;
            }
            Err(e) => {
                warn!(error = %e, "스냅샷 정규화 실패");
                return LoadOutcome::Invalid(e.to_string());
            }
        };

        if snapshot.dropped_entries > 0 {
            debug!(
                dropped = snapshot.dropped_entries,
                "필수 필드가 없는 항목 제외"
            );
        }

        match self.store_snapshot(&snapshot).await {
            Ok(report) => LoadOutcome::Loaded(report),
            Err(e) => {
                error!(date = %snapshot.date.date, error = %e, "Error inserting data into PostgreSQL");
                LoadOutcome::Failed(e.to_string())
            }
        }
    }

    /// 스냅샷을 하나의 트랜잭션으로 저장합니다.
    ///
    /// 오류가 나면 트랜잭션이 drop되며 그날의 모든 변경이 롤백됩니다.
    #[instrument(skip(self, snapshot), fields(date = %snapshot.date.date, rankings = snapshot.rankings.len()))]
    pub async fn store_snapshot(&self, snapshot: &DailySnapshot) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let mut tx = self.pool.begin().await?;

        let (date_id, new_dates) = upsert_date(&mut tx, &snapshot.date).await?;
        report.new_dates = new_dates;

        let (list_ids, new_lists) = upsert_lists(&mut tx, &snapshot.lists).await?;
        report.new_lists = new_lists;

        let (book_ids, new_books) = upsert_books(&mut tx, &snapshot.books).await?;
        report.new_books = new_books;

        let mut fact_book_ids = Vec::with_capacity(snapshot.rankings.len());
        let mut fact_list_ids = Vec::with_capacity(snapshot.rankings.len());
        let mut fact_ranks = Vec::with_capacity(snapshot.rankings.len());

        for entry in &snapshot.rankings {
            let list_id = list_ids.get(&entry.list_name).copied().ok_or_else(|| {
                DataError::NotFound(format!("list_id for {}", entry.list_name))
            })?;
            let book_id = book_ids.get(&entry.book).copied().ok_or_else(|| {
                DataError::NotFound(format!("book_id for {}", entry.book.title))
            })?;
            fact_book_ids.push(book_id);
            fact_list_ids.push(list_id);
            fact_ranks.push(entry.rank);
        }

        report.facts_inserted =
            insert_rankings(&mut tx, date_id, &fact_book_ids, &fact_list_ids, &fact_ranks).await?;
        report.facts_skipped = (snapshot.rankings.len() as u64).saturating_sub(report.facts_inserted);

        tx.commit().await?;

        info!(
            date = %snapshot.date.date,
            new_dates = report.new_dates,
            new_lists = report.new_lists,
            new_books = report.new_books,
            facts_inserted = report.facts_inserted,
            facts_skipped = report.facts_skipped,
            "스냅샷 적재 완료"
        );

        Ok(report)
    }

    /// 날짜 차원의 대리 키 조회.
    pub async fn date_id(&self, date: NaiveDate) -> Result<Option<i32>> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT date_id FROM dim_dates WHERE date = $1")
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id,)| id))
    }

    /// 특정 날짜의 팩트 행 수.
    pub async fn count_rankings(&self, date: NaiveDate) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM fact_book_rankings f
            JOIN dim_dates d ON d.date_id = f.date_id
            WHERE d.date = $1
            "#,
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

/// 날짜 행 upsert 후 대리 키 조회. 이미 있으면 삽입은 no-op.
async fn upsert_date(tx: &mut Transaction<'_, Postgres>, row: &DateRow) -> Result<(i32, u64)> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO dim_dates (date, year, quarter, month, day)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(row.date)
    .bind(row.year)
    .bind(row.quarter)
    .bind(row.month)
    .bind(row.day)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    let (date_id,): (i32,) = sqlx::query_as("SELECT date_id FROM dim_dates WHERE date = $1")
        .bind(row.date)
        .fetch_one(&mut **tx)
        .await?;

    debug!(date = %row.date, date_id, inserted, "dim_dates upsert");
    Ok((date_id, inserted))
}

/// 목록 차원 일괄 upsert (description = list_name).
async fn upsert_lists(
    tx: &mut Transaction<'_, Postgres>,
    names: &[String],
) -> Result<(HashMap<String, i32>, u64)> {
    if names.is_empty() {
        return Ok((HashMap::new(), 0));
    }

    let inserted = sqlx::query(
        r#"
        INSERT INTO dim_lists (list_name, description)
        SELECT name, name FROM UNNEST($1::text[]) AS k(name)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(names)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    let rows: Vec<(i32, String)> = sqlx::query_as(
        "SELECT list_id, list_name FROM dim_lists WHERE list_name = ANY($1::text[])",
    )
    .bind(names)
    .fetch_all(&mut **tx)
    .await?;

    debug!(lists = names.len(), inserted, "dim_lists upsert");
    Ok((rows.into_iter().map(|(id, name)| (name, id)).collect(), inserted))
}

/// 도서 차원 일괄 upsert 후 자연 키로 대리 키 조회.
async fn upsert_books(
    tx: &mut Transaction<'_, Postgres>,
    books: &[BookKey],
) -> Result<(HashMap<BookKey, i32>, u64)> {
    if books.is_empty() {
        return Ok((HashMap::new(), 0));
    }

    // UNNEST 배열 준비
    let titles: Vec<&str> = books.iter().map(|b| b.title.as_str()).collect();
    let authors: Vec<&str> = books.iter().map(|b| b.author.as_str()).collect();
    let publishers: Vec<&str> = books.iter().map(|b| b.publisher.as_str()).collect();

    let inserted = sqlx::query(
        r#"
        INSERT INTO dim_books (title, author, publisher)
        SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(&titles)
    .bind(&authors)
    .bind(&publishers)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    let rows: Vec<(i32, String, String, String)> = sqlx::query_as(
        r#"
        SELECT b.book_id, b.title, b.author, b.publisher
        FROM dim_books b
        JOIN UNNEST($1::text[], $2::text[], $3::text[]) AS k(title, author, publisher)
          ON b.title = k.title AND b.author = k.author AND b.publisher = k.publisher
        "#,
    )
    .bind(&titles)
    .bind(&authors)
    .bind(&publishers)
    .fetch_all(&mut **tx)
    .await?;

    debug!(books = books.len(), inserted, "dim_books upsert");
    Ok((
        rows.into_iter()
            .map(|(id, title, author, publisher)| {
                (
                    BookKey {
                        title,
                        author,
                        publisher,
                    },
                    id,
                )
            })
            .collect(),
        inserted,
    ))
}

/// 팩트 행 일괄 삽입. 같은 (date, book, list)가 이미 있으면 건너뜀.
async fn insert_rankings(
    tx: &mut Transaction<'_, Postgres>,
    date_id: i32,
    book_ids: &[i32],
    list_ids: &[i32],
    ranks: &[i32],
) -> Result<u64> {
    if book_ids.is_empty() {
        return Ok(0);
    }

    let inserted = sqlx::query(
        r#"
        INSERT INTO fact_book_rankings (date_id, book_id, list_id, rank)
        SELECT $1::int4, k.book_id, k.list_id, k.rank
        FROM UNNEST($2::int4[], $3::int4[], $4::int4[]) AS k(book_id, list_id, rank)
        WHERE NOT EXISTS (
            SELECT 1 FROM fact_book_rankings f
            WHERE f.date_id = $1::int4 AND f.book_id = k.book_id AND f.list_id = k.list_id
        )
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(date_id)
    .bind(book_ids)
    .bind(list_ids)
    .bind(ranks)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    Ok(inserted)
}
