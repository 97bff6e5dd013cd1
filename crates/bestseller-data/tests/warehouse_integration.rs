//! Integration tests for the star-schema warehouse.
//!
//! `TEST_DATABASE_URL` must point at a disposable PostgreSQL database.
//! Tests are skipped when it is not set.

use bestseller_data::{LoadOutcome, OverviewResponse, Warehouse};
use chrono::NaiveDate;
use sqlx::PgPool;

async fn warehouse() -> Option<Warehouse> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("Skipping test: TEST_DATABASE_URL not set");
        return None;
    };

    let pool = PgPool::connect(&url).await.expect("Failed to connect");
    let warehouse = Warehouse::from_pool(pool);
    warehouse.migrate().await.expect("Failed to migrate");
    Some(warehouse)
}

/// Removes facts and the date row so each run starts from the same state.
async fn reset_date(pool: &PgPool, date: NaiveDate) {
    sqlx::query(
        "DELETE FROM fact_book_rankings WHERE date_id IN (SELECT date_id FROM dim_dates WHERE date = $1)",
    )
    .bind(date)
    .execute(pool)
    .await
    .unwrap();
    sqlx::query("DELETE FROM dim_dates WHERE date = $1")
        .bind(date)
        .execute(pool)
        .await
        .unwrap();
}

fn response(json: serde_json::Value) -> OverviewResponse {
    serde_json::from_value(json).unwrap()
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn test_single_book_end_to_end() {
    let Some(warehouse) = warehouse().await else {
        return;
    };
    let pool = warehouse.pool().clone();
    let date = ymd(2023, 1, 1);
    reset_date(&pool, date).await;

    let body = response(serde_json::json!({
        "results": {
            "published_date": "2023-01-01",
            "lists": [{
                "list_name": "Hardcover Fiction",
                "books": [{"title": "X", "author": "Y", "publisher": "Z", "rank": 1}]
            }]
        }
    }));

    let outcome = warehouse.load(Some(&body)).await;
    let LoadOutcome::Loaded(report) = outcome else {
        panic!("expected Loaded, got {:?}", outcome);
    };
    assert_eq!(report.new_dates, 1);
    assert_eq!(report.facts_inserted, 1);

    let (year, quarter, month, day): (i32, i32, i32, i32) =
        sqlx::query_as("SELECT year, quarter, month, day FROM dim_dates WHERE date = $1")
            .bind(date)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!((year, quarter, month, day), (2023, 1, 1, 1));

    let (books,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM dim_books WHERE title = 'X' AND author = 'Y' AND publisher = 'Z'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(books, 1);

    let (description,): (Option<String>,) =
        sqlx::query_as("SELECT description FROM dim_lists WHERE list_name = 'Hardcover Fiction'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(description.as_deref(), Some("Hardcover Fiction"));

    let (rank,): (i32,) = sqlx::query_as(
        r#"
        SELECT f.rank
        FROM fact_book_rankings f
        JOIN dim_dates d ON d.date_id = f.date_id
        JOIN dim_books b ON b.book_id = f.book_id
        JOIN dim_lists l ON l.list_id = f.list_id
        WHERE d.date = $1 AND b.title = 'X' AND l.list_name = 'Hardcover Fiction'
        "#,
    )
    .bind(date)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(rank, 1);
}

#[tokio::test]
async fn test_reload_is_idempotent() {
    let Some(warehouse) = warehouse().await else {
        return;
    };
    let pool = warehouse.pool().clone();
    let date = ymd(1999, 3, 15);
    reset_date(&pool, date).await;

    let body = response(serde_json::json!({
        "results": {
            "published_date": "1999-03-15",
            "lists": [
                {"list_name": "Idempotent Fiction", "books": [
                    {"title": "Replay One", "author": "A", "publisher": "P", "rank": 1},
                    {"title": "Replay Two", "author": "B", "publisher": "P", "rank": 2}
                ]}
            ]
        }
    }));

    let first = warehouse.load(Some(&body)).await;
    let second = warehouse.load(Some(&body)).await;

    let LoadOutcome::Loaded(second) = second else {
        panic!("expected Loaded, got {:?}", second);
    };
    assert!(matches!(first, LoadOutcome::Loaded(r) if r.new_dates == 1 && r.facts_inserted == 2));
    assert_eq!(second.new_dates, 0);
    assert_eq!(second.facts_inserted, 0);
    assert_eq!(second.facts_skipped, 2);

    // 날짜 행이 이미 있어도 대리 키 조회는 성공한다
    assert!(warehouse.date_id(date).await.unwrap().is_some());
    assert_eq!(warehouse.count_rankings(date).await.unwrap(), 2);
}

#[tokio::test]
async fn test_facts_written_for_existing_dimensions() {
    let Some(warehouse) = warehouse().await else {
        return;
    };
    let pool = warehouse.pool().clone();
    let first_date = ymd(1999, 4, 20);
    let second_date = ymd(1999, 4, 27);
    reset_date(&pool, first_date).await;
    reset_date(&pool, second_date).await;

    let week = |date: &str, rank: i32| {
        response(serde_json::json!({
            "results": {
                "published_date": date,
                "lists": [{"list_name": "Existing Dimensions", "books": [
                    {"title": "Long Runner", "author": "C", "publisher": "Q", "rank": rank}
                ]}]
            }
        }))
    };

    warehouse.load(Some(&week("1999-04-20", 4))).await;
    let outcome = warehouse.load(Some(&week("1999-04-27", 2))).await;

    let LoadOutcome::Loaded(report) = outcome else {
        panic!("expected Loaded, got {:?}", outcome);
    };
    assert_eq!(report.new_books, 0);
    assert_eq!(report.new_lists, 0);
    assert_eq!(report.facts_inserted, 1);
    assert_eq!(warehouse.count_rankings(second_date).await.unwrap(), 1);
}

#[tokio::test]
async fn test_empty_results_touch_nothing() {
    let Some(warehouse) = warehouse().await else {
        return;
    };

    let (before,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM dim_dates")
        .fetch_one(warehouse.pool())
        .await
        .unwrap();

    assert_eq!(warehouse.load(None).await, LoadOutcome::NoResults);
    let empty = response(serde_json::json!({"results": {"published_date": "1999-05-01", "lists": []}}));
    assert_eq!(warehouse.load(Some(&empty)).await, LoadOutcome::NoLists);

    assert_eq!(warehouse.date_id(ymd(1999, 5, 1)).await.unwrap(), None);
    let (after,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM dim_dates")
        .fetch_one(warehouse.pool())
        .await
        .unwrap();
    assert!(after >= before);
}
