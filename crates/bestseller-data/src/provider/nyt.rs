//! NYT Books API 클라이언트.
//!
//! New York Times Books API의 `lists/overview` 엔드포인트에서 특정 발행일의
//! 베스트셀러 목록 스냅샷을 조회합니다.
//!
//! # 요청 한도 (429) 처리
//!
//! NYT API는 분당 요청 수를 제한합니다. 429 응답을 받으면 [`RetryPolicy`]에 따라
//! 지수 백오프로 대기한 뒤 같은 요청을 재시도하며, 최대 재시도 횟수를 넘기면
//! [`FetchOutcome::Exhausted`]를 반환합니다.
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use bestseller_data::provider::nyt::{NytApiConfig, NytBooksClient};
//!
//! let client = NytBooksClient::new(NytApiConfig::new("YOUR_API_KEY"))?;
//! let date = chrono::NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
//!
//! if let Some(response) = client.fetch(date).await.into_response() {
//!     println!("{} lists", response.lists().len());
//! }
//! ```

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{DataError, Result};

/// 기본 엔드포인트 (lists overview)
pub const DEFAULT_BASE_URL: &str = "https://api.nytimes.com/svc/books/v3/lists/overview.json";

/// 요청 한도 초과 시 재시도 정책.
///
/// n번째 재시도(1부터 시작) 전 대기 시간은
/// `min(initial_backoff * 2^(n-1), max_backoff)` 입니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 첫 429 이후 허용되는 최대 재시도 횟수
    pub max_retries: u32,
    /// 첫 재시도 전 대기 시간
    pub initial_backoff: Duration,
    /// 대기 시간 상한
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(15 * 60),
        }
    }
}

impl RetryPolicy {
    /// `retry`번째 재시도 전 대기 시간 (1부터 시작).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.initial_backoff
            .checked_mul(1u32 << exponent)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }
}

/// NYT API 클라이언트 설정.
#[derive(Debug, Clone)]
pub struct NytApiConfig {
    /// API 키 (로그에 노출되지 않음)
    pub api_key: SecretString,
    /// overview 엔드포인트 URL
    pub base_url: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 429 재시도 정책
    pub retry: RetryPolicy,
}

impl NytApiConfig {
    /// 기본 엔드포인트와 기본 재시도 정책으로 설정 생성.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            retry: RetryPolicy::default(),
        }
    }

    /// 엔드포인트 URL 변경 (테스트 서버 등).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 재시도 정책 변경.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// overview 응답 본문.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverviewResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub num_results: Option<u32>,
    #[serde(default)]
    pub results: Option<OverviewResults>,
}

impl OverviewResponse {
    /// 응답에 포함된 목록들 (results가 없으면 빈 슬라이스).
    pub fn lists(&self) -> &[BestsellerList] {
        self.results
            .as_ref()
            .map(|r| r.lists())
            .unwrap_or_default()
    }
}

/// `results` 객체.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverviewResults {
    /// 발행일 (YYYY-MM-DD), 응답 내 모든 목록이 공유
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub lists: Option<Vec<BestsellerList>>,
}

impl OverviewResults {
    pub fn lists(&self) -> &[BestsellerList] {
        self.lists.as_deref().unwrap_or_default()
    }
}

/// 베스트셀러 목록 하나 (예: "Hardcover Fiction").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BestsellerList {
    #[serde(default)]
    pub list_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub books: Option<Vec<ListedBook>>,
}

impl BestsellerList {
    pub fn books(&self) -> &[ListedBook] {
        self.books.as_deref().unwrap_or_default()
    }
}

/// 목록에 오른 책 한 권.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListedBook {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub rank: Option<i32>,
}

/// 조회 결과.
#[derive(Debug)]
pub enum FetchOutcome {
    /// HTTP 200, 본문 파싱 성공
    Fetched(OverviewResponse),
    /// 200/429 이외의 HTTP 상태
    Unavailable { status: u16 },
    /// 429가 재시도 한도를 넘어 계속됨
    Exhausted { attempts: u32 },
    /// 전송 오류 또는 200 본문 디코딩 실패
    Failed(DataError),
}

impl FetchOutcome {
    /// 파싱된 응답 (그 외의 경우 `None`).
    pub fn into_response(self) -> Option<OverviewResponse> {
        match self {
            Self::Fetched(response) => Some(response),
            _ => None,
        }
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }
}

/// NYT Books API 클라이언트.
#[derive(Clone)]
pub struct NytBooksClient {
    client: reqwest::Client,
    config: NytApiConfig,
}

impl NytBooksClient {
    /// 새로운 클라이언트 생성.
    pub fn new(config: NytApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DataError::ConfigError(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &NytApiConfig {
        &self.config
    }

    /// 특정 발행일의 overview 스냅샷 조회.
    ///
    /// 429 응답은 재시도 정책에 따라 대기 후 재시도합니다. 그 밖의 실패는
    /// 로그만 남기고 결과로 반환하므로 호출 측은 해당 날짜를 건너뛰면 됩니다.
    pub async fn fetch(&self, date: NaiveDate) -> FetchOutcome {
        let published_date = date.format("%Y-%m-%d").to_string();
        let retry = &self.config.retry;
        let mut retries = 0u32;

        loop {
            let response = match self.request(&published_date).await {
                Ok(response) => response,
                Err(e) => {
                    error!(published_date = %published_date, error = %e, "NYT API 요청 실패");
                    return FetchOutcome::Failed(e);
                }
            };

            let status = response.status();

            if status == StatusCode::OK {
                return match response.json::<OverviewResponse>().await {
                    Ok(body) => {
                        debug!(
                            published_date = %published_date,
                            lists = body.lists().len(),
                            "NYT API 응답 수신"
                        );
                        FetchOutcome::Fetched(body)
                    }
                    Err(e) => {
                        let e = DataError::from(e);
                        error!(published_date = %published_date, error = %e, "NYT API 응답 파싱 실패");
                        FetchOutcome::Failed(e)
                    }
                };
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if retries >= retry.max_retries {
                    warn!(
                        published_date = %published_date,
                        attempts = retries + 1,
                        "요청 한도 초과, 재시도 횟수 소진"
                    );
                    return FetchOutcome::Exhausted {
                        attempts: retries + 1,
                    };
                }

                retries += 1;
                let delay = retry.delay_for(retries);
                info!(
                    published_date = %published_date,
                    retry = retries,
                    delay_secs = delay.as_secs_f64(),
                    "요청 한도 초과, 대기 후 재시도"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            warn!(published_date = %published_date, status = status.as_u16(), "NYT API 오류 응답");
            return FetchOutcome::Unavailable {
                status: status.as_u16(),
            };
        }
    }

    async fn request(&self, published_date: &str) -> Result<reqwest::Response> {
        info!(
            url = %self.config.base_url,
            published_date = published_date,
            "NYT API 요청"
        );

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("published_date", published_date),
                ("api-key", self.config.api_key.expose_secret()),
            ])
            .header("Accept", "application/json")
            .send()
            .await?;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::time::Instant;

    const OVERVIEW_PATH: &str = "/svc/books/v3/lists/overview.json";

    fn sample_body() -> String {
        serde_json::json!({
            "status": "OK",
            "num_results": 1,
            "results": {
                "published_date": "2023-01-01",
                "lists": [{
                    "list_name": "Hardcover Fiction",
                    "display_name": "Hardcover Fiction",
                    "books": [{"title": "X", "author": "Y", "publisher": "Z", "rank": 1}]
                }]
            }
        })
        .to_string()
    }

    fn query_for(date: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("published_date".into(), date.into()),
            Matcher::UrlEncoded("api-key".into(), "test-key".into()),
        ])
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(50),
        }
    }

    fn client_for(server: &mockito::ServerGuard, retry: RetryPolicy) -> NytBooksClient {
        let config = NytApiConfig::new("test-key")
            .with_base_url(format!("{}{}", server.url(), OVERVIEW_PATH))
            .with_retry(retry);
        NytBooksClient::new(config).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_retry_delay_doubles_until_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(2), Duration::from_secs(120));
        assert_eq!(policy.delay_for(4), Duration::from_secs(480));
        assert_eq!(policy.delay_for(5), Duration::from_secs(900));
        assert_eq!(policy.delay_for(40), Duration::from_secs(900));
    }

    #[test]
    fn test_response_tolerates_missing_and_null_fields() {
        let body: OverviewResponse =
            serde_json::from_str(r#"{"results": {"published_date": "2023-01-01", "lists": null}}"#)
                .unwrap();
        assert!(body.lists().is_empty());

        let body: OverviewResponse = serde_json::from_str("{}").unwrap();
        assert!(body.results.is_none());
        assert!(body.lists().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_ok_returns_parsed_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", OVERVIEW_PATH)
            .match_query(query_for("2023-01-01"))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(sample_body())
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, fast_retry(3));
        let response = client
            .fetch(date("2023-01-01"))
            .await
            .into_response()
            .expect("200 응답은 파싱되어야 함");

        mock.assert_async().await;
        let lists = response.lists();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].list_name.as_deref(), Some("Hardcover Fiction"));
        assert_eq!(lists[0].books()[0].rank, Some(1));
    }

    #[tokio::test]
    async fn test_fetch_retries_once_after_rate_limit() {
        let mut server = mockito::Server::new_async().await;
        let throttled = server
            .mock("GET", OVERVIEW_PATH)
            .match_query(query_for("2023-01-01"))
            .with_status(429)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("GET", OVERVIEW_PATH)
            .match_query(query_for("2023-01-01"))
            .with_status(200)
            .with_body(sample_body())
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, fast_retry(3));
        let started = Instant::now();
        let outcome = client.fetch(date("2023-01-01")).await;

        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(outcome.is_fetched());
        throttled.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_gives_up_after_max_retries() {
        let mut server = mockito::Server::new_async().await;
        let throttled = server
            .mock("GET", OVERVIEW_PATH)
            .match_query(Matcher::Any)
            .with_status(429)
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server, fast_retry(2));
        let outcome = client.fetch(date("2022-06-15")).await;

        throttled.assert_async().await;
        assert!(matches!(outcome, FetchOutcome::Exhausted { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", OVERVIEW_PATH)
            .match_query(Matcher::Any)
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, fast_retry(3));
        let outcome = client.fetch(date("2022-06-15")).await;

        mock.assert_async().await;
        assert!(matches!(outcome, FetchOutcome::Unavailable { status: 500 }));
        assert!(outcome.into_response().is_none());
    }

    #[tokio::test]
    async fn test_fetch_malformed_body_is_failed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", OVERVIEW_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let client = client_for(&server, fast_retry(3));
        let outcome = client.fetch(date("2022-06-15")).await;

        assert!(matches!(outcome, FetchOutcome::Failed(DataError::DecodeError(_))));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_failed() {
        // 127.0.0.1:9 (discard) 에는 보통 리스너가 없다
        let config = NytApiConfig::new("test-key")
            .with_base_url("http://127.0.0.1:9/overview.json")
            .with_retry(fast_retry(1));
        let client = NytBooksClient::new(config).unwrap();

        let outcome = client.fetch(date("2022-06-15")).await;
        assert!(matches!(outcome, FetchOutcome::Failed(DataError::HttpError(_))));
    }
}
