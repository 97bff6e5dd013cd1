//! 환경변수 기반 설정 모듈.

use std::time::Duration;

use bestseller_data::provider::nyt::DEFAULT_BASE_URL;
use bestseller_data::{DatabaseConfig, NytApiConfig, RetryPolicy};
use secrecy::SecretString;

use crate::error::CollectorError;
use crate::Result;

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 데이터베이스 설정
    pub database: DatabaseConfig,
    /// NYT Books API 설정
    pub nyt: NytApiConfig,
    /// 백필 설정
    pub backfill: BackfillConfig,
}

/// 백필 설정
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// 날짜 간 요청 딜레이 (밀리초)
    pub request_delay_ms: u64,
}

impl BackfillConfig {
    /// 날짜 간 딜레이를 Duration으로 반환
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드 (`.env` 파일 포함)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로부터 설정 구성
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key).filter(|v| !v.is_empty()).ok_or_else(|| {
                CollectorError::Config(format!("{} 환경변수가 설정되지 않았습니다", key))
            })
        };

        let database = DatabaseConfig {
            host: lookup("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_or(&lookup, "DB_PORT", 5432),
            database: required("DB_NAME")?,
            user: required("DB_USER")?,
            password: SecretString::from(required("DB_PASSWORD")?),
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 2),
            connect_timeout_secs: parse_or(&lookup, "DB_CONNECT_TIMEOUT_SECS", 30),
        };

        let nyt = NytApiConfig {
            api_key: SecretString::from(required("NYT_API_KEY")?),
            base_url: lookup("NYT_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout_secs: parse_or(&lookup, "NYT_REQUEST_TIMEOUT_SECS", 30),
            retry: RetryPolicy {
                max_retries: parse_or(&lookup, "NYT_RETRY_MAX_ATTEMPTS", 5),
                initial_backoff: Duration::from_secs(parse_or(
                    &lookup,
                    "NYT_RETRY_INITIAL_BACKOFF_SECS",
                    60,
                )),
                max_backoff: Duration::from_secs(parse_or(
                    &lookup,
                    "NYT_RETRY_MAX_BACKOFF_SECS",
                    900,
                )),
            },
        };

        Ok(Self {
            database,
            nyt,
            backfill: BackfillConfig {
                request_delay_ms: parse_or(&lookup, "BACKFILL_REQUEST_DELAY_MS", 0),
            },
        })
    }
}

/// 값을 파싱 (없거나 실패 시 기본값 사용)
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
