//! Bestseller backfill CLI.

use bestseller_collector::modules::{self, DateRange};
use bestseller_collector::CollectorConfig;
use bestseller_data::{NytBooksClient, Warehouse};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bestseller-collector")]
#[command(about = "NYT Bestseller Star-Schema Backfill", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// 날짜 구간 백필 (기본: 2021-09-28 ~ 2023-12-31)
    Backfill {
        /// 시작일 (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// 종료일 (YYYY-MM-DD, 포함)
        #[arg(long)]
        end: Option<String>,
    },

    /// 하루치 조회 및 적재
    Fetch {
        /// 발행일 (YYYY-MM-DD)
        #[arg(long)]
        date: String,
    },

    /// 스타 스키마 마이그레이션 실행
    Migrate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "bestseller_collector={level},bestseller_data={level}",
                    level = cli.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Bestseller Collector 시작");

    // 설정 로드
    let config = CollectorConfig::from_env()?;
    tracing::debug!(
        db_host = %config.database.host,
        db_port = config.database.port,
        db_name = %config.database.database,
        nyt_base_url = %config.nyt.base_url,
        "설정 로드 완료"
    );

    // 날짜 인자는 DB 연결 전에 검증
    let range = match &cli.command {
        Commands::Backfill { start, end } => {
            Some(DateRange::from_args(start.as_deref(), end.as_deref())?)
        }
        Commands::Fetch { date } => {
            let date = modules::parse_date(date)?;
            Some(DateRange::new(date, date))
        }
        Commands::Migrate => None,
    };

    // DB 연결
    let warehouse = Warehouse::connect(&config.database).await?;
    tracing::info!("데이터베이스 연결 성공");

    match range {
        Some(range) => {
            let client = NytBooksClient::new(config.nyt.clone())?;
            let shutdown = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            };

            let stats = modules::run_backfill_until(
                &client,
                &warehouse,
                range,
                config.backfill.request_delay(),
                shutdown,
            )
            .await;
            stats.log_summary("베스트셀러 백필");
        }
        None => {
            warehouse.migrate().await?;
        }
    }

    warehouse.close().await;
    tracing::info!("Bestseller Collector 종료");

    Ok(())
}
