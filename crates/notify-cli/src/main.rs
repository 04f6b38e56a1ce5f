//! 트레이딩 알림 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 가격 알림 (TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID 필요)
//! quant-notify price -s BTCUSDT -p 45000 -t spike --change-pct 5.2
//!
//! # 설정 파일 사용, 전송 없이 로그로만 확인
//! quant-notify --config config/notify.toml --dry-run system -l warning -m "ws reconnect"
//!
//! # 같은 심볼로 여러 건 전송해 배치 동작 확인
//! quant-notify --dry-run burst -s ETHUSDT -n 10
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notify_core::{init_logging, AppConfig, ThrottleSettings};
use notify_dispatch::{
    Dispatcher, EmergencyAlert, LogSender, MessageSender, NotificationCategory, NotificationResult,
    PositionUpdate, PriceAlert, SystemAlert, TelegramSender,
};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 남은 flush 확인 주기.
const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "quant-notify")]
#[command(about = "Throttled trading notifications for Telegram", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일 (TOML). 없으면 환경 변수에서 로드
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 드라이런 모드 (텔레그램 대신 로그 출력)
    #[arg(long, global = true, default_value = "false")]
    dry_run: bool,

    /// 종료 전 대기 중인 배치를 기다리는 최대 시간 (초)
    #[arg(long, global = true, default_value = "130")]
    flush_wait: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 가격 알림 (심볼별 throttle)
    Price {
        /// 심볼 (예: BTCUSDT)
        #[arg(short, long)]
        symbol: String,

        /// 현재가
        #[arg(short, long)]
        price: Decimal,

        /// 트리거 유형 (spike, drop, breakout, breakdown, target, alert)
        #[arg(short, long, default_value = "alert")]
        trigger: String,

        /// 변동률 (%)
        #[arg(long)]
        change_pct: Option<Decimal>,

        /// 거래량
        #[arg(long)]
        volume: Option<Decimal>,

        /// 추가 설명
        #[arg(long)]
        context: Option<String>,

        /// 포럼 토픽 ID
        #[arg(long)]
        thread: Option<i64>,
    },

    /// 포지션 업데이트 (거래소별 배치)
    Position {
        /// 거래소 (예: binance, paradex)
        #[arg(short, long)]
        exchange: String,

        /// 심볼
        #[arg(short, long)]
        symbol: String,

        /// 포지션 크기 (양수 = 롱, 음수 = 숏)
        #[arg(long, allow_hyphen_values = true)]
        size: Decimal,

        /// 손익
        #[arg(long, allow_hyphen_values = true)]
        pnl: Decimal,

        /// 동작 (opened, closed, increased, decreased, update)
        #[arg(short, long, default_value = "update")]
        action: String,

        /// 진입가
        #[arg(long)]
        entry: Option<Decimal>,

        /// 청산가
        #[arg(long)]
        exit: Option<Decimal>,

        /// 수수료
        #[arg(long)]
        fees: Option<Decimal>,

        /// 포럼 토픽 ID
        #[arg(long)]
        thread: Option<i64>,
    },

    /// 시스템 알림 (레벨별 throttle)
    System {
        /// 레벨 (info, warning, error, critical)
        #[arg(short, long, default_value = "info")]
        level: String,

        /// 메시지
        #[arg(short, long)]
        message: String,

        /// 컴포넌트
        #[arg(long)]
        component: Option<String>,

        /// 거래소
        #[arg(long)]
        exchange: Option<String>,

        /// 포럼 토픽 ID
        #[arg(long)]
        thread: Option<i64>,
    },

    /// 긴급 알림 (throttle 없음)
    Emergency {
        /// 메시지
        #[arg(short, long)]
        message: String,

        /// 필요한 조치
        #[arg(short, long)]
        action: Option<String>,

        /// 포럼 토픽 ID
        #[arg(long)]
        thread: Option<i64>,
    },

    /// 사용자 정의 메시지 (텍스트 그대로 전송)
    Custom {
        /// 전송할 텍스트 (HTML)
        #[arg(short, long)]
        text: String,

        /// throttle 간격 (초, 0 = 즉시 전송)
        #[arg(short, long, default_value = "0")]
        interval: u64,

        /// throttle 키
        #[arg(short, long, default_value = "custom")]
        key: String,

        /// 포럼 토픽 ID
        #[arg(long)]
        thread: Option<i64>,
    },

    /// 등록된 포맷터로 JSON 데이터 전송
    Formatted {
        /// 포맷터 이름 (positions_summary, portfolio_summary, pnl_summary)
        #[arg(short, long)]
        name: String,

        /// JSON 데이터
        #[arg(short, long)]
        data: String,

        /// 포럼 토픽 ID
        #[arg(long)]
        thread: Option<i64>,
    },

    /// 같은 심볼로 가격 알림 여러 건 전송 (배치 확인용)
    Burst {
        /// 심볼
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,

        /// 전송 건수
        #[arg(short = 'n', long, default_value = "5")]
        count: u32,

        /// 시작 가격
        #[arg(short, long, default_value = "45000")]
        price: Decimal,

        /// 건당 가격 증가분
        #[arg(long, default_value = "10")]
        step: Decimal,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env 파일 로드 (없으면 무시)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => AppConfig::load(path),
        None => AppConfig::from_env(),
    };

    let logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    init_logging(&logging).map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {e}"))?;

    let (throttle, telegram) = match loaded {
        Ok(config) => (config.throttle, Some(config.telegram)),
        Err(e) if cli.dry_run => {
            warn!(error = %e, "Config load failed, dry-run with default throttle settings");
            (ThrottleSettings::default(), None)
        }
        Err(e) => return Err(e).context("설정 로드 실패"),
    };

    let sender: Arc<dyn MessageSender> = match telegram {
        Some(settings) if !cli.dry_run => Arc::new(TelegramSender::new(settings)),
        _ => Arc::new(LogSender),
    };

    info!(
        sender = sender.name(),
        enabled = sender.is_enabled(),
        price_alert = throttle.price_alert,
        position_update = throttle.position_update,
        system_alert = throttle.system_alert,
        "Notification dispatcher ready"
    );

    let dispatcher = Arc::new(Dispatcher::new(throttle, sender));

    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown_token.clone()));

    let result = run_command(&dispatcher, cli.command).await;
    if let Err(e) = &result {
        error!("Notification failed: {}", e);
    }

    wait_for_flushes(
        &dispatcher,
        Duration::from_secs(cli.flush_wait),
        &shutdown_token,
    )
    .await;
    dispatcher.cleanup().await;

    result.context("알림 전송 실패")
}

async fn run_command(dispatcher: &Dispatcher, command: Commands) -> Result<()> {
    match command {
        Commands::Price {
            symbol,
            price,
            trigger,
            change_pct,
            volume,
            context,
            thread,
        } => {
            let mut alert = PriceAlert::new(symbol, price, trigger);
            alert.change_pct = change_pct;
            alert.volume = volume;
            alert.context = context;
            alert.message_thread_id = thread;
            dispatcher.price_alert(&alert).await?;
        }

        Commands::Position {
            exchange,
            symbol,
            size,
            pnl,
            action,
            entry,
            exit,
            fees,
            thread,
        } => {
            let mut update = PositionUpdate::new(exchange, symbol, size, pnl).with_action(action);
            update.entry_price = entry;
            update.exit_price = exit;
            update.fees = fees;
            update.message_thread_id = thread;
            dispatcher.position_update(&update).await?;
        }

        Commands::System {
            level,
            message,
            component,
            exchange,
            thread,
        } => {
            let mut alert = SystemAlert::new(level, message);
            alert.component = component;
            alert.exchange = exchange;
            alert.message_thread_id = thread;
            dispatcher.system_alert(&alert).await?;
        }

        Commands::Emergency {
            message,
            action,
            thread,
        } => {
            let mut alert = EmergencyAlert::new(message);
            alert.action_required = action;
            alert.message_thread_id = thread;
            dispatcher.emergency_alert(&alert).await?;
        }

        Commands::Custom {
            text,
            interval,
            key,
            thread,
        } => {
            dispatcher
                .custom_message(text, Duration::from_secs(interval), &key, thread)
                .await?;
        }

        Commands::Formatted { name, data, thread } => {
            let data: serde_json::Value =
                serde_json::from_str(&data).context("JSON 데이터 파싱 실패")?;
            dispatcher.send_formatted(&name, &data, thread).await?;
        }

        Commands::Burst {
            symbol,
            count,
            price,
            step,
        } => {
            run_burst(dispatcher, &symbol, count, price, step).await?;
        }
    }

    Ok(())
}

/// 가격 알림을 연속으로 보냅니다. 첫 건만 즉시 전송되고 나머지는 배치됩니다.
async fn run_burst(
    dispatcher: &Dispatcher,
    symbol: &str,
    count: u32,
    start: Decimal,
    step: Decimal,
) -> NotificationResult<()> {
    let mut price = start;
    for i in 0..count {
        let alert = PriceAlert::new(symbol, price, "alert").with_context(format!("burst #{}", i + 1));
        dispatcher.price_alert(&alert).await?;
        price += step;
    }

    let pending = dispatcher
        .throttle()
        .pending_count(NotificationCategory::PriceAlert, symbol)
        .await;
    info!(symbol, count, pending, "Burst sent");
    Ok(())
}

/// 예약된 배치가 모두 전송되거나, 시간이 초과되거나, 종료 시그널이 올 때까지 대기합니다.
async fn wait_for_flushes(dispatcher: &Dispatcher, max_wait: Duration, shutdown: &CancellationToken) {
    let deadline = tokio::time::Instant::now() + max_wait;

    loop {
        let outstanding = dispatcher.throttle().scheduled_flushes().await;
        if outstanding == 0 {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(outstanding, "Flush wait timed out, discarding pending batches");
            return;
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                warn!(outstanding, "Shutdown requested, discarding pending batches");
                return;
            }
            _ = tokio::time::sleep(FLUSH_POLL_INTERVAL) => {}
        }
    }
}

/// Ctrl+C 또는 SIGTERM 시그널을 기다립니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, shutting down...");
        }
    }

    shutdown_token.cancel();
}
