//! 설정 관리.
//!
//! 환경 변수 또는 TOML 파일(+ `QUANT_NOTIFY__*` 환경 변수 오버라이드)에서
//! 텔레그램 전송 설정, 카테고리별 throttle 간격, 로깅 설정을 로드합니다.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::logging::LogFormat;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// 텔레그램 전송 설정
    pub telegram: TelegramSettings,
    /// 카테고리별 throttle 설정
    #[serde(default)]
    pub throttle: ThrottleSettings,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 텔레그램 전송 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramSettings {
    /// @BotFather에서 받은 봇 토큰
    pub bot_token: String,
    /// 메시지를 보낼 채팅 ID
    pub chat_id: String,
    /// 전송 활성화 여부
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 파싱 모드 (HTML 또는 MarkdownV2)
    #[serde(default = "default_parse_mode")]
    pub parse_mode: String,
    /// 링크 미리보기 비활성화
    #[serde(default = "default_true")]
    pub disable_web_page_preview: bool,
    /// 포럼 그룹의 기본 토픽 ID
    #[serde(default)]
    pub message_thread_id: Option<i64>,
    /// Bot API 기본 URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl TelegramSettings {
    /// 토큰과 채팅 ID로 기본 설정을 생성합니다.
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            enabled: true,
            parse_mode: default_parse_mode(),
            disable_web_page_preview: true,
            message_thread_id: None,
            api_base: default_api_base(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_parse_mode() -> String {
    "HTML".to_string()
}
fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

/// 카테고리별 throttle 간격 (초).
///
/// 0은 해당 카테고리를 throttle 하지 않음을 의미합니다.
/// 긴급(emergency) 알림은 항상 0이며 설정할 수 없습니다.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ThrottleSettings {
    /// 심볼별 가격 알림 간격
    #[serde(default = "default_price_alert")]
    pub price_alert: u64,
    /// 거래소별 포지션 업데이트 배치 윈도우
    #[serde(default = "default_position_update")]
    pub position_update: u64,
    /// 레벨별 시스템 알림 간격
    #[serde(default = "default_system_alert")]
    pub system_alert: u64,
    /// 키별 대기 메시지 최대 개수 (0 = 무제한)
    #[serde(default = "default_max_pending")]
    pub max_pending_messages: usize,
}

fn default_price_alert() -> u64 {
    60
}
fn default_position_update() -> u64 {
    30
}
fn default_system_alert() -> u64 {
    120
}
fn default_max_pending() -> usize {
    50
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            price_alert: default_price_alert(),
            position_update: default_position_update(),
            system_alert: default_system_alert(),
            max_pending_messages: default_max_pending(),
        }
    }
}

impl ThrottleSettings {
    /// 모든 카테고리의 throttle을 끈 설정.
    pub fn disabled() -> Self {
        Self {
            price_alert: 0,
            position_update: 0,
            system_alert: 0,
            ..Default::default()
        }
    }

    pub fn price_alert_interval(&self) -> Duration {
        Duration::from_secs(self.price_alert)
    }

    pub fn position_update_interval(&self) -> Duration {
        Duration::from_secs(self.position_update)
    }

    pub fn system_alert_interval(&self) -> Duration {
        Duration::from_secs(self.system_alert)
    }

    pub fn emergency_interval(&self) -> Duration {
        Duration::ZERO
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨 필터 (예: "info", "notify_dispatch=debug")
    #[serde(default = "default_level")]
    pub level: String,
    /// 출력 형식
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// 프로세스 환경 변수에서 설정을 생성합니다.
    ///
    /// `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`는 필수입니다.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 키-값 조회 함수에서 설정을 생성합니다.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingVar("TELEGRAM_BOT_TOKEN"))?;
        let chat_id = lookup("TELEGRAM_CHAT_ID")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingVar("TELEGRAM_CHAT_ID"))?;

        let mut telegram = TelegramSettings::new(bot_token, chat_id);
        if let Some(mode) = lookup("TELEGRAM_PARSE_MODE") {
            telegram.parse_mode = mode;
        }
        if let Some(v) = lookup("TELEGRAM_DISABLE_PREVIEW") {
            telegram.disable_web_page_preview = parse_bool("TELEGRAM_DISABLE_PREVIEW", &v)?;
        }
        if let Some(v) = lookup("TELEGRAM_ENABLED") {
            telegram.enabled = parse_bool("TELEGRAM_ENABLED", &v)?;
        }
        if let Some(v) = lookup("TELEGRAM_THREAD_ID") {
            let id = v
                .trim()
                .parse::<i64>()
                .map_err(|e| ConfigError::invalid("TELEGRAM_THREAD_ID", &v, e.to_string()))?;
            telegram.message_thread_id = Some(id);
        }
        if let Some(base) = lookup("TELEGRAM_API_BASE") {
            telegram.api_base = base;
        }

        let defaults = ThrottleSettings::default();
        let throttle = ThrottleSettings {
            price_alert: parse_interval(
                "THROTTLE_PRICE_ALERT",
                lookup("THROTTLE_PRICE_ALERT"),
                defaults.price_alert,
            )?,
            position_update: parse_interval(
                "THROTTLE_POSITION_UPDATE",
                lookup("THROTTLE_POSITION_UPDATE"),
                defaults.position_update,
            )?,
            system_alert: parse_interval(
                "THROTTLE_SYSTEM_ALERT",
                lookup("THROTTLE_SYSTEM_ALERT"),
                defaults.system_alert,
            )?,
            max_pending_messages: match lookup("THROTTLE_MAX_PENDING") {
                Some(v) => v.trim().parse::<usize>().map_err(|e| {
                    ConfigError::invalid("THROTTLE_MAX_PENDING", &v, e.to_string())
                })?,
                None => defaults.max_pending_messages,
            },
        };

        let mut logging = LoggingConfig::default();
        if let Some(level) = lookup("RUST_LOG") {
            logging.level = level;
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            logging.format = v
                .parse()
                .map_err(|e: String| ConfigError::invalid("LOG_FORMAT", &v, e))?;
        }

        let config = Self {
            telegram,
            throttle,
            logging,
        };
        config.validate()?;
        Ok(config)
    }

    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일 값은 `QUANT_NOTIFY__THROTTLE__PRICE_ALERT=10` 형태의
    /// 환경 변수로 덮어쓸 수 있습니다.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("QUANT_NOTIFY")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 로드된 설정을 검증합니다.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::invalid(
                "telegram.bot_token",
                "",
                "봇 토큰이 비어 있습니다",
            ));
        }
        if self.telegram.chat_id.trim().is_empty() {
            return Err(ConfigError::invalid(
                "telegram.chat_id",
                "",
                "채팅 ID가 비어 있습니다",
            ));
        }
        Ok(())
    }
}

/// 초 단위 throttle 간격 파싱. 음수는 거부합니다.
fn parse_interval(key: &str, raw: Option<String>, default: u64) -> ConfigResult<u64> {
    let Some(raw) = raw else {
        return Ok(default);
    };

    let value = raw
        .trim()
        .parse::<i64>()
        .map_err(|e| ConfigError::invalid(key, &raw, e.to_string()))?;

    u64::try_from(value)
        .map_err(|_| ConfigError::invalid(key, &raw, "throttle 간격은 음수일 수 없습니다"))
}

fn parse_bool(key: &str, raw: &str) -> ConfigResult<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, raw, "true/false 값이어야 합니다")),
    }
}
