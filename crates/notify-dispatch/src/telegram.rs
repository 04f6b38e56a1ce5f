//! 텔레그램 전송기.
//!
//! Telegram Bot API `sendMessage`로 포맷된 텍스트를 전송합니다.
//! 재시도는 하지 않습니다. 실패는 호출자에게 그대로 반환됩니다.

use async_trait::async_trait;
use notify_core::TelegramSettings;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::types::{MessageSender, NotificationError, NotificationResult};

/// 429 응답에 `retry_after`가 없을 때 사용하는 대기 시간(초).
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Bot API 에러 응답 중 필요한 부분.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    parameters: Option<ApiErrorParameters>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// 텔레그램 알림 전송기.
pub struct TelegramSender {
    settings: TelegramSettings,
    client: reqwest::Client,
}

impl TelegramSender {
    /// 새 텔레그램 전송기를 생성합니다.
    pub fn new(settings: TelegramSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }

    /// 전송 설정.
    pub fn settings(&self) -> &TelegramSettings {
        &self.settings
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.bot_token
        )
    }

    fn payload(&self, text: &str, thread_id: Option<i64>) -> serde_json::Value {
        let mut params = serde_json::json!({
            "chat_id": self.settings.chat_id,
            "text": text,
            "parse_mode": self.settings.parse_mode,
            "disable_web_page_preview": self.settings.disable_web_page_preview,
        });

        // 호출자가 지정한 토픽이 우선, 없으면 설정의 기본 토픽
        if let Some(thread_id) = thread_id.or(self.settings.message_thread_id) {
            params["message_thread_id"] = serde_json::Value::from(thread_id);
        }

        params
    }
}

#[async_trait]
impl MessageSender for TelegramSender {
    async fn send_text(&self, text: &str, thread_id: Option<i64>) -> NotificationResult<()> {
        if !self.is_enabled() {
            debug!("Telegram notifications are disabled, skipping");
            return Ok(());
        }

        let params = self.payload(text, thread_id);

        debug!(
            chat_id = %self.settings.chat_id,
            thread_id = ?params.get("message_thread_id"),
            "Sending Telegram message"
        );

        let response = self
            .client
            .post(self.endpoint())
            .json(&params)
            .send()
            .await
            .map_err(NotificationError::NetworkError)?;

        let status = response.status();
        if status.is_success() {
            info!("Telegram notification sent successfully");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 {
            let retry_after = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.parameters)
                .and_then(|p| p.retry_after)
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            warn!(retry_after, "Telegram rate limited");
            return Err(NotificationError::RateLimited(retry_after));
        }

        error!("Failed to send Telegram message: {} - {}", status, body);
        Err(NotificationError::SendFailed(format!(
            "HTTP {}: {}",
            status, body
        )))
    }

    fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

/// 실제 전송 없이 로그로만 남기는 전송기.
///
/// `--dry-run` 실행과 로컬 점검용입니다.
#[derive(Debug, Default)]
pub struct LogSender;

#[async_trait]
impl MessageSender for LogSender {
    async fn send_text(&self, text: &str, thread_id: Option<i64>) -> NotificationResult<()> {
        info!(thread_id = ?thread_id, "[dry-run]\n{}", text);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "log"
    }
}
