//! 알림 디스패처.
//!
//! 이벤트를 포맷하고 카테고리별 throttle 정책에 따라 즉시 전송하거나
//! 배치 큐에 넣습니다.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use notify_core::ThrottleSettings;
use serde_json::Value;
use tracing::{debug, warn};

use crate::formatter::{escape_html, FormatterRegistry, MessageFormatter};
use crate::throttle::ThrottleRegistry;
use crate::types::{
    send_fn_for, EmergencyAlert, MessageSender, NotificationCategory, NotificationResult,
    PositionUpdate, PriceAlert, SendFn, SystemAlert,
};

/// throttle 적용 알림 디스패처.
///
/// 최상위 소유자가 하나 만들어 `Arc`로 공유합니다.
pub struct Dispatcher {
    settings: ThrottleSettings,
    throttle: ThrottleRegistry,
    formatters: FormatterRegistry,
    sender: Arc<dyn MessageSender>,
}

impl Dispatcher {
    /// 내장 포맷터가 등록된 디스패처를 생성합니다.
    pub fn new(settings: ThrottleSettings, sender: Arc<dyn MessageSender>) -> Self {
        Self::with_formatters(settings, sender, FormatterRegistry::with_builtins())
    }

    /// 포맷터 레지스트리를 지정해 생성합니다.
    pub fn with_formatters(
        settings: ThrottleSettings,
        sender: Arc<dyn MessageSender>,
        formatters: FormatterRegistry,
    ) -> Self {
        let throttle = ThrottleRegistry::with_max_pending(settings.max_pending_messages);
        Self {
            settings,
            throttle,
            formatters,
            sender,
        }
    }

    pub fn settings(&self) -> &ThrottleSettings {
        &self.settings
    }

    /// 내부 throttle 레지스트리.
    pub fn throttle(&self) -> &ThrottleRegistry {
        &self.throttle
    }

    pub fn formatters(&self) -> &FormatterRegistry {
        &self.formatters
    }

    /// 가격 알림. 심볼별로 throttle 됩니다.
    pub async fn price_alert(&self, alert: &PriceAlert) -> NotificationResult<()> {
        let message = MessageFormatter::price_alert(alert, Utc::now());
        self.notify(
            NotificationCategory::PriceAlert,
            self.settings.price_alert_interval(),
            &alert.symbol,
            message,
            alert.message_thread_id,
        )
        .await
    }

    /// 포지션 업데이트. 거래소별로 배치됩니다.
    pub async fn position_update(&self, update: &PositionUpdate) -> NotificationResult<()> {
        let message = MessageFormatter::position_update(update, Utc::now());
        self.notify(
            NotificationCategory::PositionUpdate,
            self.settings.position_update_interval(),
            &update.exchange,
            message,
            update.message_thread_id,
        )
        .await
    }

    /// 시스템 알림. 레벨별로 throttle 됩니다.
    pub async fn system_alert(&self, alert: &SystemAlert) -> NotificationResult<()> {
        let message = MessageFormatter::system_alert(alert, Utc::now());
        self.notify(
            NotificationCategory::SystemAlert,
            self.settings.system_alert_interval(),
            &alert.level,
            message,
            alert.message_thread_id,
        )
        .await
    }

    /// 긴급 알림. throttle 없이 즉시 전송합니다.
    ///
    /// 간격이 항상 0이므로 레지스트리 상태를 만들지 않습니다.
    pub async fn emergency_alert(&self, alert: &EmergencyAlert) -> NotificationResult<()> {
        let message = MessageFormatter::emergency_alert(alert, Utc::now());
        let interval = self.settings.emergency_interval();
        debug_assert!(interval.is_zero());
        self.notify(
            NotificationCategory::Emergency,
            interval,
            NotificationCategory::Emergency.as_str(),
            message,
            alert.message_thread_id,
        )
        .await
    }

    /// 사용자 정의 메시지.
    ///
    /// `text`는 그대로 전송됩니다. `interval`이 0이면 즉시 전송합니다.
    pub async fn custom_message(
        &self,
        text: impl Into<String>,
        interval: Duration,
        key: &str,
        thread_id: Option<i64>,
    ) -> NotificationResult<()> {
        let text = text.into();
        if interval.is_zero() {
            return self.sender.send_text(&text, thread_id).await;
        }

        self.notify(NotificationCategory::Custom, interval, key, text, thread_id)
            .await
    }

    /// 등록된 포맷터로 데이터를 포맷해 즉시 전송합니다.
    ///
    /// 등록되지 않은 이름이면 JSON 텍스트를 그대로 보냅니다.
    pub async fn send_formatted(
        &self,
        name: &str,
        data: &Value,
        thread_id: Option<i64>,
    ) -> NotificationResult<()> {
        let message = match self.formatters.format(name, data) {
            Some(message) => message,
            None => {
                warn!(formatter = name, "Unknown formatter, sending raw JSON");
                let raw = serde_json::to_string_pretty(data)?;
                format!("<pre>{}</pre>", escape_html(&raw))
            }
        };

        self.sender.send_text(&message, thread_id).await
    }

    /// 예약된 모든 flush를 취소하고 throttle 상태를 초기화합니다.
    pub async fn cleanup(&self) {
        self.throttle.cleanup().await;
    }

    fn send_fn(&self, thread_id: Option<i64>) -> SendFn {
        send_fn_for(Arc::clone(&self.sender), thread_id)
    }

    async fn notify(
        &self,
        category: NotificationCategory,
        interval: Duration,
        subkey: &str,
        message: String,
        thread_id: Option<i64>,
    ) -> NotificationResult<()> {
        if self.throttle.decide(category, interval, subkey).await {
            return self.sender.send_text(&message, thread_id).await;
        }

        debug!(category = %category, key = subkey, "Throttled, queueing message");
        self.throttle
            .enqueue(category, interval, message, self.send_fn(thread_id), subkey)
            .await;
        Ok(())
    }
}
