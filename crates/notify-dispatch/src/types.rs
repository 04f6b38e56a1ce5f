//! 알림 타입 및 trait 정의.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 알림 카테고리.
///
/// 카테고리마다 하나의 throttle 간격 정책을 공유합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    /// 가격 알림 (심볼별 throttle)
    PriceAlert,
    /// 포지션 업데이트 (거래소별 배치)
    PositionUpdate,
    /// 시스템 알림 (레벨별 throttle)
    SystemAlert,
    /// 사용자 정의 메시지 (호출자 지정 키)
    Custom,
    /// 긴급 알림 (throttle 없음)
    Emergency,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriceAlert => "price_alert",
            Self::PositionUpdate => "position_update",
            Self::SystemAlert => "system_alert",
            Self::Custom => "custom",
            Self::Emergency => "emergency",
        }
    }
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 가격 알림 이벤트.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceAlert {
    pub symbol: String,
    pub price: Decimal,
    /// spike, drop, breakout, breakdown, target, alert
    pub trigger_type: String,
    #[serde(default)]
    pub change_pct: Option<Decimal>,
    #[serde(default)]
    pub volume: Option<Decimal>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub message_thread_id: Option<i64>,
}

impl PriceAlert {
    pub fn new(symbol: impl Into<String>, price: Decimal, trigger_type: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            trigger_type: trigger_type.into(),
            change_pct: None,
            volume: None,
            context: None,
            message_thread_id: None,
        }
    }

    pub fn with_change_pct(mut self, change_pct: Decimal) -> Self {
        self.change_pct = Some(change_pct);
        self
    }

    pub fn with_volume(mut self, volume: Decimal) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn in_thread(mut self, thread_id: i64) -> Self {
        self.message_thread_id = Some(thread_id);
        self
    }
}

/// 포지션 업데이트 이벤트.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub exchange: String,
    pub symbol: String,
    /// 양수 = 롱, 음수 = 숏
    pub size: Decimal,
    pub pnl: Decimal,
    /// opened, closed, increased, decreased, update
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    #[serde(default)]
    pub exit_price: Option<Decimal>,
    #[serde(default)]
    pub fees: Option<Decimal>,
    #[serde(default)]
    pub message_thread_id: Option<i64>,
}

fn default_action() -> String {
    "update".to_string()
}

impl PositionUpdate {
    pub fn new(
        exchange: impl Into<String>,
        symbol: impl Into<String>,
        size: Decimal,
        pnl: Decimal,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            size,
            pnl,
            action: default_action(),
            entry_price: None,
            exit_price: None,
            fees: None,
            message_thread_id: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn with_entry_price(mut self, price: Decimal) -> Self {
        self.entry_price = Some(price);
        self
    }

    pub fn with_exit_price(mut self, price: Decimal) -> Self {
        self.exit_price = Some(price);
        self
    }

    pub fn with_fees(mut self, fees: Decimal) -> Self {
        self.fees = Some(fees);
        self
    }

    pub fn in_thread(mut self, thread_id: i64) -> Self {
        self.message_thread_id = Some(thread_id);
        self
    }
}

/// 시스템 알림 이벤트.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemAlert {
    /// info, warning, error, critical
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub message_thread_id: Option<i64>,
}

impl SystemAlert {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            message: message.into(),
            component: None,
            exchange: None,
            message_thread_id: None,
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    pub fn in_thread(mut self, thread_id: i64) -> Self {
        self.message_thread_id = Some(thread_id);
        self
    }
}

/// 긴급 알림 이벤트. throttle을 거치지 않고 즉시 전송됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyAlert {
    pub message: String,
    #[serde(default)]
    pub action_required: Option<String>,
    #[serde(default)]
    pub message_thread_id: Option<i64>,
}

impl EmergencyAlert {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            action_required: None,
            message_thread_id: None,
        }
    }

    pub fn with_action_required(mut self, action: impl Into<String>) -> Self {
        self.action_required = Some(action.into());
        self
    }

    pub fn in_thread(mut self, thread_id: i64) -> Self {
        self.message_thread_id = Some(thread_id);
        self
    }
}

/// 알림 작업용 Result 타입.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// 알림 에러.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("알림 전송 실패: {0}")]
    SendFailed(String),

    #[error("요청 한도 초과: {0}초 후 재시도")]
    RateLimited(u64),

    #[error("네트워크 에러: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("직렬화 에러: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// 포맷된 텍스트를 채팅 엔드포인트로 전달하는 전송기.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// 텍스트 한 건을 전송합니다. `thread_id`가 있으면 해당 토픽으로 보냅니다.
    async fn send_text(&self, text: &str, thread_id: Option<i64>) -> NotificationResult<()>;

    /// 전송기가 활성화되어 있는지 확인합니다.
    fn is_enabled(&self) -> bool;

    /// 전송기 이름을 반환합니다.
    fn name(&self) -> &str;
}

/// throttle 레지스트리가 보관했다가 flush 시점에 호출하는 전송 함수.
pub type SendFn = Arc<dyn Fn(String) -> BoxFuture<'static, NotificationResult<()>> + Send + Sync>;

/// 전송기와 토픽 ID를 묶어 [`SendFn`]을 만듭니다.
pub fn send_fn_for(sender: Arc<dyn MessageSender>, thread_id: Option<i64>) -> SendFn {
    Arc::new(move |text: String| -> BoxFuture<'static, NotificationResult<()>> {
        let sender = Arc::clone(&sender);
        Box::pin(async move { sender.send_text(&text, thread_id).await })
    })
}
