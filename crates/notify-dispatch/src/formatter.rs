//! 알림 메시지 포맷.
//!
//! - [`MessageFormatter`]: 이벤트 구조체를 텔레그램 HTML 텍스트로 변환하는 순수 함수 모음
//! - [`FormatterRegistry`]: 이름 → 포맷 함수 매핑. 시작 시 채워두고 이름으로 조회합니다.
//!
//! 포맷 결과는 throttle 계층에서 불투명한 문자열로 취급됩니다.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::types::{EmergencyAlert, PositionUpdate, PriceAlert, SystemAlert};

/// 이벤트 메시지 포맷터.
pub struct MessageFormatter;

impl MessageFormatter {
    /// `HH:MM UTC` 형식 타임스탬프.
    pub fn timestamp(at: DateTime<Utc>) -> String {
        at.format("%H:%M UTC").to_string()
    }

    /// 가격 포맷.
    ///
    /// 1000 이상은 천 단위 구분자와 소수 2자리, 1 이상은 소수 2자리,
    /// 1 미만은 최대 소수 6자리(뒤쪽 0 제거).
    pub fn format_price(price: Decimal) -> String {
        if price >= Decimal::ONE_THOUSAND {
            group_thousands(&format!("{:.2}", price.round_dp(2)))
        } else if price >= Decimal::ONE {
            format!("{:.2}", price.round_dp(2))
        } else {
            price.round_dp(6).normalize().to_string()
        }
    }

    /// 부호가 붙은 퍼센트 (예: `+5.20%`, `-1.05%`).
    pub fn format_percentage(value: Decimal) -> String {
        let sign = if value >= Decimal::ZERO { "+" } else { "" };
        format!("{sign}{:.2}%", value.round_dp(2))
    }

    /// 색상 이모지와 부호가 붙은 손익 (예: `🟢 +$1,250.00`).
    pub fn format_pnl(pnl: Decimal) -> String {
        let (emoji, sign) = if pnl >= Decimal::ZERO {
            ("🟢", "+")
        } else {
            ("🔴", "-")
        };
        format!("{emoji} {sign}${}", money(pnl.abs(), 2))
    }

    /// 가격 알림.
    pub fn price_alert(alert: &PriceAlert, at: DateTime<Utc>) -> String {
        let emoji = match alert.trigger_type.to_lowercase().as_str() {
            "spike" => "🚨",
            "drop" => "📉",
            "breakout" => "🚀",
            "breakdown" => "⬇️",
            "target" => "🎯",
            "alert" => "🔔",
            _ => "📊",
        };

        let mut message = format!(
            "{emoji} <b>{}</b> ${}",
            escape_html(&alert.symbol),
            Self::format_price(alert.price)
        );

        if let Some(change) = alert.change_pct {
            message.push_str(&format!(" ({})", Self::format_percentage(change)));
        }

        message.push_str(&format!(
            " - {} at {}",
            title_case(&alert.trigger_type),
            Self::timestamp(at)
        ));

        if let Some(volume) = alert.volume {
            message.push_str(&format!("\n📈 Volume: {}", money(volume, 0)));
        }
        if let Some(context) = &alert.context {
            message.push_str(&format!("\n💬 {}", escape_html(context)));
        }

        message
    }

    /// 포지션 업데이트.
    pub fn position_update(update: &PositionUpdate, at: DateTime<Utc>) -> String {
        let emoji = match update.action.to_lowercase().as_str() {
            "opened" => "📈",
            "closed" => "📊",
            "increased" => "⬆️",
            "decreased" => "⬇️",
            "update" => "🔄",
            _ => "📊",
        };

        let size = update.size.abs().round_dp(4).normalize();
        let side = if update.size > Decimal::ZERO {
            "Long"
        } else {
            "Short"
        };

        let mut message = format!(
            "{emoji} <b>{}</b> {size} {} on {}\n💰 PnL: {}\n📍 {side} | {}",
            title_case(&update.action),
            escape_html(&update.symbol),
            title_case(&update.exchange),
            Self::format_pnl(update.pnl),
            Self::timestamp(at)
        );

        if let Some(entry) = update.entry_price {
            message.push_str(&format!("\n💵 Entry: ${}", Self::format_price(entry)));
        }
        if let Some(exit) = update.exit_price {
            message.push_str(&format!("\n💸 Exit: ${}", Self::format_price(exit)));
        }
        if let Some(fees) = update.fees {
            message.push_str(&format!("\n💸 Fees: ${:.2}", fees.round_dp(2)));
        }

        message
    }

    /// 시스템 알림.
    pub fn system_alert(alert: &SystemAlert, at: DateTime<Utc>) -> String {
        let (emoji, level_text) = match alert.level.to_lowercase().as_str() {
            "info" => ("ℹ️", "Info".to_string()),
            "warning" => ("⚠️", "Warning".to_string()),
            "error" => ("❌", "Error".to_string()),
            "critical" => ("🚨", "CRITICAL".to_string()),
            _ => ("📝", title_case(&alert.level)),
        };

        let mut message = format!(
            "{emoji} <b>{level_text}</b> | {}\n{}",
            Self::timestamp(at),
            escape_html(&alert.message)
        );

        if let Some(component) = &alert.component {
            message.push_str(&format!("\n🔧 Component: {}", escape_html(component)));
        }
        if let Some(exchange) = &alert.exchange {
            message.push_str(&format!("\n🏦 Exchange: {}", escape_html(exchange)));
        }

        message
    }

    /// 긴급 알림.
    pub fn emergency_alert(alert: &EmergencyAlert, at: DateTime<Utc>) -> String {
        let mut message = format!(
            "⚡ <b>URGENT</b> | {}\n{}",
            Self::timestamp(at),
            escape_html(&alert.message)
        );

        if let Some(action) = &alert.action_required {
            message.push_str(&format!("\n🎯 Action: {}", escape_html(action)));
        }

        message
    }
}

/// 이름으로 조회되는 포맷 함수.
pub type FormatFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// 포맷 함수 레지스트리.
///
/// 디스패처와 공유하기 전에 모두 등록해야 합니다.
#[derive(Clone, Default)]
pub struct FormatterRegistry {
    formatters: HashMap<String, FormatFn>,
}

impl FormatterRegistry {
    /// 빈 레지스트리.
    pub fn new() -> Self {
        Self::default()
    }

    /// `positions_summary`, `portfolio_summary`, `pnl_summary`가 등록된 레지스트리.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("positions_summary", positions_summary);
        registry.register("portfolio_summary", portfolio_summary);
        registry.register("pnl_summary", pnl_summary);
        registry
    }

    /// 포맷 함수를 등록합니다. 같은 이름이 있으면 교체합니다.
    pub fn register<F>(&mut self, name: impl Into<String>, formatter: F)
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.formatters.insert(name.into(), Arc::new(formatter));
    }

    /// 이름으로 포맷합니다. 등록되지 않은 이름이면 `None`.
    pub fn format(&self, name: &str, data: &Value) -> Option<String> {
        self.formatters.get(name).map(|f| f(data))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.formatters.contains_key(name)
    }

    /// 등록된 이름 목록 (정렬됨).
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.formatters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn error_message(data: &Value) -> Option<String> {
    data.get("error")
        .map(|e| format!("<b>ERROR</b>: {}", escape_html(&value_text(e))))
}

fn positions_summary(data: &Value) -> String {
    let Some(positions) = data.as_array() else {
        return error_message(data).unwrap_or_else(|| escape_html(&data.to_string()));
    };

    if let Some(err) = positions.iter().find_map(error_message) {
        return err;
    }
    if positions.is_empty() {
        return "<b>POSITIONS</b>\n\nNo open positions".to_string();
    }

    let mut lines = vec![format!("<b>POSITIONS ({})</b>\n", positions.len())];
    for position in positions {
        let symbol = position
            .get("symbol")
            .map(value_text)
            .unwrap_or_else(|| "?".to_string());
        let size = json_decimal(position, "size");
        let side = position
            .get("side")
            .map(value_text)
            .unwrap_or_else(|| (if size >= Decimal::ZERO { "LONG" } else { "SHORT" }).to_string());

        let mut line = format!(
            "<b>{}</b> {} {}",
            escape_html(&symbol),
            escape_html(&side),
            size.abs().round_dp(4).normalize()
        );
        if position.get("entry_price").is_some() {
            line.push_str(&format!(
                " @ ${}",
                MessageFormatter::format_price(json_decimal(position, "entry_price"))
            ));
        }
        line.push_str(&format!(
            "\n    PnL: {}",
            MessageFormatter::format_pnl(json_decimal(position, "pnl"))
        ));
        lines.push(line);
    }
    lines.join("\n")
}

fn portfolio_summary(data: &Value) -> String {
    if let Some(err) = error_message(data) {
        return err;
    }

    let open_positions = data
        .get("open_positions")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    [
        "<b>PORTFOLIO SUMMARY</b>\n".to_string(),
        format!("Total Balance: ${}", money(json_decimal(data, "total_balance"), 2)),
        format!("Available: ${}", money(json_decimal(data, "available_balance"), 2)),
        format!("Total P&amp;L: {}", signed_money(json_decimal(data, "total_pnl"))),
        format!("Open Positions: {open_positions}"),
        format!("Daily Volume: ${}", money(json_decimal(data, "daily_volume"), 0)),
    ]
    .join("\n")
}

fn pnl_summary(data: &Value) -> String {
    if let Some(err) = error_message(data) {
        return err;
    }

    [
        "<b>P&amp;L SUMMARY</b>\n".to_string(),
        format!("Daily: {}", signed_money(json_decimal(data, "daily_pnl"))),
        format!("Weekly: {}", signed_money(json_decimal(data, "weekly_pnl"))),
        format!("Monthly: {}", signed_money(json_decimal(data, "monthly_pnl"))),
        format!("Realized: {}", signed_money(json_decimal(data, "total_realized"))),
        format!("Unrealized: {}", signed_money(json_decimal(data, "total_unrealized"))),
    ]
    .join("\n")
}

fn json_decimal(data: &Value, key: &str) -> Decimal {
    match data.get(key) {
        Some(Value::Number(n)) => n.as_f64().and_then(Decimal::from_f64).unwrap_or_default(),
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        _ => Decimal::ZERO,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 천 단위 구분자가 붙은 금액 (부호 없음 가정).
fn money(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp(dp);
    let text = if dp == 0 {
        rounded.trunc().to_string()
    } else {
        format!("{:.*}", dp as usize, rounded)
    };
    group_thousands(&text)
}

/// `+$1,250.80` / `-$45.20`
fn signed_money(value: Decimal) -> String {
    let sign = if value >= Decimal::ZERO { "+" } else { "-" };
    format!("{sign}${}", money(value.abs(), 2))
}

/// 정수부에 천 단위 구분자를 삽입합니다.
pub fn group_thousands(number: &str) -> String {
    let (sign, unsigned) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }

    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

/// 단어 첫 글자만 대문자로 (`stop_loss` → `Stop_Loss`).
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// 텔레그램 HTML 모드용 이스케이프.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
