//! # Notify Dispatch
//!
//! throttle이 적용된 트레이딩 알림 디스패처.
//!
//! - 카테고리 + 서브키별로 전송 빈도를 제한합니다.
//! - throttle 윈도우 안에 들어온 메시지는 큐에 모았다가 한 번에 배치 전송합니다.
//! - 긴급 알림과 간격 0인 카테고리는 throttle을 거치지 않습니다.
//!
//! 지원 채널:
//! - Telegram (Bot API `sendMessage`)
//! - 로그 출력 (dry-run)

pub mod dispatcher;
pub mod formatter;
pub mod telegram;
pub mod throttle;
pub mod types;

pub use dispatcher::*;
pub use formatter::*;
pub use telegram::*;
pub use throttle::*;
pub use types::*;
