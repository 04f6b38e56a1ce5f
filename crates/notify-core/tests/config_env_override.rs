//! `QUANT_NOTIFY__*` 환경 변수 오버라이드 통합 테스트
//!
//! 프로세스 환경 변수를 바꾸므로 다른 설정 테스트와 바이너리를 분리합니다.

use std::io::Write;

use notify_core::AppConfig;

const OVERRIDES: [(&str, &str); 3] = [
    ("QUANT_NOTIFY__THROTTLE__PRICE_ALERT", "7"),
    ("QUANT_NOTIFY__THROTTLE__MAX_PENDING_MESSAGES", "9"),
    ("QUANT_NOTIFY__TELEGRAM__CHAT_ID", "-100123"),
];

#[test]
fn test_env_overrides_file_values() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("임시 파일 생성 실패");
    file.write_all(
        br#"
[telegram]
bot_token = "123:abc"
chat_id = "42"

[throttle]
price_alert = 60
position_update = 15
max_pending_messages = 50
"#,
    )
    .expect("쓰기 실패");
    file.flush().expect("flush 실패");

    for (key, value) in OVERRIDES {
        std::env::set_var(key, value);
    }
    let loaded = AppConfig::load(file.path());
    for (key, _) in OVERRIDES {
        std::env::remove_var(key);
    }

    let config = loaded.unwrap();
    assert_eq!(config.throttle.price_alert, 7);
    assert_eq!(config.throttle.max_pending_messages, 9);
    assert_eq!(config.telegram.chat_id, "-100123");
    // 오버라이드하지 않은 값은 파일 값 유지
    assert_eq!(config.throttle.position_update, 15);
    assert_eq!(config.telegram.bot_token, "123:abc");
}
