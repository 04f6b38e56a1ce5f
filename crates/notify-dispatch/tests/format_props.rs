//! 숫자 포맷 속성 테스트

use notify_dispatch::{combine_batch, group_thousands, MessageFormatter, BATCH_SEPARATOR};
use proptest::prelude::*;
use rust_decimal::Decimal;

proptest! {
    #[test]
    fn test_group_thousands_preserves_digits(n in any::<i64>()) {
        let plain = n.to_string();
        let grouped = group_thousands(&plain);

        prop_assert_eq!(grouped.replace(',', ""), plain);
        for part in grouped.trim_start_matches('-').split(',').skip(1) {
            prop_assert_eq!(part.len(), 3);
        }
    }

    #[test]
    fn test_large_prices_have_two_decimals(units in 1_000i64..1_000_000_000, cents in 0i64..100) {
        let price = Decimal::new(units * 100 + cents, 2);
        let formatted = MessageFormatter::format_price(price);

        let (int_part, frac) = formatted.split_once('.').unwrap();
        prop_assert_eq!(frac.len(), 2);
        prop_assert_eq!(int_part.replace(',', ""), units.to_string());
    }

    #[test]
    fn test_small_prices_have_at_most_six_decimals(raw in 1i64..999_999_000) {
        let price = Decimal::new(raw, 9);
        let formatted = MessageFormatter::format_price(price);

        prop_assert!(formatted.starts_with("0"));
        if let Some((_, frac)) = formatted.split_once('.') {
            prop_assert!(frac.len() <= 6);
            prop_assert!(!frac.ends_with('0'));
        }
    }

    #[test]
    fn test_batch_contains_every_message(messages in prop::collection::vec("[a-z]{1,8}", 2..10)) {
        let combined = combine_batch(messages.clone(), 0);
        let header = format!("📊 <b>Batched Updates ({})</b>\n\n", messages.len());

        prop_assert!(combined.starts_with(&header));
        let body = &combined[header.len()..];
        let parts: Vec<&str> = body.split(BATCH_SEPARATOR).collect();
        prop_assert_eq!(parts, messages.iter().map(String::as_str).collect::<Vec<_>>());
    }
}
