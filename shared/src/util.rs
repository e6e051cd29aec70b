/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a Snowflake-style i64 for use as resource ID.
///
/// Layout (53 bits, fits in JavaScript's Number.MAX_SAFE_INTEGER):
///   - 41 bits: milliseconds since 2025-01-01 UTC (~69 years)
///   - 12 bits: random (4096 values per ms, collision-free at storefront scale)
pub fn snowflake_id() -> i64 {
    use rand::Rng;
    // Custom epoch: 2025-01-01 00:00:00 UTC
    const EPOCH_MS: i64 = 1_735_689_600_000;
    let now = now_millis();
    let ts = (now - EPOCH_MS) & 0x1FF_FFFF_FFFF; // 41 bits
    let rand_bits: i64 = rand::thread_rng().gen_range(0..0x1000); // 12 bits
    (ts << 12) | rand_bits
}

/// Human-readable order number: `SO` + yyyymmdd + 6 random digits.
///
/// Uniqueness is guaranteed by the UNIQUE index on orders.order_number;
/// callers retry on the (vanishingly rare) collision.
pub fn order_number() -> String {
    use rand::Rng;
    let date = chrono::Utc::now().format("%Y%m%d");
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("SO{date}{suffix:06}")
}

/// Globally unique payment transaction code: `PAY` + yyyymmdd + snowflake.
///
/// Generated BEFORE the gateway call so a retried create never mints a
/// second intent for the same attempt.
pub fn transaction_code() -> String {
    let date = chrono::Utc::now().format("%Y%m%d");
    format!("PAY{date}{}", snowflake_id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snowflake_ids_are_positive_and_distinct() {
        let a = snowflake_id();
        let b = snowflake_id();
        assert!(a > 0);
        assert!(b > 0);
        assert_ne!(a, b);
    }

    #[test]
    fn order_number_shape() {
        let n = order_number();
        assert!(n.starts_with("SO"));
        assert_eq!(n.len(), 2 + 8 + 6);
    }

    #[test]
    fn transaction_code_prefix() {
        assert!(transaction_code().starts_with("PAY"));
    }
}
