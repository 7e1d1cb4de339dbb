use chrono::Utc;

/// Milliseconds since the Unix epoch, as carried in outbound event timestamps.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_monotonic_enough_and_after_2020() {
        let first = now_millis();
        let second = now_millis();
        assert!(first > 1_577_836_800_000);
        assert!(second >= first);
    }
}
