use std::time::{Duration, SystemTime};

/// Milliseconds since the unix epoch. A clock set before 1970 reads as 0.
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_is_after_2023() {
        assert!(current_timestamp() > 1_672_531_200_000);
    }
}
