//! Wall-clock timestamps at the resolutions the exchanges sign with.

use std::time::{SystemTime, UNIX_EPOCH};

#[inline]
fn since_epoch() -> std::time::Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// Current time as **seconds** since Unix epoch (Gate signatures).
#[inline]
pub fn now_secs() -> u64 {
    since_epoch().as_secs()
}

/// Current time as **milliseconds** since Unix epoch (Binance signatures).
#[inline]
pub fn now_ms() -> u64 {
    since_epoch().as_millis() as u64
}

/// Current time as **nanoseconds** since Unix epoch (client order IDs).
#[inline]
pub fn now_ns() -> u128 {
    since_epoch().as_nanos()
}

/// Apply a signed millisecond offset (server minus local) to a local timestamp.
#[inline]
pub fn offset_ms(local_ms: u64, offset: i64) -> u64 {
    (local_ms as i64).saturating_add(offset).max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolutions_agree() {
        let s = now_secs();
        let ms = now_ms();
        assert!(ms / 1000 >= s);
        assert!(ms / 1000 - s <= 1);
    }

    #[test]
    fn offset_never_negative() {
        assert_eq!(offset_ms(1_000, -250), 750);
        assert_eq!(offset_ms(100, -1_000), 0);
    }
}
