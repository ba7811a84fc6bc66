//! Client order ID generation.
//!
//! Format: `<prefix><tag><13-digit ns timestamp><8 hex chars>`, with the tag
//! shortened to fit the exchange's length limit. No shared sequence is needed: the random
//! suffix keeps IDs from concurrent submissions in the same nanosecond apart.

use pm_core::time_util;

/// Binance `newClientOrderId` limit.
pub const BINANCE_MAX_LEN: usize = 32;
/// Gate `text` field limit, including the mandatory `t-` prefix.
pub const GATE_MAX_LEN: usize = 28;

/// Build a client order ID.
///
/// `prefix` is the exchange-mandated lead (`"x-"` for Binance broker IDs,
/// `"t-"` for Gate) and `tag` the configured broker tag.
pub fn generate(prefix: &str, tag: &str, max_len: usize) -> String {
    let ts = time_util::now_ns() % 10_000_000_000_000;
    let random = uuid::Uuid::new_v4().simple().to_string();
    let tail = format!("{ts:013}{}", &random[..8]);

    // The tag gives way first; timestamp and random suffix keep IDs apart.
    let room = max_len.saturating_sub(prefix.len() + tail.len());
    let tag: String = tag.chars().take(room).collect();
    let mut id = format!("{prefix}{tag}{tail}");
    if id.len() > max_len {
        id.truncate(max_len);
    }
    id
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn shape_and_limit() {
        let id = generate("x-", "KzrpZaP9", BINANCE_MAX_LEN);
        assert!(id.starts_with("x-KzrpZaP9"));
        assert_eq!(id.len(), 31);

        let gate = generate("t-", "pm", GATE_MAX_LEN);
        assert!(gate.starts_with("t-pm"));
        assert!(gate.len() <= GATE_MAX_LEN);

        let long = generate("x-", "a-very-long-broker-tag-", BINANCE_MAX_LEN);
        assert_eq!(long.len(), BINANCE_MAX_LEN);
        assert!(long.starts_with("x-a-very-l"));
    }

    #[test]
    fn long_tag_keeps_random_suffix() {
        let id = generate("t-", "a-broker-tag-longer-than-the-limit", GATE_MAX_LEN);
        assert_eq!(id.len(), GATE_MAX_LEN);
        let suffix = &id[id.len() - 8..];
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        let ts = &id[id.len() - 21..id.len() - 8];
        assert!(ts.chars().all(|c| c.is_ascii_digit()));

        let ids: HashSet<String> = (0..1000)
            .map(|_| generate("t-", "a-broker-tag-longer-than-the-limit", GATE_MAX_LEN))
            .collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn unique_across_burst() {
        let ids: HashSet<String> = (0..1000).map(|_| generate("t-", "", GATE_MAX_LEN)).collect();
        assert_eq!(ids.len(), 1000);
    }
}
