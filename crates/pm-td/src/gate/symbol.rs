//! Unified symbol ↔ Gate contract name conversion.
//!
//! Unified symbols are concatenated (`ETHUSDT`); Gate contracts use an
//! underscore before the settlement currency (`ETH_USDT`).

const QUOTES: &[&str] = &["USDT", "USDC", "USD"];

/// `ETHUSDT` → `ETH_USDT`. Names that already contain `_` pass through.
pub fn to_contract(symbol: &str) -> String {
    let upper = symbol.to_ascii_uppercase();
    if upper.contains('_') {
        return upper;
    }
    for quote in QUOTES {
        if let Some(base) = upper.strip_suffix(quote) {
            if !base.is_empty() {
                return format!("{base}_{quote}");
            }
        }
    }
    upper
}

/// `ETH_USDT` → `ETHUSDT`.
pub fn to_unified(contract: &str) -> String {
    contract.replace('_', "").to_ascii_uppercase()
}
