//! Price-source collaborator used as a fill-price fallback.

/// Current-price lookup outside the exchange adapter (a market-data feed,
/// a shared ticker cache).
pub trait PriceSource: Send + Sync {
    /// Latest price for a unified symbol, or `None` when unknown.
    fn current_price(&self, symbol: &str) -> Option<f64>;
}

/// Pick the best-known fill price.
///
/// Order: the exchange's reported average price, then the external price
/// source, then the adapter's own ticker. Non-positive values are skipped.
pub fn best_fill_price(
    reported: Option<f64>,
    source: Option<&dyn PriceSource>,
    symbol: &str,
    ticker: Option<f64>,
) -> Option<f64> {
    let valid = |p: f64| p.is_finite() && p > 0.0;
    reported
        .filter(|p| valid(*p))
        .or_else(|| source.and_then(|s| s.current_price(symbol)).filter(|p| valid(*p)))
        .or_else(|| ticker.filter(|p| valid(*p)))
}
