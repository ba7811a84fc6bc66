//! Per-symbol trading rules from Binance `exchangeInfo`.
//!
//! Quantity precision is the number of decimals in the `LOT_SIZE` filter's
//! `stepSize` after trailing zeros are trimmed (`"0.00100000"` → 3). The
//! `MIN_NOTIONAL` filter's `notional` is kept alongside.
//!
//! The table is filled once per symbol on first use and never expires.

use std::collections::HashMap;

use serde_json::Value;

use crate::normalize::num;

/// Precision used when a symbol has no `LOT_SIZE` filter.
pub const DEFAULT_PRECISION: u32 = 3;

/// Rules for one symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymbolRules {
    pub quantity_precision: u32,
    /// Exchange minimum notional in USDT, if the filter was present.
    pub min_notional: Option<f64>,
}

impl Default for SymbolRules {
    fn default() -> Self {
        Self {
            quantity_precision: DEFAULT_PRECISION,
            min_notional: None,
        }
    }
}

/// Decimal places of a step size string.
pub fn precision_of(step_size: &str) -> u32 {
    let trimmed = if step_size.contains('.') {
        step_size.trim_end_matches('0').trim_end_matches('.')
    } else {
        step_size
    };
    match trimmed.split_once('.') {
        Some((_, frac)) => frac.len() as u32,
        None => 0,
    }
}

/// Round `quantity` down to `precision` decimals.
pub fn quantize(quantity: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    // Nudge before flooring so 0.3 / 0.1-style float error does not lose a step.
    ((quantity * factor) + 1e-9).floor() / factor
}

/// Render a quantity with exactly `precision` decimals.
pub fn format_quantity(quantity: f64, precision: u32) -> String {
    format!("{:.*}", precision as usize, quantize(quantity, precision))
}

/// Symbol → rules lookup built from `exchangeInfo`.
#[derive(Debug, Clone, Default)]
pub struct PrecisionTable {
    rules: HashMap<String, SymbolRules>,
}

impl PrecisionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<SymbolRules> {
        self.rules.get(symbol).copied()
    }

    pub fn insert(&mut self, symbol: &str, rules: SymbolRules) {
        self.rules.insert(symbol.to_string(), rules);
    }

    /// Load every symbol in an `exchangeInfo` response.
    ///
    /// Symbols without a `LOT_SIZE` filter get [`DEFAULT_PRECISION`].
    pub fn load_from_exchange_info(&mut self, info: &Value) {
        let Some(symbols) = info.get("symbols").and_then(Value::as_array) else {
            return;
        };

        for sym_info in symbols {
            let Some(symbol) = sym_info.get("symbol").and_then(Value::as_str) else {
                continue;
            };
            let filters = sym_info.get("filters").and_then(Value::as_array);
            let find = |kind: &str| {
                filters.and_then(|fs| {
                    fs.iter()
                        .find(|f| f.get("filterType").and_then(Value::as_str) == Some(kind))
                })
            };

            let quantity_precision = find("LOT_SIZE")
                .and_then(|f| f.get("stepSize").and_then(Value::as_str))
                .map(precision_of)
                .unwrap_or(DEFAULT_PRECISION);
            let min_notional = find("MIN_NOTIONAL")
                .map(|f| num(f, "notional"))
                .filter(|n| *n > 0.0);

            self.insert(
                symbol,
                SymbolRules {
                    quantity_precision,
                    min_notional,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn step_size_precision() {
        assert_eq!(precision_of("0.00100000"), 3);
        assert_eq!(precision_of("0.1"), 1);
        assert_eq!(precision_of("1.00000000"), 0);
        assert_eq!(precision_of("1"), 0);
        assert_eq!(precision_of("10"), 0);
    }

    #[test]
    fn quantize_rounds_down() {
        assert_eq!(format_quantity(0.022_222, 3), "0.022");
        assert_eq!(format_quantity(0.3, 1), "0.3");
        assert_eq!(format_quantity(12.9, 0), "12");
        assert_eq!(quantize(0.0009, 3), 0.0);
    }

    #[test]
    fn loads_filters() {
        let info = json!({
            "symbols": [
                { "symbol": "BTCUSDT", "filters": [
                    { "filterType": "PRICE_FILTER", "tickSize": "0.10" },
                    { "filterType": "LOT_SIZE", "stepSize": "0.001", "minQty": "0.001" },
                    { "filterType": "MIN_NOTIONAL", "notional": "100" }
                ]},
                { "symbol": "NOFILTER" }
            ]
        });
        let mut table = PrecisionTable::new();
        table.load_from_exchange_info(&info);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get("BTCUSDT"),
            Some(SymbolRules { quantity_precision: 3, min_notional: Some(100.0) })
        );
        assert_eq!(table.get("NOFILTER").unwrap().quantity_precision, DEFAULT_PRECISION);
    }
}
