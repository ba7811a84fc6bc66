//! Order sizing: USD notional and close percentage to whole contract counts.
//!
//! One contract is one USD of notional here; adapters convert to their
//! native unit through [`Trader::quantity_for_contracts`](crate::Trader::quantity_for_contracts).

use pm_core::error::TradeError;

/// `floor(usd_notional)` contracts. Fails when the notional is not positive
/// or buys less than one contract.
pub fn calc_contracts(usd_notional: f64) -> Result<i64, TradeError> {
    if !usd_notional.is_finite() || usd_notional <= 0.0 {
        return Err(TradeError::InvalidSize(format!(
            "position size {usd_notional} USD must be positive"
        )));
    }
    let contracts = usd_notional.floor();
    if contracts < 1.0 {
        return Err(TradeError::InvalidSize(format!(
            "position size {usd_notional} USD is below one contract"
        )));
    }
    Ok(contracts as i64)
}

/// `floor(total * percent / 100)` clamped to `[1, total]`.
pub fn calc_partial_contracts(total_contracts: i64, percent: f64) -> Result<i64, TradeError> {
    if total_contracts <= 0 {
        return Err(TradeError::NoPosition {
            symbol: String::new(),
            side: "open".into(),
        });
    }
    if !(percent > 0.0 && percent <= 100.0) {
        return Err(TradeError::InvalidPercent(percent));
    }
    let raw = (total_contracts as f64 * percent / 100.0).floor() as i64;
    Ok(raw.clamp(1, total_contracts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contracts_floor() {
        assert_eq!(calc_contracts(1000.0), Ok(1000));
        assert_eq!(calc_contracts(1.999), Ok(1));
        assert_eq!(calc_contracts(45_000.7), Ok(45_000));
    }

    #[test]
    fn contracts_reject_non_positive_and_fractional() {
        for usd in [0.0, -5.0, 0.5, f64::NAN] {
            assert!(matches!(calc_contracts(usd), Err(TradeError::InvalidSize(_))), "{usd}");
        }
    }

    #[test]
    fn partial_stays_in_range() {
        for total in [1_i64, 3, 10, 997] {
            for pct in [0.1, 1.0, 33.3, 50.0, 99.9, 100.0] {
                let n = calc_partial_contracts(total, pct).unwrap();
                assert!((1..=total).contains(&n), "total={total} pct={pct} -> {n}");
            }
            assert_eq!(calc_partial_contracts(total, 100.0), Ok(total));
        }
        assert_eq!(calc_partial_contracts(10, 25.0), Ok(2));
    }

    #[test]
    fn partial_errors() {
        assert!(matches!(calc_partial_contracts(0, 50.0), Err(TradeError::NoPosition { .. })));
        assert_eq!(calc_partial_contracts(10, 0.0), Err(TradeError::InvalidPercent(0.0)));
        assert_eq!(calc_partial_contracts(10, 100.5), Err(TradeError::InvalidPercent(100.5)));
    }
}
