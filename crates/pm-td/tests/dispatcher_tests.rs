mod common;

use pm_core::error::TradeError;
use pm_core::{FuturesAction, OrderIntent};
use pm_td::dispatcher::place_futures_order;
use tokio_test::{assert_err, assert_ok};

use common::{MockTrader, position};

fn intent(action: FuturesAction) -> OrderIntent {
    OrderIntent {
        symbol: "BTCUSDT".into(),
        action,
        position_size_usd: 0.0,
        close_percentage: 0.0,
        leverage: 1,
        stop_loss: 0.0,
        take_profit: 0.0,
    }
}

#[tokio::test]
async fn open_sets_leverage_before_order_then_protection() {
    let trader = MockTrader::new();
    let mut req = intent(FuturesAction::OpenLong);
    req.position_size_usd = 1000.0;
    req.leverage = 50;
    req.stop_loss = 44_000.0;
    req.take_profit = 47_000.0;

    let result = assert_ok!(place_futures_order(&trader, &req, 0).await);
    assert_eq!(result.quantity, 1000.0);

    let calls = trader.calls();
    assert_eq!(
        calls,
        vec![
            "set_leverage:BTCUSDT:50",
            "open_long:BTCUSDT:1000:50",
            "set_stop_loss:BTCUSDT:LONG:1000:44000",
            "set_take_profit:BTCUSDT:LONG:1000:47000",
        ]
    );
}

#[tokio::test]
async fn open_converts_contracts_to_native_quantity() {
    let trader = MockTrader {
        units_per_contract: Some(0.5),
        ..MockTrader::new()
    };
    let mut req = intent(FuturesAction::OpenShort);
    req.position_size_usd = 20.9;
    req.leverage = 5;

    let result = assert_ok!(place_futures_order(&trader, &req, 0).await);
    assert_eq!(result.quantity, 10.0);
    assert!(trader.calls().contains(&"open_short:BTCUSDT:10:5".to_string()));
}

#[tokio::test]
async fn invalid_size_places_nothing() {
    let trader = MockTrader::new();
    let mut req = intent(FuturesAction::OpenLong);
    req.position_size_usd = 0.5;

    let err = assert_err!(place_futures_order(&trader, &req, 0).await);
    assert!(matches!(err.downcast_ref::<TradeError>(), Some(TradeError::InvalidSize(_))));
    assert!(trader.calls().is_empty());
}

#[tokio::test]
async fn close_with_no_caller_position_closes_everything() {
    let trader = MockTrader::new().with_position(position("BTCUSDT", 3.0, 100.0, 10.0, 0.0));
    let result = assert_ok!(place_futures_order(&trader, &intent(FuturesAction::CloseLong), 0).await);
    assert_eq!(result.quantity, 3.0);
    assert_eq!(trader.calls(), vec!["close_long:BTCUSDT:0"]);
}

#[tokio::test]
async fn close_without_position_is_no_position() {
    let trader = MockTrader::new();
    let err = assert_err!(place_futures_order(&trader, &intent(FuturesAction::CloseShort), 0).await);
    assert!(matches!(err.downcast_ref::<TradeError>(), Some(TradeError::NoPosition { .. })));
}

#[tokio::test]
async fn partial_close_follows_position_sign() {
    let trader = MockTrader::new().with_position(position("BTCUSDT", -10.0, 100.0, 10.0, 0.0));
    let mut req = intent(FuturesAction::PartialClose);
    req.close_percentage = 50.0;

    let result = assert_ok!(place_futures_order(&trader, &req, -10).await);
    assert_eq!(result.quantity, 5.0);
    assert_eq!(trader.calls(), vec!["close_short:BTCUSDT:5"]);
}

#[tokio::test]
async fn partial_close_clamps_to_one_contract() {
    let trader = MockTrader::new().with_position(position("BTCUSDT", 3.0, 100.0, 10.0, 0.0));
    let mut req = intent(FuturesAction::PartialClose);
    req.close_percentage = 10.0;

    assert_ok!(place_futures_order(&trader, &req, 3).await);
    assert_eq!(trader.calls(), vec!["close_long:BTCUSDT:1"]);
}

#[tokio::test]
async fn partial_close_rejects_bad_input() {
    let trader = MockTrader::new();
    let mut req = intent(FuturesAction::PartialClose);
    req.close_percentage = 50.0;
    let err = assert_err!(place_futures_order(&trader, &req, 0).await);
    match err.downcast_ref::<TradeError>() {
        Some(TradeError::NoPosition { symbol, .. }) => assert_eq!(symbol, "BTCUSDT"),
        other => panic!("unexpected error: {other:?}"),
    }

    req.close_percentage = 150.0;
    let err = assert_err!(place_futures_order(&trader, &req, 4).await);
    assert_eq!(err.downcast_ref::<TradeError>(), Some(&TradeError::InvalidPercent(150.0)));
    assert!(trader.calls().is_empty());
}

#[tokio::test]
async fn full_close_registers_no_protection() {
    let trader = MockTrader::new().with_position(position("BTCUSDT", 4.0, 100.0, 10.0, 0.0));
    let mut req = intent(FuturesAction::CloseLong);
    req.stop_loss = 90.0;
    req.take_profit = 120.0;

    assert_ok!(place_futures_order(&trader, &req, 4).await);
    assert_eq!(trader.calls(), vec!["close_long:BTCUSDT:4"]);
}

#[tokio::test]
async fn partial_close_protects_only_what_remains() {
    let trader = MockTrader::new().with_position(position("BTCUSDT", -10.0, 100.0, 10.0, 0.0));
    let mut req = intent(FuturesAction::PartialClose);
    req.close_percentage = 50.0;
    req.stop_loss = 120.0;

    assert_ok!(place_futures_order(&trader, &req, -10).await);
    assert_eq!(
        trader.calls(),
        vec!["close_short:BTCUSDT:5", "set_stop_loss:BTCUSDT:SHORT:5:120"]
    );

    let trader = MockTrader::new().with_position(position("BTCUSDT", -10.0, 100.0, 10.0, 0.0));
    req.close_percentage = 100.0;
    assert_ok!(place_futures_order(&trader, &req, -10).await);
    assert_eq!(trader.calls(), vec!["close_short:BTCUSDT:10"]);
}

#[tokio::test]
async fn failed_stop_loss_keeps_the_order() {
    let trader = MockTrader {
        stop_loss_error: true,
        ..MockTrader::new()
    };
    let mut req = intent(FuturesAction::OpenShort);
    req.position_size_usd = 100.0;
    req.stop_loss = 120.0;
    req.take_profit = 80.0;

    let result = assert_ok!(place_futures_order(&trader, &req, 0).await);
    assert_eq!(result.quantity, 100.0);
    assert_eq!(trader.count("set_take_profit:BTCUSDT:SHORT"), 1);
}

#[tokio::test]
async fn leverage_errors_only_surface_for_permission() {
    let benign = MockTrader::new();
    *benign.leverage_error.lock().unwrap() = Some(
        TradeError::Rejected {
            status: 400,
            code: "-4028".into(),
            message: "LEVERAGE_NOT_CHANGED".into(),
        }
        .into(),
    );
    let mut req = intent(FuturesAction::OpenLong);
    req.position_size_usd = 10.0;
    assert_ok!(place_futures_order(&benign, &req, 0).await);
    assert_eq!(benign.count("open_long"), 1);

    let denied = MockTrader::new();
    *denied.leverage_error.lock().unwrap() = Some(
        TradeError::Rejected {
            status: 401,
            code: "-2015".into(),
            message: "Invalid API-key, IP, or permissions for action.".into(),
        }
        .into(),
    );
    let err = assert_err!(place_futures_order(&denied, &req, 0).await);
    assert!(matches!(err.downcast_ref::<TradeError>(), Some(TradeError::PermissionDenied(_))));
    assert_eq!(denied.count("open_long"), 0);
}

#[test]
fn unknown_action_is_rejected_at_parse_time() {
    let err = serde_json::from_str::<OrderIntent>(r#"{"symbol":"BTCUSDT","action":"hedge_everything"}"#);
    assert!(err.is_err());
    assert_eq!(
        "hedge_everything".parse::<FuturesAction>(),
        Err(TradeError::UnsupportedAction("hedge_everything".into()))
    );
}
