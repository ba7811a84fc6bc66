//! Classification of provider-side configuration errors.
//!
//! Leverage, margin-mode and position-mode calls return errors for states
//! that are already what we asked for, or that cannot change while a
//! position is open. Those are absorbed. A key with the wrong access tier
//! is the one case callers must see.

use pm_core::error::TradeError;
use tracing::{debug, warn};

/// How a configuration-call error should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quirk {
    /// Already in the requested state, or not changeable right now. Log and continue.
    Benign,
    /// Wrong API access tier. Surface as [`TradeError::PermissionDenied`].
    Permission,
    /// Anything else.
    Other,
}

/// Binance codes / messages that mean "nothing to do".
const BENIGN_MARKERS: &[&str] = &[
    "No need to change",
    "-4046", // margin type
    "-4059", // position side
    "Margin type cannot be changed if there exists position",
    "-4048",
    "Multi-Assets mode",
    "-4168",
    "LEVERAGE_NOT_CHANGED",
    "POSITION_HOLDING",
];

const PERMISSION_MARKERS: &[&str] = &[
    "unified",
    "portfolio",
    "Portfolio",
    "-2015",
    "FORBIDDEN",
    "READ_ONLY",
    "INVALID_KEY",
];

/// Classify a message (or `code: message` pair) against the known markers.
pub fn classify_message(text: &str) -> Quirk {
    if PERMISSION_MARKERS.iter().any(|m| text.contains(m)) {
        Quirk::Permission
    } else if BENIGN_MARKERS.iter().any(|m| text.contains(m)) {
        Quirk::Benign
    } else {
        Quirk::Other
    }
}

/// Classify an error, looking at the structured rejection when there is one.
pub fn classify(err: &anyhow::Error) -> Quirk {
    if let Some(te) = err.downcast_ref::<TradeError>() {
        match te {
            TradeError::PermissionDenied(_) => return Quirk::Permission,
            TradeError::Rejected { code, message, .. } => {
                return classify_message(&format!("{code}: {message}"));
            }
            _ => {}
        }
    }
    classify_message(&format!("{err:#}"))
}

/// Absorb a configuration-call error unless it is a permission problem.
///
/// Benign answers are logged at debug, unknown ones at warn; both return
/// `Ok`. Permission errors come back as [`TradeError::PermissionDenied`].
pub fn tolerate(result: anyhow::Result<()>, what: &str) -> anyhow::Result<()> {
    let Err(err) = result else {
        return Ok(());
    };
    match classify(&err) {
        Quirk::Benign => {
            debug!("[quirks] {what}: already in requested state ({err:#})");
            Ok(())
        }
        Quirk::Permission => Err(TradeError::PermissionDenied(format!("{what}: {err:#}")).into()),
        Quirk::Other => {
            warn!("[quirks] {what} failed, continuing: {err:#}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(code: &str, message: &str) -> anyhow::Error {
        TradeError::Rejected {
            status: 400,
            code: code.into(),
            message: message.into(),
        }
        .into()
    }

    #[test]
    fn benign_provider_answers() {
        assert_eq!(classify(&rejected("-4046", "No need to change margin type.")), Quirk::Benign);
        assert_eq!(
            classify(&rejected("-4168", "Unable to adjust to isolated-margin mode under the Multi-Assets mode.")),
            Quirk::Benign
        );
        assert_eq!(
            classify(&rejected("-4048", "Margin type cannot be changed if there exists position.")),
            Quirk::Benign
        );
    }

    #[test]
    fn permission_tier() {
        assert_eq!(
            classify(&rejected("-2015", "Invalid API-key, IP, or permissions for action.")),
            Quirk::Permission
        );
        assert_eq!(classify_message("this endpoint is not available for portfolio margin"), Quirk::Permission);
        assert_eq!(classify(&TradeError::PermissionDenied("x".into()).into()), Quirk::Permission);
    }

    #[test]
    fn tolerate_only_surfaces_permission() {
        assert!(tolerate(Ok(()), "noop").is_ok());
        assert!(tolerate(Err(rejected("-4046", "No need to change margin type.")), "margin").is_ok());
        assert!(tolerate(Err(anyhow::anyhow!("timeout")), "leverage").is_ok());

        let err = tolerate(Err(rejected("-2015", "Invalid API-key")), "margin").unwrap_err();
        assert!(matches!(err.downcast_ref::<TradeError>(), Some(TradeError::PermissionDenied(_))));
    }

    #[test]
    fn other_errors() {
        assert_eq!(classify(&rejected("-1121", "Invalid symbol.")), Quirk::Other);
        assert_eq!(classify(&anyhow::anyhow!("connection reset")), Quirk::Other);
    }
}
