//! Webhook authenticity check for stock-change notifications.
//!
//! Two modes are supported:
//!
//! - `shared_secret`: the caller sends the configured secret verbatim.
//! - `hmac_sha256`: the caller sends the hex HMAC-SHA256 of the
//!   notification's canonical string, keyed with the secret.
//!
//! An unset or empty secret rejects every notification.

use std::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::adjustment::StockChangeNotification;
use crate::error::CoreError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAuthMode {
    #[default]
    SharedSecret,
    HmacSha256,
}

impl WebhookAuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookAuthMode::SharedSecret => "shared_secret",
            WebhookAuthMode::HmacSha256 => "hmac_sha256",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared_secret" => Ok(WebhookAuthMode::SharedSecret),
            "hmac_sha256" => Ok(WebhookAuthMode::HmacSha256),
            other => Err(CoreError::Validation(format!(
                "Unknown webhook auth mode '{other}'. Must be shared_secret or hmac_sha256"
            ))),
        }
    }
}

impl fmt::Display for WebhookAuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The string signed in `hmac_sha256` mode.
pub fn canonical_string(notification: &StockChangeNotification) -> String {
    format!(
        "{}:{}:{}",
        notification.external_order_id, notification.product_id, notification.quantity_delta
    )
}

/// Compute the hex HMAC-SHA256 signature a source must send.
pub fn sign(secret: &str, notification: &StockChangeNotification) -> Result<String, CoreError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CoreError::Internal(format!("HMAC key rejected: {e}")))?;
    mac.update(canonical_string(notification).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify the notification's authenticity token.
///
/// Runs before any validation or storage access so a rejected request has
/// no side effects.
pub fn verify(
    mode: WebhookAuthMode,
    secret: Option<&str>,
    notification: &StockChangeNotification,
) -> Result<(), CoreError> {
    let secret = secret.filter(|s| !s.is_empty()).ok_or_else(|| {
        CoreError::Unauthorized("Webhook secret is not configured".to_string())
    })?;
    let token = notification
        .authenticity_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CoreError::Unauthorized("Missing webhook signature".to_string()))?;

    let valid = match mode {
        WebhookAuthMode::SharedSecret => bool::from(token.as_bytes().ct_eq(secret.as_bytes())),
        WebhookAuthMode::HmacSha256 => {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .map_err(|e| CoreError::Internal(format!("HMAC key rejected: {e}")))?;
            mac.update(canonical_string(notification).as_bytes());
            match hex::decode(token) {
                Ok(bytes) => mac.verify_slice(&bytes).is_ok(),
                Err(_) => false,
            }
        }
    };

    if valid {
        Ok(())
    } else {
        Err(CoreError::Unauthorized("Invalid webhook signature".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn notification(token: Option<&str>) -> StockChangeNotification {
        StockChangeNotification {
            external_order_id: "ORD-1".into(),
            product_id: 42,
            sku: None,
            quantity_delta: -3,
            timestamp: None,
            event: None,
            authenticity_token: token.map(str::to_string),
        }
    }

    #[test]
    fn shared_secret_accepts_exact_match() {
        let n = notification(Some("s3cret"));
        assert!(verify(WebhookAuthMode::SharedSecret, Some("s3cret"), &n).is_ok());
    }

    #[test]
    fn shared_secret_rejects_mismatch() {
        let n = notification(Some("s3cres"));
        assert_matches!(
            verify(WebhookAuthMode::SharedSecret, Some("s3cret"), &n),
            Err(CoreError::Unauthorized(_))
        );
    }

    #[test]
    fn missing_token_or_secret_is_unauthorized() {
        assert_matches!(
            verify(WebhookAuthMode::SharedSecret, Some("s3cret"), &notification(None)),
            Err(CoreError::Unauthorized(_))
        );
        assert_matches!(
            verify(WebhookAuthMode::SharedSecret, Some(""), &notification(Some(""))),
            Err(CoreError::Unauthorized(_))
        );
        assert_matches!(
            verify(WebhookAuthMode::SharedSecret, None, &notification(Some("x"))),
            Err(CoreError::Unauthorized(_))
        );
    }

    #[test]
    fn hmac_mode_verifies_signature() {
        let mut n = notification(None);
        let sig = sign("key", &n).unwrap();
        assert_eq!(sig.len(), 64);
        n.authenticity_token = Some(sig);
        assert!(verify(WebhookAuthMode::HmacSha256, Some("key"), &n).is_ok());
    }

    #[test]
    fn hmac_mode_rejects_tampered_delta() {
        let mut n = notification(None);
        n.authenticity_token = Some(sign("key", &n).unwrap());
        n.quantity_delta = 300;
        assert_matches!(
            verify(WebhookAuthMode::HmacSha256, Some("key"), &n),
            Err(CoreError::Unauthorized(_))
        );
    }

    #[test]
    fn hmac_mode_rejects_non_hex_token() {
        let n = notification(Some("not-hex!"));
        assert!(verify(WebhookAuthMode::HmacSha256, Some("key"), &n).is_err());
    }

    #[test]
    fn shared_secret_rejects_prefix_and_extension() {
        for token in ["s3c", "s3cret!"] {
            assert_matches!(
                verify(WebhookAuthMode::SharedSecret, Some("s3cret"), &notification(Some(token))),
                Err(CoreError::Unauthorized(_))
            );
        }
    }

    #[test]
    fn hmac_mode_rejects_odd_length_and_truncated_tokens() {
        let mut n = notification(None);
        let sig = sign("key", &n).unwrap();
        n.authenticity_token = Some(sig[..63].to_string());
        assert!(verify(WebhookAuthMode::HmacSha256, Some("key"), &n).is_err());
        n.authenticity_token = Some(sig[..62].to_string());
        assert!(verify(WebhookAuthMode::HmacSha256, Some("key"), &n).is_err());
        n.authenticity_token = Some(sig.to_uppercase());
        assert!(verify(WebhookAuthMode::HmacSha256, Some("key"), &n).is_ok());
    }

    #[test]
    fn auth_mode_parse() {
        assert_eq!(
            WebhookAuthMode::parse("HMAC_SHA256").unwrap(),
            WebhookAuthMode::HmacSha256
        );
        assert!(WebhookAuthMode::parse("basic").is_err());
    }
}
