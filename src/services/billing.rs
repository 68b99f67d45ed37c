use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::billing::StripeCheckoutSession;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Webhook timestamps older than this are rejected to limit replay.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[async_trait]
pub trait BillingClient: Send + Sync {
    /// Opens a hosted checkout for a subscription to the given price.
    async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<StripeCheckoutSession, String>;

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), String>;
}

pub struct StripeClient {
    client: reqwest::Client,
    secret_key: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key,
        }
    }
}

#[async_trait]
impl BillingClient for StripeClient {
    async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<StripeCheckoutSession, String> {
        // Stripe takes form-encoded bodies, arrays as indexed brackets.
        let params = [
            ("customer", customer_id),
            ("mode", "subscription"),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1"),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
        ];

        let res = self
            .client
            .post(format!("{}/checkout/sessions", STRIPE_API_BASE))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&params)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        if !res.status().is_success() {
            return Err(format!("API error: {}", res.status()));
        }

        res.json::<StripeCheckoutSession>()
            .await
            .map_err(|e| format!("Failed to parse response: {}", e))
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), String> {
        let res = self
            .client
            .delete(format!("{}/subscriptions/{}", STRIPE_API_BASE, subscription_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        if !res.status().is_success() {
            return Err(format!("API error: {}", res.status()));
        }

        Ok(())
    }
}

/// Verifies a `Stripe-Signature` header against the raw request body.
///
/// The header carries `t=<unix>,v1=<hex>` pairs; the signed payload is
/// `{t}.{body}` under HMAC-SHA256 with the endpoint secret. Any one matching
/// v1 entry is accepted. Comparison is constant-time via the hmac crate.
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<(), String> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in sig_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = value.parse().ok();
            }
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| "missing timestamp in signature header".to_string())?;
    if timestamp < now_unix - SIGNATURE_TOLERANCE_SECS {
        return Err("signature timestamp outside tolerance".to_string());
    }
    if candidates.is_empty() {
        return Err("no v1 signature in header".to_string());
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid webhook secret".to_string())?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    for candidate in candidates {
        let Ok(decoded) = hex::decode(candidate) else {
            continue;
        };
        if mac.clone().verify_slice(&decoded).is_ok() {
            return Ok(());
        }
    }

    Err("no matching v1 signature".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_a_valid_signature() {
        let payload = br#"{"type":"customer.subscription.updated"}"#;
        let secret = "whsec_test";
        let now = 1_700_000_000;
        let header = format!("t={},v1={}", now, sign(payload, secret, now));

        assert!(verify_webhook_signature(payload, &header, secret, now).is_ok());
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let payload = br#"{"type":"customer.subscription.updated"}"#;
        let secret = "whsec_test";
        let now = 1_700_000_000;
        let header = format!("t={},v1={}", now, sign(payload, secret, now));

        let err =
            verify_webhook_signature(br#"{"type":"evil"}"#, &header, secret, now).unwrap_err();
        assert!(err.contains("no matching"));
    }

    #[test]
    fn rejects_a_stale_timestamp() {
        let payload = b"body";
        let secret = "whsec_test";
        let signed_at = 1_700_000_000;
        let header = format!("t={},v1={}", signed_at, sign(payload, secret, signed_at));

        let now = signed_at + SIGNATURE_TOLERANCE_SECS + 1;
        let err = verify_webhook_signature(payload, &header, secret, now).unwrap_err();
        assert!(err.contains("tolerance"));
    }

    #[test]
    fn accepts_any_matching_v1_among_several() {
        let payload = b"body";
        let secret = "whsec_test";
        let now = 1_700_000_000;
        let good = sign(payload, secret, now);
        let header = format!("t={},v0=legacy,v1={},v1={}", now, "00ff00ff", good);

        assert!(verify_webhook_signature(payload, &header, secret, now).is_ok());
    }

    #[test]
    fn rejects_garbage_headers() {
        assert!(verify_webhook_signature(b"body", "", "s", 0).is_err());
        assert!(verify_webhook_signature(b"body", "t=notanumber,v1=aa", "s", 0).is_err());
        assert!(verify_webhook_signature(b"body", "v1=aabb", "s", 0).is_err());
    }
}
