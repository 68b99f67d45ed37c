use serde::Deserialize;

// Minimal slices of Stripe's wire format. Only the fields we read are
// declared; serde skips the rest of the payload.

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    // Left as raw JSON because the object shape depends on event_type.
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: String, // active, past_due, canceled, ...
    pub current_period_end: Option<i64>, // unix seconds
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subscription_event() {
        let payload = serde_json::json!({
            "id": "evt_123",
            "type": "customer.subscription.updated",
            "data": {
                "object": {
                    "id": "sub_123",
                    "customer": "cus_456",
                    "status": "active",
                    "current_period_end": 1755820800,
                    "items": { "data": [] }
                }
            }
        });

        let event: StripeEvent = serde_json::from_value(payload).unwrap();
        assert_eq!(event.event_type, "customer.subscription.updated");

        let sub: StripeSubscription = serde_json::from_value(event.data.object).unwrap();
        assert_eq!(sub.id, "sub_123");
        assert_eq!(sub.customer, "cus_456");
        assert_eq!(sub.status, "active");
        assert_eq!(sub.current_period_end, Some(1755820800));
    }

    #[test]
    fn unknown_event_types_still_parse_the_envelope() {
        let payload = serde_json::json!({
            "type": "invoice.paid",
            "data": { "object": { "id": "in_789" } }
        });

        let event: StripeEvent = serde_json::from_value(payload).unwrap();
        assert_eq!(event.event_type, "invoice.paid");
    }
}
