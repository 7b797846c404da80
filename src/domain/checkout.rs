//! Hosted checkout entities.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatewayType {
    Wallet,
    Card,
    Bank,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gateway {
    pub id: Uuid,
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub gateway_type: GatewayType,
    pub can_process: bool,
    pub can_settle: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fee {
    #[serde(rename = "type")]
    pub fee_type: String,
    pub amount: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub amount: BigDecimal,
    pub fees: Vec<Fee>,
}

impl Pricing {
    /// Applies a single service fee of `percent` percent, rounded to cents.
    pub fn with_service_fee(amount: BigDecimal, percent: &BigDecimal) -> Self {
        let fee = (&amount * percent / BigDecimal::from(100)).round(2);
        Self {
            amount,
            fees: vec![Fee {
                fee_type: "SERVICE".to_string(),
                amount: fee,
            }],
        }
    }

    pub fn total(&self) -> BigDecimal {
        self.fees
            .iter()
            .fold(self.amount.clone(), |acc, fee| acc + &fee.amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckoutStatusValue {
    Pending,
    Processing,
    Success,
    Declined,
    Canceled,
}

impl CheckoutStatusValue {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CheckoutStatusValue::Success
                | CheckoutStatusValue::Declined
                | CheckoutStatusValue::Canceled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutStatus {
    pub value: CheckoutStatusValue,
    pub message: String,
}

impl CheckoutStatus {
    pub fn new(value: CheckoutStatusValue, message: impl Into<String>) -> Self {
        Self {
            value,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutTransaction {
    pub id: Uuid,
    /// Payer reference supplied by the merchant.
    #[serde(rename = "for")]
    pub for_ref: String,
    /// Recipient's default stored account.
    pub to: Uuid,
    pub pricing: Pricing,
    /// Seconds the checkout may stay unconfirmed.
    pub ttl: i64,
    pub details: serde_json::Value,
    #[serde(rename = "gateway")]
    pub gateway: Gateway,
    pub status: CheckoutStatus,
    pub notify_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckoutTransaction {
    /// A deadline past the representable range never expires.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.ttl <= 0 {
            return false;
        }
        Duration::try_seconds(self.ttl)
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .map_or(false, |deadline| deadline < now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebhookStatus {
    Success,
    Failure,
}

/// Normalized shape forwarded to merchants for provider callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub reference_id: String,
    pub status: WebhookStatus,
    pub message: String,
    pub provider_tx_id: Option<String>,
    pub provider_data: serde_json::Value,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub payload_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_service_fee_is_two_point_seven_five_percent() {
        let percent = BigDecimal::from_str("2.75").unwrap();
        let pricing = Pricing::with_service_fee(BigDecimal::from(200), &percent);

        assert_eq!(pricing.fees.len(), 1);
        assert_eq!(pricing.fees[0].amount, BigDecimal::from_str("5.50").unwrap());
        assert_eq!(pricing.total(), BigDecimal::from_str("205.50").unwrap());
    }

    #[test]
    fn test_terminal_states() {
        assert!(CheckoutStatusValue::Success.is_terminal());
        assert!(CheckoutStatusValue::Declined.is_terminal());
        assert!(!CheckoutStatusValue::Processing.is_terminal());
        assert!(!CheckoutStatusValue::Pending.is_terminal());
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let now = Utc::now();
        let mut tx = CheckoutTransaction {
            id: Uuid::new_v4(),
            for_ref: "+251922334455".to_string(),
            to: Uuid::new_v4(),
            pricing: Pricing::with_service_fee(BigDecimal::from(10), &BigDecimal::from(0)),
            ttl: i64::MAX,
            details: serde_json::Value::Null,
            gateway: crate::config::gateways::GatewayCatalog::standard()
                .get("CBE")
                .unwrap(),
            status: CheckoutStatus::new(CheckoutStatusValue::Pending, "created"),
            notify_url: None,
            created_at: now - Duration::days(1),
            updated_at: now,
        };
        assert!(!tx.is_expired(now));

        tx.ttl = 60;
        assert!(tx.is_expired(now));
        tx.ttl = 0;
        assert!(!tx.is_expired(now));
    }

    #[test]
    fn test_webhook_payload_field_names() {
        let payload = WebhookPayload {
            reference_id: "abc".to_string(),
            status: WebhookStatus::Success,
            message: "paid".to_string(),
            provider_tx_id: Some("p-1".to_string()),
            provider_data: serde_json::json!({}),
            timestamp: "2024-01-01T00:00:00+00:00".to_string(),
            payload_type: "USSD".to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["referenceId"], "abc");
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["providerTxId"], "p-1");
        assert_eq!(json["type"], "USSD");
    }
}
