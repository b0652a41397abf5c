use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{users::User, withdrawals::Withdrawal};

pub const DEPOSIT_TYPE: &str = "deposit";
pub const WITHDRAWAL_TYPE: &str = "withdrawal";

pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const PAYMENT_INTENT_FAILED: &str = "payment_intent.payment_failed";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub client_secret: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Transfer {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub destination: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// A confirmed deposit, ready to be credited exactly once.
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentCredit {
    pub payment_id: String,
    pub event_id: String,
    pub user_id: Uuid,
    pub amount: Decimal,
}

#[derive(Clone, Debug)]
pub enum CreditOutcome {
    Credited(User),
    Duplicate,
}

#[derive(Debug, Deserialize)]
pub struct NewPaymentIntent {
    pub amount: Option<serde_json::Number>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransfer {
    pub amount: Option<serde_json::Number>,
    pub account_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub client_secret: String,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub transfer: Transfer,
    pub withdrawal: Withdrawal,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}
