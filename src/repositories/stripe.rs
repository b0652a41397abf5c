use std::{collections::HashMap, time::Duration};

use anyhow::bail;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::models::payments::{PaymentIntent, StripeEvent, Transfer};

type HmacSha256 = Hmac<Sha256>;

/// External payment provider: card deposits and payouts.
#[async_trait]
pub trait PaymentProvider: Send + Sync + 'static {
    async fn create_payment_intent(
        &self,
        amount_in_cents: i64,
        metadata: HashMap<String, String>,
    ) -> Result<PaymentIntent, anyhow::Error>;

    async fn create_transfer(
        &self,
        amount_in_cents: i64,
        destination: &str,
        metadata: HashMap<String, String>,
    ) -> Result<Transfer, anyhow::Error>;
}

pub struct StripeApi {
    secret_key: String,
    url: String,
    currency: String,
    client: reqwest::Client,
}

impl StripeApi {
    pub fn new(
        secret_key: String,
        url: String,
        currency: String,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            secret_key,
            url,
            currency,
            client,
        })
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: Vec<(String, String)>,
    ) -> Result<T, anyhow::Error> {
        let response = self
            .client
            .post(format!("{}/v1/{}", self.url, path))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", Uuid::new_v4().hyphenated().to_string())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;

        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            bail!("Stripe: {} ({})", message, status);
        }

        Ok(serde_json::from_value(body)?)
    }

    fn base_form(
        &self,
        amount_in_cents: i64,
        metadata: HashMap<String, String>,
    ) -> Vec<(String, String)> {
        let mut form = vec![
            ("amount".to_string(), amount_in_cents.to_string()),
            ("currency".to_string(), self.currency.clone()),
        ];
        form.extend(
            metadata
                .into_iter()
                .map(|(key, value)| (format!("metadata[{}]", key), value)),
        );

        form
    }
}

#[async_trait]
impl PaymentProvider for StripeApi {
    async fn create_payment_intent(
        &self,
        amount_in_cents: i64,
        metadata: HashMap<String, String>,
    ) -> Result<PaymentIntent, anyhow::Error> {
        let form = self.base_form(amount_in_cents, metadata);

        self.post_form("payment_intents", form).await
    }

    async fn create_transfer(
        &self,
        amount_in_cents: i64,
        destination: &str,
        metadata: HashMap<String, String>,
    ) -> Result<Transfer, anyhow::Error> {
        let mut form = self.base_form(amount_in_cents, metadata);
        form.push(("destination".to_string(), destination.to_string()));

        self.post_form("transfers", form).await
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SignatureError {
    #[error("No signatures found matching the expected signature for payload")]
    Mismatch,
    #[error("Unable to extract timestamp and signatures from header")]
    MalformedHeader,
    #[error("Timestamp outside the tolerance zone")]
    Expired,
}

/// Checks `Stripe-Signature` headers against the endpoint secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: String, tolerance_secs: i64) -> Self {
        Self {
            secret,
            tolerance_secs,
        }
    }

    pub fn verify(&self, payload: &[u8], header: &str, now: i64) -> Result<(), SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => {
                    if let Ok(signature) = hex::decode(value) {
                        signatures.push(signature);
                    }
                }
                _ => (),
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(SignatureError::MalformedHeader);
        }

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| SignatureError::Mismatch)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);

        let matched = signatures
            .iter()
            .any(|signature| mac.clone().verify_slice(signature).is_ok());
        if !matched {
            return Err(SignatureError::Mismatch);
        }

        if self.tolerance_secs > 0 && (now - timestamp).abs() > self.tolerance_secs {
            return Err(SignatureError::Expired);
        }

        Ok(())
    }

    pub fn construct_event(
        &self,
        payload: &[u8],
        header: &str,
        now: i64,
    ) -> Result<StripeEvent, anyhow::Error> {
        self.verify(payload, header, now)?;

        Ok(serde_json::from_slice(payload)?)
    }
}
