use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{RequestHandler, Service, ServiceError};
use crate::{
    models::{
        self,
        payments::{
            CreditOutcome, NewPaymentIntent, PaymentCredit, PaymentIntent, PaymentIntentResponse,
            StripeEvent, WebhookAck, DEPOSIT_TYPE, PAYMENT_INTENT_FAILED,
            PAYMENT_INTENT_SUCCEEDED,
        },
    },
    repositories::{
        stripe::{PaymentProvider, WebhookVerifier},
        Store,
    },
};

pub const MIN_DEPOSIT_AMOUNT: i64 = 5;

pub enum PaymentRequest {
    CreateIntent {
        user_id: Uuid,
        intent: NewPaymentIntent,
        response: oneshot::Sender<Result<PaymentIntentResponse, ServiceError>>,
    },
    Webhook {
        payload: Vec<u8>,
        signature: Option<String>,
        response: oneshot::Sender<Result<WebhookAck, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct PaymentRequestHandler {
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
    verifier: WebhookVerifier,
}

impl PaymentRequestHandler {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn PaymentProvider>,
        verifier: WebhookVerifier,
    ) -> Self {
        PaymentRequestHandler {
            store,
            provider,
            verifier,
        }
    }

    async fn create_intent(
        &self,
        user_id: Uuid,
        intent: NewPaymentIntent,
    ) -> Result<PaymentIntentResponse, ServiceError> {
        let invalid_amount =
            || ServiceError::InvalidAmount(format!("Minimum deposit is ${}", MIN_DEPOSIT_AMOUNT));

        let amount = intent
            .amount
            .as_ref()
            .and_then(models::parse_amount)
            .filter(|amount| *amount >= Decimal::from(MIN_DEPOSIT_AMOUNT))
            .ok_or_else(invalid_amount)?;
        let amount_in_cents = models::to_cents(amount).ok_or_else(invalid_amount)?;

        let metadata = HashMap::from([
            ("userId".to_string(), user_id.to_string()),
            ("type".to_string(), DEPOSIT_TYPE.to_string()),
        ]);

        let payment_intent = self
            .provider
            .create_payment_intent(amount_in_cents, metadata)
            .await
            .map_err(|e| ServiceError::Payment(e.to_string()))?;
        self.store.touch_user(user_id).await?;

        log::info!(
            "Payment intent {} of {} created for {}.",
            payment_intent.id,
            amount,
            user_id
        );

        let client_secret = payment_intent.client_secret.ok_or_else(|| {
            ServiceError::Payment(format!(
                "Payment intent {} has no client secret",
                payment_intent.id
            ))
        })?;

        Ok(PaymentIntentResponse { client_secret })
    }

    async fn handle_webhook(
        &self,
        payload: Vec<u8>,
        signature: Option<String>,
    ) -> Result<WebhookAck, ServiceError> {
        let signature = signature.ok_or_else(|| {
            ServiceError::Webhook("No stripe-signature header value was provided".to_string())
        })?;

        let event = self
            .verifier
            .construct_event(&payload, &signature, chrono::Utc::now().timestamp())
            .map_err(|e| ServiceError::Webhook(e.to_string()))?;

        match event.event_type.as_str() {
            PAYMENT_INTENT_SUCCEEDED => self.payment_succeeded(&event).await?,
            PAYMENT_INTENT_FAILED => {
                log::warn!("Payment failed, event {}.", event.id);
            }
            other => {
                log::debug!("Ignoring event {} of type {}.", event.id, other);
            }
        }

        Ok(WebhookAck { received: true })
    }

    async fn payment_succeeded(&self, event: &StripeEvent) -> Result<(), ServiceError> {
        let intent: PaymentIntent = serde_json::from_value(event.data.object.clone())
            .map_err(|e| ServiceError::Webhook(e.to_string()))?;

        if intent.metadata.get("type").map(String::as_str) != Some(DEPOSIT_TYPE) {
            log::info!("Payment intent {} is not a deposit, skipping.", intent.id);
            return Ok(());
        }

        let user_id = intent
            .metadata
            .get("userId")
            .and_then(|id| id.parse::<Uuid>().ok())
            .ok_or_else(|| {
                ServiceError::Webhook(format!("Payment intent {} has no valid userId", intent.id))
            })?;

        let credit = PaymentCredit {
            payment_id: intent.id.clone(),
            event_id: event.id.clone(),
            user_id,
            amount: models::from_cents(intent.amount),
        };
        let amount = credit.amount;

        match self.store.credit_payment(credit).await {
            Ok(CreditOutcome::Credited(user)) => {
                log::info!(
                    "Deposit {} credited {} to {}, balance {}.",
                    intent.id,
                    amount,
                    user.id,
                    user.balance
                );
                Ok(())
            }
            Ok(CreditOutcome::Duplicate) => {
                log::warn!(
                    "Deposit {} was already credited, ignoring event {}.",
                    intent.id,
                    event.id
                );
                Ok(())
            }
            Err(e) => Err(ServiceError::Webhook(e.to_string())),
        }
    }
}

#[async_trait]
impl RequestHandler<PaymentRequest> for PaymentRequestHandler {
    async fn handle_request(&self, request: PaymentRequest) {
        match request {
            PaymentRequest::CreateIntent {
                user_id,
                intent,
                response,
            } => {
                let intent = self.create_intent(user_id, intent).await;
                let _ = response.send(intent);
            }
            PaymentRequest::Webhook {
                payload,
                signature,
                response,
            } => {
                let ack = self.handle_webhook(payload, signature).await;
                let _ = response.send(ack);
            }
        }
    }
}

pub struct PaymentService;

impl PaymentService {
    pub fn new() -> Self {
        PaymentService {}
    }
}

#[async_trait]
impl Service<PaymentRequest, PaymentRequestHandler> for PaymentService {}
