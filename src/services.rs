use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    repositories::{
        stripe::{PaymentProvider, WebhookVerifier},
        Store, StoreError,
    },
    settings::Settings,
};

pub mod admin;
pub mod http;
pub mod payments;
pub mod users;
pub mod withdrawals;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidAmount(String),
    #[error("Invalid withdrawal method")]
    InvalidMethod,
    #[error("Invalid status")]
    InvalidStatus,
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Withdrawal already processed")]
    AlreadyProcessed,
    #[error("User not found")]
    UserNotFound,
    #[error("Withdrawal not found")]
    WithdrawalNotFound,
    #[error("Payment provider error: {0}")]
    Payment(String),
    #[error("Transfer failed: {0}")]
    Transfer(String),
    #[error("Webhook Error: {0}")]
    Webhook(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UserNotFound(_) => ServiceError::UserNotFound,
            StoreError::WithdrawalNotFound(_) => ServiceError::WithdrawalNotFound,
            StoreError::InsufficientBalance => ServiceError::InsufficientBalance,
            StoreError::AlreadyProcessed => ServiceError::AlreadyProcessed,
            StoreError::Corrupt(e) => ServiceError::Internal(e),
            StoreError::Database(e) => ServiceError::Database(e.to_string()),
        }
    }
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Request channels of the running services.
#[derive(Clone)]
pub struct ServiceChannels {
    pub users: mpsc::Sender<users::UserRequest>,
    pub withdrawals: mpsc::Sender<withdrawals::WithdrawalRequest>,
    pub payments: mpsc::Sender<payments::PaymentRequest>,
    pub admin: mpsc::Sender<admin::AdminRequest>,
}

pub fn spawn_services(
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
    verifier: WebhookVerifier,
) -> ServiceChannels {
    let (user_tx, mut user_rx) = mpsc::channel(512);
    let (withdrawal_tx, mut withdrawal_rx) = mpsc::channel(512);
    let (payment_tx, mut payment_rx) = mpsc::channel(512);
    let (admin_tx, mut admin_rx) = mpsc::channel(512);

    let mut user_service = users::UserService::new();
    let mut withdrawal_service = withdrawals::WithdrawalService::new();
    let mut payment_service = payments::PaymentService::new();
    let mut admin_service = admin::AdminService::new();

    log::info!("Starting user service.");
    let user_store = store.clone();
    tokio::spawn(async move {
        user_service
            .run(users::UserRequestHandler::new(user_store), &mut user_rx)
            .await;
    });

    log::info!("Starting withdrawal service.");
    let withdrawal_store = store.clone();
    let withdrawal_provider = provider.clone();
    tokio::spawn(async move {
        withdrawal_service
            .run(
                withdrawals::WithdrawalRequestHandler::new(withdrawal_store, withdrawal_provider),
                &mut withdrawal_rx,
            )
            .await;
    });

    log::info!("Starting payment service.");
    let payment_store = store.clone();
    tokio::spawn(async move {
        payment_service
            .run(
                payments::PaymentRequestHandler::new(payment_store, provider, verifier),
                &mut payment_rx,
            )
            .await;
    });

    log::info!("Starting admin service.");
    tokio::spawn(async move {
        admin_service
            .run(admin::AdminRequestHandler::new(store), &mut admin_rx)
            .await;
    });

    ServiceChannels {
        users: user_tx,
        withdrawals: withdrawal_tx,
        payments: payment_tx,
        admin: admin_tx,
    }
}

pub async fn start_services(
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
    settings: Settings,
) -> Result<(), anyhow::Error> {
    let verifier = WebhookVerifier::new(
        settings.stripe.webhook_secret.clone(),
        settings.stripe.webhook_tolerance_secs,
    );
    let channels = spawn_services(store, provider, verifier);

    log::info!("Starting HTTP server.");
    http::start_http_server(channels, settings.server, settings.auth).await
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, Ordering},
            Mutex,
        },
    };

    use anyhow::bail;
    use async_trait::async_trait;

    use crate::{
        models::payments::{PaymentIntent, Transfer},
        repositories::stripe::PaymentProvider,
    };

    /// Records provider calls and answers them locally.
    #[derive(Default)]
    pub struct FakeProvider {
        pub fail: AtomicBool,
        pub intents: Mutex<Vec<(i64, HashMap<String, String>)>>,
        pub transfers: Mutex<Vec<(i64, String)>>,
    }

    impl FakeProvider {
        pub fn failing() -> Self {
            let provider = Self::default();
            provider.fail.store(true, Ordering::SeqCst);
            provider
        }
    }

    #[async_trait]
    impl PaymentProvider for FakeProvider {
        async fn create_payment_intent(
            &self,
            amount_in_cents: i64,
            metadata: HashMap<String, String>,
        ) -> Result<PaymentIntent, anyhow::Error> {
            if self.fail.load(Ordering::SeqCst) {
                bail!("Stripe: card network unavailable");
            }

            let mut intents = self.intents.lock().unwrap();
            intents.push((amount_in_cents, metadata.clone()));
            let id = format!("pi_{}", intents.len());

            Ok(PaymentIntent {
                client_secret: Some(format!("{}_secret", id)),
                id,
                amount: amount_in_cents,
                metadata,
            })
        }

        async fn create_transfer(
            &self,
            amount_in_cents: i64,
            destination: &str,
            metadata: HashMap<String, String>,
        ) -> Result<Transfer, anyhow::Error> {
            if self.fail.load(Ordering::SeqCst) {
                bail!("Stripe: destination account is not payable");
            }

            let mut transfers = self.transfers.lock().unwrap();
            transfers.push((amount_in_cents, destination.to_string()));

            Ok(Transfer {
                id: format!("tr_{}", transfers.len()),
                amount: amount_in_cents,
                currency: "usd".to_string(),
                destination: destination.to_string(),
                metadata,
            })
        }
    }
}
