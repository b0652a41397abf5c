use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{RequestHandler, Service, ServiceError};
use crate::{
    models::{
        self,
        payments::{NewTransfer, TransferResponse, WITHDRAWAL_TYPE},
        withdrawals::{
            AdjudicateWithdrawal, Adjudication, NewWithdrawal, Withdrawal, WithdrawalMethod,
        },
    },
    repositories::{stripe::PaymentProvider, Store, StoreError},
};

pub const MIN_WITHDRAWAL_AMOUNT: i64 = 10;

pub enum WithdrawalRequest {
    List {
        user_id: Uuid,
        response: oneshot::Sender<Result<Vec<Withdrawal>, ServiceError>>,
    },
    Request {
        user_id: Uuid,
        withdrawal: NewWithdrawal,
        response: oneshot::Sender<Result<Withdrawal, ServiceError>>,
    },
    Adjudicate {
        id: Uuid,
        decision: AdjudicateWithdrawal,
        response: oneshot::Sender<Result<Withdrawal, ServiceError>>,
    },
    Transfer {
        user_id: Uuid,
        transfer: NewTransfer,
        response: oneshot::Sender<Result<TransferResponse, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct WithdrawalRequestHandler {
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
}

/// A missing user reads as an empty balance to the requester.
fn debit_error(e: StoreError) -> ServiceError {
    match e {
        StoreError::UserNotFound(_) => ServiceError::InsufficientBalance,
        e => e.into(),
    }
}

impl WithdrawalRequestHandler {
    pub fn new(store: Arc<dyn Store>, provider: Arc<dyn PaymentProvider>) -> Self {
        WithdrawalRequestHandler { store, provider }
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<Withdrawal>, ServiceError> {
        self.store.touch_user(user_id).await?;

        Ok(self.store.list_withdrawals(user_id).await?)
    }

    async fn request(
        &self,
        user_id: Uuid,
        withdrawal: NewWithdrawal,
    ) -> Result<Withdrawal, ServiceError> {
        let amount = withdrawal
            .amount
            .as_ref()
            .and_then(models::parse_amount)
            .filter(|amount| *amount >= Decimal::from(MIN_WITHDRAWAL_AMOUNT))
            .ok_or_else(|| {
                ServiceError::InvalidAmount(format!(
                    "Minimum withdrawal is ${}",
                    MIN_WITHDRAWAL_AMOUNT
                ))
            })?;

        let method = withdrawal
            .method
            .as_deref()
            .and_then(|method| method.parse::<WithdrawalMethod>().ok())
            .ok_or(ServiceError::InvalidMethod)?;

        let withdrawal = self
            .store
            .request_withdrawal(user_id, amount, method)
            .await
            .map_err(debit_error)?;

        log::info!(
            "Withdrawal {} requested by {}: {} via {}.",
            withdrawal.id,
            user_id,
            amount,
            method
        );

        Ok(withdrawal)
    }

    async fn adjudicate(
        &self,
        id: Uuid,
        decision: AdjudicateWithdrawal,
    ) -> Result<Withdrawal, ServiceError> {
        let decision = match decision.status.as_deref() {
            Some("completed") => Adjudication::Complete,
            Some("rejected") => Adjudication::Reject {
                reason: decision.reason,
            },
            _ => return Err(ServiceError::InvalidStatus),
        };

        let withdrawal = self.store.adjudicate_withdrawal(id, decision).await?;

        log::info!(
            "Withdrawal {} of {} for {} is now {}.",
            withdrawal.id,
            withdrawal.amount,
            withdrawal.user_id,
            withdrawal.status.as_str()
        );

        Ok(withdrawal)
    }

    /// Pays out through the provider. The amount is reserved as a pending
    /// bank withdrawal first and settled according to the provider's answer.
    async fn transfer(
        &self,
        user_id: Uuid,
        transfer: NewTransfer,
    ) -> Result<TransferResponse, ServiceError> {
        let amount = transfer
            .amount
            .as_ref()
            .and_then(models::parse_amount)
            .filter(|amount| *amount > Decimal::ZERO)
            .ok_or_else(|| ServiceError::InvalidAmount("Invalid amount".to_string()))?;
        let amount_in_cents = models::to_cents(amount)
            .ok_or_else(|| ServiceError::InvalidAmount("Invalid amount".to_string()))?;

        let destination = transfer
            .account_id
            .filter(|account| !account.trim().is_empty())
            .ok_or_else(|| ServiceError::InvalidRequest("accountId is required".to_string()))?;

        let reserved = self
            .store
            .reserve_transfer(user_id, amount)
            .await
            .map_err(debit_error)?;

        let metadata = HashMap::from([
            ("userId".to_string(), user_id.to_string()),
            ("type".to_string(), WITHDRAWAL_TYPE.to_string()),
            ("withdrawalId".to_string(), reserved.id.to_string()),
        ]);

        match self
            .provider
            .create_transfer(amount_in_cents, &destination, metadata)
            .await
        {
            Ok(transfer) => {
                log::info!(
                    "Transfer {} of {} sent to {} for {}.",
                    transfer.id,
                    amount,
                    destination,
                    user_id
                );

                let withdrawal = match self
                    .store
                    .settle_transfer(reserved.id, Adjudication::Complete)
                    .await
                {
                    Ok(withdrawal) => withdrawal,
                    Err(e) => {
                        log::error!(
                            "Transfer {} succeeded but withdrawal {} stays pending: {}",
                            transfer.id,
                            reserved.id,
                            e
                        );
                        reserved
                    }
                };

                Ok(TransferResponse {
                    transfer,
                    withdrawal,
                })
            }
            Err(e) => {
                log::error!("Transfer for withdrawal {} failed: {}", reserved.id, e);

                let refund = Adjudication::Reject {
                    reason: Some(format!("transfer failed: {}", e)),
                };
                if let Err(refund_error) = self.store.settle_transfer(reserved.id, refund).await {
                    log::error!(
                        "Could not release withdrawal {} after failed transfer: {}",
                        reserved.id,
                        refund_error
                    );
                }

                Err(ServiceError::Transfer(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl RequestHandler<WithdrawalRequest> for WithdrawalRequestHandler {
    async fn handle_request(&self, request: WithdrawalRequest) {
        match request {
            WithdrawalRequest::List { user_id, response } => {
                let withdrawals = self.list(user_id).await;
                let _ = response.send(withdrawals);
            }
            WithdrawalRequest::Request {
                user_id,
                withdrawal,
                response,
            } => {
                let withdrawal = self.request(user_id, withdrawal).await;
                let _ = response.send(withdrawal);
            }
            WithdrawalRequest::Adjudicate {
                id,
                decision,
                response,
            } => {
                let withdrawal = self.adjudicate(id, decision).await;
                let _ = response.send(withdrawal);
            }
            WithdrawalRequest::Transfer {
                user_id,
                transfer,
                response,
            } => {
                let transfer = self.transfer(user_id, transfer).await;
                let _ = response.send(transfer);
            }
        }
    }
}

pub struct WithdrawalService;

impl WithdrawalService {
    pub fn new() -> Self {
        WithdrawalService {}
    }
}

#[async_trait]
impl Service<WithdrawalRequest, WithdrawalRequestHandler> for WithdrawalService {}
