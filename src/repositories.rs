use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    admin::Stats,
    payments::{CreditOutcome, PaymentCredit},
    users::{NewUser, User, UserStatus},
    withdrawals::{Adjudication, Withdrawal, WithdrawalMethod},
};

pub mod memory;
pub mod postgres;
pub mod stripe;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("User not found: {0}")]
    UserNotFound(Uuid),
    #[error("Withdrawal not found: {0}")]
    WithdrawalNotFound(Uuid),
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Withdrawal already processed")]
    AlreadyProcessed,
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence for users, withdrawals and processed payments.
///
/// Every method that moves money is a single atomic unit: the balance change
/// and the record it belongs to are applied together or not at all, and a
/// debit only succeeds while the balance covers it.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Refreshes `last_active` for the user. Unknown ids are ignored.
    async fn touch_user(&self, id: Uuid) -> Result<(), StoreError>;

    /// Users ordered by creation time, newest first.
    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError>;

    async fn count_users(&self) -> Result<i64, StoreError>;

    async fn set_user_status(
        &self,
        id: Uuid,
        status: UserStatus,
    ) -> Result<Option<User>, StoreError>;

    /// Debits `amount` and creates a pending withdrawal for it.
    async fn request_withdrawal(
        &self,
        user_id: Uuid,
        amount: Decimal,
        method: WithdrawalMethod,
    ) -> Result<Withdrawal, StoreError>;

    /// Debits `amount` and holds it as a pending bank withdrawal owned by the
    /// provider payout flow.
    async fn reserve_transfer(
        &self,
        user_id: Uuid,
        amount: Decimal,
    ) -> Result<Withdrawal, StoreError>;

    /// Withdrawals of a user, newest first.
    async fn list_withdrawals(&self, user_id: Uuid) -> Result<Vec<Withdrawal>, StoreError>;

    /// Moves a pending withdrawal to its terminal status, refunding the owner
    /// on rejection. Payout reservations are refused as already processed.
    async fn adjudicate_withdrawal(
        &self,
        id: Uuid,
        decision: Adjudication,
    ) -> Result<Withdrawal, StoreError>;

    /// Settles a payout reservation made by `reserve_transfer`.
    async fn settle_transfer(
        &self,
        id: Uuid,
        decision: Adjudication,
    ) -> Result<Withdrawal, StoreError>;

    /// Credits a confirmed payment once per `payment_id`.
    async fn credit_payment(&self, credit: PaymentCredit) -> Result<CreditOutcome, StoreError>;

    async fn stats(&self, active_since: DateTime<Utc>) -> Result<Stats, StoreError>;
}
