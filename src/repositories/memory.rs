use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{
    admin::Stats,
    payments::{CreditOutcome, PaymentCredit},
    users::{NewUser, User, UserStatus},
    withdrawals::{Adjudication, Withdrawal, WithdrawalMethod, WithdrawalStatus},
};

/// In-process store used for local runs and tests.
///
/// Balance changes happen while holding the user's entry lock. Locks are
/// always taken in the order payments -> withdrawals -> users and a users
/// guard is never held while acquiring another lock.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, User>,
    withdrawals: DashMap<Uuid, Withdrawal>,
    payments: DashMap<String, PaymentCredit>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn credit(&self, user_id: Uuid, amount: Decimal) -> Result<User, StoreError> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::UserNotFound(user_id))?;
        user.balance += amount;

        Ok(user.clone())
    }

    fn debit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        method: WithdrawalMethod,
        provider_transfer: bool,
    ) -> Result<Withdrawal, StoreError> {
        {
            let mut user = self
                .users
                .get_mut(&user_id)
                .ok_or(StoreError::UserNotFound(user_id))?;

            if user.balance < amount {
                return Err(StoreError::InsufficientBalance);
            }
            user.balance -= amount;
            user.last_active = Some(Utc::now());
        }

        let now = Utc::now();
        let withdrawal = Withdrawal {
            id: Uuid::new_v4(),
            user_id,
            amount,
            method,
            status: WithdrawalStatus::Pending,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
            provider_transfer,
        };
        self.withdrawals.insert(withdrawal.id, withdrawal.clone());

        Ok(withdrawal)
    }

    fn settle(
        &self,
        id: Uuid,
        decision: Adjudication,
        provider_transfer: bool,
    ) -> Result<Withdrawal, StoreError> {
        let mut withdrawal = self
            .withdrawals
            .get_mut(&id)
            .ok_or(StoreError::WithdrawalNotFound(id))?;

        if withdrawal.status != WithdrawalStatus::Pending
            || withdrawal.provider_transfer != provider_transfer
        {
            return Err(StoreError::AlreadyProcessed);
        }

        if let Adjudication::Reject { .. } = decision {
            self.credit(withdrawal.user_id, withdrawal.amount)?;
        }

        withdrawal.status = decision.status();
        withdrawal.rejection_reason = decision.reason().map(str::to_string);
        withdrawal.updated_at = Utc::now();

        Ok(withdrawal.clone())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4(),
            balance: user.balance,
            role: user.role,
            status: UserStatus::Active,
            last_active: None,
            created_at: Utc::now(),
        };
        self.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&id).map(|user| user.clone()))
    }

    async fn touch_user(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some(mut user) = self.users.get_mut(&id) {
            user.last_active = Some(Utc::now());
        }

        Ok(())
    }

    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.users.iter().map(|user| user.clone()).collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(users
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_users(&self) -> Result<i64, StoreError> {
        Ok(self.users.len() as i64)
    }

    async fn set_user_status(
        &self,
        id: Uuid,
        status: UserStatus,
    ) -> Result<Option<User>, StoreError> {
        Ok(self.users.get_mut(&id).map(|mut user| {
            user.status = status;
            user.clone()
        }))
    }

    async fn request_withdrawal(
        &self,
        user_id: Uuid,
        amount: Decimal,
        method: WithdrawalMethod,
    ) -> Result<Withdrawal, StoreError> {
        self.debit(user_id, amount, method, false)
    }

    async fn reserve_transfer(
        &self,
        user_id: Uuid,
        amount: Decimal,
    ) -> Result<Withdrawal, StoreError> {
        self.debit(user_id, amount, WithdrawalMethod::Bank, true)
    }

    async fn list_withdrawals(&self, user_id: Uuid) -> Result<Vec<Withdrawal>, StoreError> {
        let mut withdrawals: Vec<Withdrawal> = self
            .withdrawals
            .iter()
            .filter(|w| w.user_id == user_id)
            .map(|w| w.clone())
            .collect();
        withdrawals.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(withdrawals)
    }

    async fn adjudicate_withdrawal(
        &self,
        id: Uuid,
        decision: Adjudication,
    ) -> Result<Withdrawal, StoreError> {
        self.settle(id, decision, false)
    }

    async fn settle_transfer(
        &self,
        id: Uuid,
        decision: Adjudication,
    ) -> Result<Withdrawal, StoreError> {
        self.settle(id, decision, true)
    }

    async fn credit_payment(&self, credit: PaymentCredit) -> Result<CreditOutcome, StoreError> {
        match self.payments.entry(credit.payment_id.clone()) {
            Entry::Occupied(_) => Ok(CreditOutcome::Duplicate),
            Entry::Vacant(entry) => {
                let user = self.credit(credit.user_id, credit.amount)?;
                entry.insert(credit);

                Ok(CreditOutcome::Credited(user))
            }
        }
    }

    async fn stats(&self, active_since: DateTime<Utc>) -> Result<Stats, StoreError> {
        let mut stats = Stats::default();

        for user in self.users.iter() {
            stats.total_deposits += user.balance;
            if user.last_active.is_some_and(|at| at >= active_since) {
                stats.active_users += 1;
            }
        }

        for withdrawal in self.withdrawals.iter() {
            stats.total_withdrawals += withdrawal.amount;
            if withdrawal.status == WithdrawalStatus::Pending {
                stats.pending_withdrawals += 1;
            }
        }

        Ok(stats)
    }
}
