use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{
    admin::Stats,
    payments::{CreditOutcome, PaymentCredit},
    users::{NewUser, User, UserStatus},
    withdrawals::{Adjudication, Withdrawal, WithdrawalMethod, WithdrawalStatus},
};

const USER_COLUMNS: &str = "id, balance, role, status, last_active, created_at";
const WITHDRAWAL_COLUMNS: &str = "id, user_id, amount, method, status, rejection_reason, \
    created_at, updated_at, provider_transfer";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    balance: Decimal,
    role: String,
    status: String,
    last_active: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            balance: row.balance,
            role: row.role.parse().map_err(StoreError::Corrupt)?,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            last_active: row.last_active,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WithdrawalRow {
    id: Uuid,
    user_id: Uuid,
    amount: Decimal,
    method: String,
    status: String,
    rejection_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    provider_transfer: bool,
}

impl TryFrom<WithdrawalRow> for Withdrawal {
    type Error = StoreError;

    fn try_from(row: WithdrawalRow) -> Result<Self, Self::Error> {
        Ok(Withdrawal {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            method: row.method.parse().map_err(StoreError::Corrupt)?,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            rejection_reason: row.rejection_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            provider_transfer: row.provider_transfer,
        })
    }
}

#[derive(Clone)]
pub struct PostgresStore {
    conn: PgPool,
}

impl PostgresStore {
    pub fn new(conn: PgPool) -> Self {
        PostgresStore { conn }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, anyhow::Error> {
        let conn = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        Ok(Self::new(conn))
    }

    pub async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::migrate!("./migrations").run(&self.conn).await?;
        Ok(())
    }

    async fn debit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        method: WithdrawalMethod,
        provider_transfer: bool,
    ) -> Result<Withdrawal, StoreError> {
        let mut tx = self.conn.begin().await?;

        let debited: Option<Uuid> = sqlx::query_scalar(
            r#"UPDATE users
            SET balance = balance - $1,
                last_active = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND balance >= $1
            RETURNING id"#,
        )
        .bind(amount)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        if debited.is_none() {
            let exists: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;
            tx.rollback().await?;

            return Err(match exists {
                0 => StoreError::UserNotFound(user_id),
                _ => StoreError::InsufficientBalance,
            });
        }

        let row = sqlx::query_as::<_, WithdrawalRow>(&format!(
            r#"INSERT INTO withdrawals (id, user_id, amount, method, status, provider_transfer)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            RETURNING {}"#,
            WITHDRAWAL_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(amount)
        .bind(method.as_str())
        .bind(provider_transfer)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        row.try_into()
    }

    async fn settle(
        &self,
        id: Uuid,
        decision: Adjudication,
        provider_transfer: bool,
    ) -> Result<Withdrawal, StoreError> {
        let mut tx = self.conn.begin().await?;

        let current: Withdrawal = sqlx::query_as::<_, WithdrawalRow>(&format!(
            "SELECT {} FROM withdrawals WHERE id = $1 FOR UPDATE",
            WITHDRAWAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::WithdrawalNotFound(id))?
        .try_into()?;

        if current.status != WithdrawalStatus::Pending
            || current.provider_transfer != provider_transfer
        {
            tx.rollback().await?;
            return Err(StoreError::AlreadyProcessed);
        }

        let row = sqlx::query_as::<_, WithdrawalRow>(&format!(
            r#"UPDATE withdrawals
            SET status = $1, rejection_reason = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $3
            RETURNING {}"#,
            WITHDRAWAL_COLUMNS
        ))
        .bind(decision.status().as_str())
        .bind(decision.reason())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if let Adjudication::Reject { .. } = decision {
            let refunded = sqlx::query(
                r#"UPDATE users
                SET balance = balance + $1, updated_at = CURRENT_TIMESTAMP
                WHERE id = $2"#,
            )
            .bind(current.amount)
            .bind(current.user_id)
            .execute(&mut *tx)
            .await?;

            if refunded.rows_affected() != 1 {
                tx.rollback().await?;
                return Err(StoreError::UserNotFound(current.user_id));
            }
        }

        tx.commit().await?;

        row.try_into()
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"INSERT INTO users (id, balance, role, status)
            VALUES ($1, $2, $3, 'active')
            RETURNING {}"#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user.balance)
        .bind(user.role.as_str())
        .fetch_one(&self.conn)
        .await?;

        row.try_into()
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn touch_user(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_active = CURRENT_TIMESTAMP WHERE id = $1")
            .bind(id)
            .execute(&self.conn)
            .await?;

        Ok(())
    }

    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
            USER_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.conn)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn count_users(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users")
            .fetch_one(&self.conn)
            .await?;

        Ok(count)
    }

    async fn set_user_status(
        &self,
        id: Uuid,
        status: UserStatus,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"UPDATE users
            SET status = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2
            RETURNING {}"#,
            USER_COLUMNS
        ))
        .bind(status.as_str())
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn request_withdrawal(
        &self,
        user_id: Uuid,
        amount: Decimal,
        method: WithdrawalMethod,
    ) -> Result<Withdrawal, StoreError> {
        self.debit(user_id, amount, method, false).await
    }

    async fn reserve_transfer(
        &self,
        user_id: Uuid,
        amount: Decimal,
    ) -> Result<Withdrawal, StoreError> {
        self.debit(user_id, amount, WithdrawalMethod::Bank, true).await
    }

    async fn list_withdrawals(&self, user_id: Uuid) -> Result<Vec<Withdrawal>, StoreError> {
        let rows = sqlx::query_as::<_, WithdrawalRow>(&format!(
            "SELECT {} FROM withdrawals WHERE user_id = $1 ORDER BY created_at DESC",
            WITHDRAWAL_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        rows.into_iter().map(Withdrawal::try_from).collect()
    }

    async fn adjudicate_withdrawal(
        &self,
        id: Uuid,
        decision: Adjudication,
    ) -> Result<Withdrawal, StoreError> {
        self.settle(id, decision, false).await
    }

    async fn settle_transfer(
        &self,
        id: Uuid,
        decision: Adjudication,
    ) -> Result<Withdrawal, StoreError> {
        self.settle(id, decision, true).await
    }

    async fn credit_payment(&self, credit: PaymentCredit) -> Result<CreditOutcome, StoreError> {
        let mut tx = self.conn.begin().await?;

        let user: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
                .bind(credit.user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if user.is_none() {
            tx.rollback().await?;
            return Err(StoreError::UserNotFound(credit.user_id));
        }

        let recorded: Option<String> = sqlx::query_scalar(
            r#"INSERT INTO processed_payments (payment_id, event_id, user_id, amount)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (payment_id) DO NOTHING
            RETURNING payment_id"#,
        )
        .bind(&credit.payment_id)
        .bind(&credit.event_id)
        .bind(credit.user_id)
        .bind(credit.amount)
        .fetch_optional(&mut *tx)
        .await?;

        if recorded.is_none() {
            tx.rollback().await?;
            return Ok(CreditOutcome::Duplicate);
        }

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"UPDATE users
            SET balance = balance + $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2
            RETURNING {}"#,
            USER_COLUMNS
        ))
        .bind(credit.amount)
        .bind(credit.user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(CreditOutcome::Credited(row.try_into()?))
    }

    async fn stats(&self, active_since: DateTime<Utc>) -> Result<Stats, StoreError> {
        let active_users: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE last_active >= $1")
                .bind(active_since)
                .fetch_one(&self.conn)
                .await?;

        let (total_withdrawals, pending_withdrawals): (Decimal, i64) = sqlx::query_as(
            r#"SELECT
            COALESCE(SUM(amount), 0),
            COUNT(1) FILTER (WHERE status = 'pending')
            FROM withdrawals"#,
        )
        .fetch_one(&self.conn)
        .await?;

        let total_deposits: Decimal =
            sqlx::query_scalar("SELECT COALESCE(SUM(balance), 0) FROM users")
                .fetch_one(&self.conn)
                .await?;

        Ok(Stats {
            active_users,
            total_deposits,
            total_withdrawals,
            pending_withdrawals,
        })
    }
}
