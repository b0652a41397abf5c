use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalMethod {
    Bank,
    Paypal,
    Crypto,
}

impl WithdrawalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalMethod::Bank => "bank",
            WithdrawalMethod::Paypal => "paypal",
            WithdrawalMethod::Crypto => "crypto",
        }
    }
}

impl FromStr for WithdrawalMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank" => Ok(WithdrawalMethod::Bank),
            "paypal" => Ok(WithdrawalMethod::Paypal),
            "crypto" => Ok(WithdrawalMethod::Crypto),
            other => Err(format!("unknown withdrawal method: {}", other)),
        }
    }
}

impl fmt::Display for WithdrawalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for WithdrawalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WithdrawalStatus::Pending),
            "completed" => Ok(WithdrawalStatus::Completed),
            "rejected" => Ok(WithdrawalStatus::Rejected),
            other => Err(format!("unknown withdrawal status: {}", other)),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub method: WithdrawalMethod,
    pub status: WithdrawalStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Reserved for a provider payout; only the payout flow may settle it.
    #[serde(skip)]
    pub provider_transfer: bool,
}

/// Terminal decision an administrator takes on a pending withdrawal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Adjudication {
    Complete,
    Reject { reason: Option<String> },
}

impl Adjudication {
    pub fn status(&self) -> WithdrawalStatus {
        match self {
            Adjudication::Complete => WithdrawalStatus::Completed,
            Adjudication::Reject { .. } => WithdrawalStatus::Rejected,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Adjudication::Complete => None,
            Adjudication::Reject { reason } => reason.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewWithdrawal {
    pub amount: Option<serde_json::Number>,
    pub method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdjudicateWithdrawal {
    pub status: Option<String>,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_known_methods_parse() {
        assert_eq!(
            "paypal".parse::<WithdrawalMethod>().unwrap(),
            WithdrawalMethod::Paypal
        );
        assert!("wire".parse::<WithdrawalMethod>().is_err());
        assert!("".parse::<WithdrawalMethod>().is_err());
    }

    #[test]
    fn adjudication_maps_to_terminal_status() {
        assert_eq!(Adjudication::Complete.status(), WithdrawalStatus::Completed);

        let reject = Adjudication::Reject {
            reason: Some("suspicious".to_string()),
        };
        assert_eq!(reject.status(), WithdrawalStatus::Rejected);
        assert_eq!(reject.reason(), Some("suspicious"));
    }
}
