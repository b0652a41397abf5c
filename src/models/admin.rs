use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::users::User;

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub active_users: i64,
    /// Sum of current user balances, not of cumulative deposits.
    #[serde(with = "rust_decimal::serde::float")]
    pub total_deposits: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_withdrawals: Decimal,
    pub pending_withdrawals: i64,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 10;
    pub const MAX_LIMIT: i64 = 100;

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl From<PageQuery> for Page {
    fn from(query: PageQuery) -> Self {
        let parse = |value: Option<String>| {
            value
                .and_then(|v| v.trim().parse::<i64>().ok())
                .filter(|v| *v > 0)
        };

        let page = parse(query.page).unwrap_or(1);
        let limit = parse(query.limit)
            .unwrap_or(Self::DEFAULT_LIMIT)
            .min(Self::MAX_LIMIT);

        Page { page, limit }
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub pages: i64,
    pub current: i64,
}

impl Pagination {
    pub fn new(total: i64, page: Page) -> Self {
        let pages = (total + page.limit - 1) / page.limit;

        Pagination {
            total,
            pages,
            current: page.page,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub users: Vec<User>,
    pub pagination: Pagination,
}
