use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};

use super::{auth::AuthUser, dispatch, error::ApiError, json_body, AppState};
use crate::{
    models::withdrawals::{NewWithdrawal, Withdrawal},
    services::withdrawals::WithdrawalRequest,
};

pub async fn list_withdrawals(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<Withdrawal>>, ApiError> {
    let withdrawals = dispatch(&state.channels.withdrawals, |response| {
        WithdrawalRequest::List { user_id, response }
    })
    .await?;

    Ok(Json(withdrawals))
}

pub async fn request_withdrawal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<NewWithdrawal>, JsonRejection>,
) -> Result<(StatusCode, Json<Withdrawal>), ApiError> {
    let withdrawal = json_body(payload)?;

    let withdrawal = dispatch(&state.channels.withdrawals, |response| {
        WithdrawalRequest::Request {
            user_id,
            withdrawal,
            response,
        }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(withdrawal)))
}
