use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};

use super::{auth::AuthUser, dispatch, error::ApiError, json_body, AppState};
use crate::{
    models::payments::{
        NewPaymentIntent, NewTransfer, PaymentIntentResponse, TransferResponse, WebhookAck,
    },
    services::{payments::PaymentRequest, withdrawals::WithdrawalRequest},
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub async fn create_payment_intent(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<NewPaymentIntent>, JsonRejection>,
) -> Result<Json<PaymentIntentResponse>, ApiError> {
    let intent = json_body(payload)?;

    let response = dispatch(&state.channels.payments, |response| {
        PaymentRequest::CreateIntent {
            user_id,
            intent,
            response,
        }
    })
    .await?;

    Ok(Json(response))
}

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let ack = dispatch(&state.channels.payments, |response| PaymentRequest::Webhook {
        payload: body.to_vec(),
        signature,
        response,
    })
    .await?;

    Ok(Json(ack))
}

pub async fn withdraw(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<NewTransfer>, JsonRejection>,
) -> Result<Json<TransferResponse>, ApiError> {
    let transfer = json_body(payload)?;

    let response = dispatch(&state.channels.withdrawals, |response| {
        WithdrawalRequest::Transfer {
            user_id,
            transfer,
            response,
        }
    })
    .await?;

    Ok(Json(response))
}
