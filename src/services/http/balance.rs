use axum::{extract::State, Json};

use super::{auth::AuthUser, dispatch, error::ApiError, AppState};
use crate::{models::users::BalanceResponse, services::users::UserRequest};

pub async fn get_balance(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = dispatch(&state.channels.users, |response| UserRequest::GetBalance {
        user_id,
        response,
    })
    .await?;

    Ok(Json(BalanceResponse { balance }))
}
