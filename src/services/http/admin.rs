use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    Json,
};
use uuid::Uuid;

use super::{auth::AdminUser, dispatch, error::ApiError, json_body, path_id, AppState};
use crate::{
    models::{
        admin::{Page, PageQuery, Stats, UserPage},
        users::{UpdateUserStatus, User},
        withdrawals::{AdjudicateWithdrawal, Withdrawal},
    },
    services::{admin::AdminRequest, users::UserRequest, withdrawals::WithdrawalRequest},
};

pub async fn get_stats(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Stats>, ApiError> {
    let stats = dispatch(&state.channels.admin, |response| AdminRequest::GetStats {
        response,
    })
    .await?;

    Ok(Json(stats))
}

pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<UserPage>, ApiError> {
    let page = Page::from(query);

    let users = dispatch(&state.channels.users, |response| UserRequest::ListUsers {
        page,
        response,
    })
    .await?;

    Ok(Json(users))
}

pub async fn update_user_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateUserStatus>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let id = path_id(id)?;
    let update = json_body(payload)?;

    log::info!("Admin {} updates status of user {}.", admin.id, id);
    let user = dispatch(&state.channels.users, |response| UserRequest::SetStatus {
        id,
        update,
        response,
    })
    .await?;

    Ok(Json(user))
}

pub async fn adjudicate_withdrawal(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<AdjudicateWithdrawal>, JsonRejection>,
) -> Result<Json<Withdrawal>, ApiError> {
    let id = path_id(id)?;
    let decision = json_body(payload)?;

    log::info!("Admin {} adjudicates withdrawal {}.", admin.id, id);
    let withdrawal = dispatch(&state.channels.withdrawals, |response| {
        WithdrawalRequest::Adjudicate {
            id,
            decision,
            response,
        }
    })
    .await?;

    Ok(Json(withdrawal))
}
