use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{RequestHandler, Service, ServiceError};
use crate::{
    models::{
        admin::{Page, Pagination, UserPage},
        users::{UpdateUserStatus, User, UserStatus},
    },
    repositories::Store,
};

pub enum UserRequest {
    GetBalance {
        user_id: Uuid,
        response: oneshot::Sender<Result<Decimal, ServiceError>>,
    },
    GetUser {
        id: Uuid,
        response: oneshot::Sender<Result<Option<User>, ServiceError>>,
    },
    ListUsers {
        page: Page,
        response: oneshot::Sender<Result<UserPage, ServiceError>>,
    },
    SetStatus {
        id: Uuid,
        update: UpdateUserStatus,
        response: oneshot::Sender<Result<User, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct UserRequestHandler {
    store: Arc<dyn Store>,
}

impl UserRequestHandler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        UserRequestHandler { store }
    }

    async fn get_balance(&self, user_id: Uuid) -> Result<Decimal, ServiceError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;
        self.store.touch_user(user_id).await?;

        Ok(user.balance)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self.store.get_user(id).await?)
    }

    async fn list_users(&self, page: Page) -> Result<UserPage, ServiceError> {
        let users = self.store.list_users(page.offset(), page.limit).await?;
        let total = self.store.count_users().await?;

        Ok(UserPage {
            users,
            pagination: Pagination::new(total, page),
        })
    }

    async fn set_status(&self, id: Uuid, update: UpdateUserStatus) -> Result<User, ServiceError> {
        let status = update
            .status
            .as_deref()
            .and_then(|s| s.parse::<UserStatus>().ok())
            .ok_or(ServiceError::InvalidStatus)?;

        let user = self
            .store
            .set_user_status(id, status)
            .await?
            .ok_or(ServiceError::UserNotFound)?;
        log::info!("User {} is now {}.", user.id, status.as_str());

        Ok(user)
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::GetBalance { user_id, response } => {
                let balance = self.get_balance(user_id).await;
                let _ = response.send(balance);
            }
            UserRequest::GetUser { id, response } => {
                let user = self.get_user(id).await;
                let _ = response.send(user);
            }
            UserRequest::ListUsers { page, response } => {
                let users = self.list_users(page).await;
                let _ = response.send(users);
            }
            UserRequest::SetStatus {
                id,
                update,
                response,
            } => {
                let user = self.set_status(id, update).await;
                let _ = response.send(user);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::users::{NewUser, Role},
        repositories::memory::MemoryStore,
    };

    async fn handler_with_users(count: usize) -> (UserRequestHandler, Vec<User>) {
        let store = Arc::new(MemoryStore::new());
        let mut users = Vec::new();
        for _ in 0..count {
            users.push(
                store
                    .insert_user(NewUser {
                        role: Role::User,
                        balance: Decimal::from(25),
                    })
                    .await
                    .unwrap(),
            );
        }

        (UserRequestHandler::new(store), users)
    }

    #[tokio::test]
    async fn balance_read_marks_user_active() {
        let (handler, users) = handler_with_users(1).await;

        let balance = handler.get_balance(users[0].id).await.unwrap();
        assert_eq!(balance, Decimal::from(25));

        let user = handler.get_user(users[0].id).await.unwrap().unwrap();
        assert!(user.last_active.is_some());
    }

    #[tokio::test]
    async fn balance_of_unknown_user_is_not_found() {
        let (handler, _) = handler_with_users(0).await;

        let result = handler.get_balance(Uuid::new_v4()).await;
        assert!(matches!(result, Err(ServiceError::UserNotFound)));
    }

    #[tokio::test]
    async fn lists_users_page_by_page() {
        let (handler, _) = handler_with_users(3).await;

        let page = handler
            .list_users(Page { page: 2, limit: 2 })
            .await
            .unwrap();

        assert_eq!(page.users.len(), 1);
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.pages, 2);
        assert_eq!(page.pagination.current, 2);
    }

    #[tokio::test]
    async fn status_changes_are_validated() {
        let (handler, users) = handler_with_users(1).await;

        let invalid = handler
            .set_status(
                users[0].id,
                UpdateUserStatus {
                    status: Some("banned".to_string()),
                },
            )
            .await;
        assert!(matches!(invalid, Err(ServiceError::InvalidStatus)));

        let missing = handler
            .set_status(
                Uuid::new_v4(),
                UpdateUserStatus {
                    status: Some("suspended".to_string()),
                },
            )
            .await;
        assert!(matches!(missing, Err(ServiceError::UserNotFound)));

        let user = handler
            .set_status(
                users[0].id,
                UpdateUserStatus {
                    status: Some("suspended".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(user.status, UserStatus::Suspended);
    }
}
