use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path,
    },
    http::{header, HeaderValue, Method},
    routing::{get, patch, post},
    Json, Router,
};
use tokio::sync::{mpsc, oneshot};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use self::{auth::TokenKeys, error::ApiError};
use super::{ServiceChannels, ServiceError};
use crate::settings;

mod admin;
pub mod auth;
mod balance;
pub mod error;
mod payments;
mod withdrawals;

#[derive(Clone)]
pub struct AppState {
    channels: ServiceChannels,
    tokens: Arc<TokenKeys>,
}

impl AppState {
    pub fn new(channels: ServiceChannels, tokens: TokenKeys) -> Self {
        AppState {
            channels,
            tokens: Arc::new(tokens),
        }
    }
}

/// Sends a request to a service and waits for its reply.
async fn dispatch<R, T>(
    channel: &mpsc::Sender<R>,
    request: impl FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> R,
) -> Result<T, ApiError> {
    let (response_tx, response_rx) = oneshot::channel();

    channel.send(request(response_tx)).await.map_err(|e| {
        ServiceError::Communication("Failed to process request".to_string(), e.to_string())
    })?;

    let result = response_rx.await.map_err(|e| {
        ServiceError::Communication("Failed to receive response".to_string(), e.to_string())
    })?;

    Ok(result?)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ServiceError::InvalidRequest(e.body_text()).into())
}

fn path_id(id: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    id.map(|Path(id)| id)
        .map_err(|e| ServiceError::InvalidRequest(e.body_text()).into())
}

pub fn router(state: AppState, allowed_origin: &str) -> Result<Router, anyhow::Error> {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_str(allowed_origin)?)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/balance", get(balance::get_balance))
        .route(
            "/api/withdrawals",
            get(withdrawals::list_withdrawals).post(withdrawals::request_withdrawal),
        )
        .route(
            "/api/payments/create-payment-intent",
            post(payments::create_payment_intent),
        )
        .route("/api/payments/webhook", post(payments::webhook))
        .route("/api/payments/withdraw", post(payments::withdraw))
        .route("/api/admin/stats", get(admin::get_stats))
        .route("/api/admin/users", get(admin::list_users))
        .route(
            "/api/admin/users/{id}/status",
            patch(admin::update_user_status),
        )
        .route(
            "/api/admin/withdrawals/{id}",
            patch(admin::adjudicate_withdrawal),
        )
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

pub async fn start_http_server(
    channels: ServiceChannels,
    server: settings::Server,
    auth: settings::Auth,
) -> Result<(), anyhow::Error> {
    let state = AppState::new(
        channels,
        TokenKeys::new(&auth.jwt_secret, auth.token_ttl_secs),
    );
    let app = router(state, &server.allowed_origin)?;

    let listener = tokio::net::TcpListener::bind((server.host.as_str(), server.port)).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        models::users::{NewUser, Role},
        repositories::{
            memory::MemoryStore,
            stripe::{tests::sign, WebhookVerifier},
            Store,
        },
        services::{spawn_services, testing::FakeProvider},
    };

    const JWT_SECRET: &str = "jwt-test-secret";
    const WEBHOOK_SECRET: &str = "whsec_http";

    struct TestApp {
        app: Router,
        store: Arc<MemoryStore>,
        tokens: TokenKeys,
    }

    impl TestApp {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let channels = spawn_services(
                store.clone(),
                Arc::new(FakeProvider::default()),
                WebhookVerifier::new(WEBHOOK_SECRET.to_string(), 300),
            );
            let tokens = TokenKeys::new(JWT_SECRET, 3600);
            let app = router(
                AppState::new(channels, tokens.clone()),
                "http://localhost:3000",
            )
            .unwrap();

            TestApp { app, store, tokens }
        }

        async fn user(&self, role: Role, balance: i64) -> (Uuid, String) {
            let user = self
                .store
                .insert_user(NewUser {
                    role,
                    balance: Decimal::from(balance),
                })
                .await
                .unwrap();

            (user.id, self.tokens.issue(user.id).unwrap())
        }

        async fn send(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                request = request.header("authorization", format!("Bearer {}", token));
            }
            let request = match body {
                Some(body) => request
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => request.body(Body::empty()).unwrap(),
            };

            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));

            (status, value)
        }
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = TestApp::new();

        let (status, body) = app.send("GET", "/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("OK".to_string()));
    }

    #[tokio::test]
    async fn balance_requires_valid_token() {
        let app = TestApp::new();
        let (_, token) = app.user(Role::User, 100).await;

        let (status, body) = app.send("GET", "/api/balance", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "auth_required");

        let (status, body) = app.send("GET", "/api/balance", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_token");

        let (status, body) = app.send("GET", "/api/balance", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "balance": 100.0 }));
    }

    #[tokio::test]
    async fn balance_of_deleted_user_is_not_found() {
        let app = TestApp::new();
        let token = app.tokens.issue(Uuid::new_v4()).unwrap();

        let (status, body) = app.send("GET", "/api/balance", Some(&token), None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "user_not_found");
    }

    #[tokio::test]
    async fn withdrawal_request_and_listing() {
        let app = TestApp::new();
        let (_, token) = app.user(Role::User, 100).await;

        let (status, body) = app
            .send(
                "POST",
                "/api/withdrawals",
                Some(&token),
                Some(json!({ "amount": 50, "method": "bank" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["amount"], json!(50.0));
        assert_eq!(body["method"], "bank");

        let (status, body) = app
            .send(
                "POST",
                "/api/withdrawals",
                Some(&token),
                Some(json!({ "amount": 5, "method": "bank" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_amount");

        let (status, body) = app
            .send(
                "POST",
                "/api/withdrawals",
                Some(&token),
                Some(json!({ "amount": 60, "method": "bank" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "insufficient_balance");

        let (status, body) = app.send("GET", "/api/withdrawals", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, body) = app.send("GET", "/api/balance", Some(&token), None).await;
        assert_eq!(body["balance"], json!(50.0));
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_request() {
        let app = TestApp::new();
        let (_, token) = app.user(Role::User, 100).await;

        let (status, body) = app
            .send(
                "POST",
                "/api/withdrawals",
                Some(&token),
                Some(json!({ "amount": "lots" })),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn admin_routes_reject_plain_users() {
        let app = TestApp::new();
        let (_, token) = app.user(Role::User, 0).await;

        let (status, body) = app.send("GET", "/api/admin/stats", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");

        let (status, _) = app.send("GET", "/api/admin/stats", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_adjudicates_withdrawals() {
        let app = TestApp::new();
        let (_, admin) = app.user(Role::Admin, 0).await;
        let (_, token) = app.user(Role::User, 100).await;

        let (_, withdrawal) = app
            .send(
                "POST",
                "/api/withdrawals",
                Some(&token),
                Some(json!({ "amount": 50, "method": "bank" })),
            )
            .await;
        let uri = format!("/api/admin/withdrawals/{}", withdrawal["id"].as_str().unwrap());

        let (status, body) = app
            .send(
                "PATCH",
                &uri,
                Some(&admin),
                Some(json!({ "status": "rejected", "reason": "suspicious" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "rejected");
        assert_eq!(body["rejectionReason"], "suspicious");

        let (status, body) = app
            .send("PATCH", &uri, Some(&admin), Some(json!({ "status": "completed" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "already_processed");

        let (_, body) = app.send("GET", "/api/balance", Some(&token), None).await;
        assert_eq!(body["balance"], json!(100.0));

        let (status, body) = app
            .send(
                "PATCH",
                &format!("/api/admin/withdrawals/{}", Uuid::new_v4()),
                Some(&admin),
                Some(json!({ "status": "completed" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "withdrawal_not_found");

        let (status, body) = app
            .send(
                "PATCH",
                "/api/admin/withdrawals/not-a-uuid",
                Some(&admin),
                Some(json!({ "status": "completed" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn admin_manages_users_and_reads_stats() {
        let app = TestApp::new();
        let (_, admin) = app.user(Role::Admin, 0).await;
        let (user_id, token) = app.user(Role::User, 40).await;
        app.send("GET", "/api/balance", Some(&token), None).await;

        let (status, body) = app
            .send("GET", "/api/admin/users?page=1&limit=1", Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["users"].as_array().unwrap().len(), 1);
        assert_eq!(body["pagination"], json!({ "total": 2, "pages": 2, "current": 1 }));

        let uri = format!("/api/admin/users/{}/status", user_id);
        let (status, body) = app
            .send("PATCH", &uri, Some(&admin), Some(json!({ "status": "banned" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_status");

        let (status, body) = app
            .send("PATCH", &uri, Some(&admin), Some(json!({ "status": "suspended" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "suspended");

        let (status, body) = app
            .send(
                "PATCH",
                &format!("/api/admin/users/{}/status", Uuid::new_v4()),
                Some(&admin),
                Some(json!({ "status": "active" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "user_not_found");

        let (status, body) = app.send("GET", "/api/admin/stats", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "activeUsers": 1,
                "totalDeposits": 40.0,
                "totalWithdrawals": 0.0,
                "pendingWithdrawals": 0
            })
        );
    }

    #[tokio::test]
    async fn huge_page_lists_no_users() {
        let app = TestApp::new();
        let (_, admin) = app.user(Role::Admin, 0).await;

        let (status, body) = app
            .send(
                "GET",
                "/api/admin/users?page=9223372036854775807&limit=10",
                Some(&admin),
                None,
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["users"], json!([]));
        assert_eq!(body["pagination"]["total"], 1);
        assert_eq!(body["pagination"]["current"], json!(i64::MAX));
    }

    #[tokio::test]
    async fn bearer_scheme_is_case_insensitive() {
        let app = TestApp::new();
        let (_, token) = app.user(Role::User, 7).await;

        let request = Request::builder()
            .uri("/api/balance")
            .header("authorization", format!("bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let response = app.app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn deposit_flow_over_http() {
        let app = TestApp::new();
        let (user_id, token) = app.user(Role::User, 0).await;

        let (status, body) = app
            .send(
                "POST",
                "/api/payments/create-payment-intent",
                Some(&token),
                Some(json!({ "amount": 20 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["clientSecret"].as_str().is_some());

        let (status, body) = app
            .send(
                "POST",
                "/api/payments/create-payment-intent",
                Some(&token),
                Some(json!({ "amount": 2 })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_amount");

        let payload = json!({
            "id": "evt_http",
            "type": "payment_intent.succeeded",
            "data": { "object": {
                "id": "pi_http",
                "amount": 2000,
                "metadata": { "userId": user_id.to_string(), "type": "deposit" }
            }}
        })
        .to_string();

        let forged = Request::builder()
            .method("POST")
            .uri("/api/payments/webhook")
            .header("stripe-signature", "t=1,v1=00")
            .body(Body::from(payload.clone()))
            .unwrap();
        let response = app.app.clone().oneshot(forged).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let text = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&text).starts_with("Webhook Error"));

        let signature = sign(
            WEBHOOK_SECRET,
            payload.as_bytes(),
            chrono::Utc::now().timestamp(),
        );
        let signed = Request::builder()
            .method("POST")
            .uri("/api/payments/webhook")
            .header("stripe-signature", signature)
            .body(Body::from(payload))
            .unwrap();
        let response = app.app.clone().oneshot(signed).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (_, body) = app.send("GET", "/api/balance", Some(&token), None).await;
        assert_eq!(body["balance"], json!(20.0));
    }

    #[tokio::test]
    async fn direct_transfer_over_http() {
        let app = TestApp::new();
        let (_, token) = app.user(Role::User, 30).await;

        let (status, body) = app
            .send(
                "POST",
                "/api/payments/withdraw",
                Some(&token),
                Some(json!({ "amount": 25, "accountId": "acct_1" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transfer"]["amount"], 2500);
        assert_eq!(body["withdrawal"]["status"], "completed");

        let (status, body) = app
            .send(
                "POST",
                "/api/payments/withdraw",
                Some(&token),
                Some(json!({ "amount": 25, "accountId": "acct_1" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "insufficient_balance");
    }
}
