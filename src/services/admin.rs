use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::{models::admin::Stats, repositories::Store};

const ACTIVE_WINDOW_HOURS: i64 = 24;

pub enum AdminRequest {
    GetStats {
        response: oneshot::Sender<Result<Stats, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct AdminRequestHandler {
    store: Arc<dyn Store>,
}

impl AdminRequestHandler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        AdminRequestHandler { store }
    }

    async fn get_stats(&self) -> Result<Stats, ServiceError> {
        let active_since = Utc::now() - Duration::hours(ACTIVE_WINDOW_HOURS);

        Ok(self.store.stats(active_since).await?)
    }
}

#[async_trait]
impl RequestHandler<AdminRequest> for AdminRequestHandler {
    async fn handle_request(&self, request: AdminRequest) {
        match request {
            AdminRequest::GetStats { response } => {
                let stats = self.get_stats().await;
                let _ = response.send(stats);
            }
        }
    }
}

pub struct AdminService;

impl AdminService {
    pub fn new() -> Self {
        AdminService {}
    }
}

#[async_trait]
impl Service<AdminRequest, AdminRequestHandler> for AdminService {}
