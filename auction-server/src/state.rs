use {
    crate::{
        api::{
            ws::WsState,
            RestError,
        },
        auction::service::Service,
        kernel::{
            db::DB,
            entities::{
                AccessToken,
                UserId,
            },
        },
    },
    axum_prometheus::metrics_exporter_prometheus::PrometheusHandle,
    std::{
        collections::HashMap,
        sync::Arc,
    },
    tokio::sync::RwLock,
    tokio_util::task::TaskTracker,
};

pub struct Store {
    pub db:               DB,
    pub ws:               WsState,
    /// Tokens are never revoked while the server runs, so a resolved token stays cached.
    pub access_tokens:    RwLock<HashMap<AccessToken, UserId>>,
    pub metrics_recorder: PrometheusHandle,
}

pub struct StoreNew {
    pub store:           Arc<Store>,
    pub auction_service: Service,
    pub task_tracker:    TaskTracker,
}

impl Store {
    pub async fn get_user_by_token(&self, token: &str) -> Result<Option<UserId>, RestError> {
        if let Some(user_id) = self.access_tokens.read().await.get(token) {
            return Ok(Some(*user_id));
        }
        let user_id: Option<UserId> =
            sqlx::query_scalar("SELECT user_id FROM access_token WHERE token = $1")
                .bind(token)
                .fetch_optional(&self.db)
                .await
                .map_err(|e| {
                    tracing::error!(error = e.to_string(), "Failed to get user by token");
                    RestError::TemporarilyUnavailable
                })?;
        if let Some(user_id) = user_id {
            self.access_tokens
                .write()
                .await
                .insert(token.to_string(), user_id);
        }
        Ok(user_id)
    }
}
