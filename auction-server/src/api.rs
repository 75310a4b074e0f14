use {
    crate::{
        auction,
        config::RunOptions,
        kernel::entities::{
            AccessToken,
            UserId,
        },
        server::{
            EXIT_CHECK_INTERVAL,
            SHOULD_EXIT,
        },
        state::StoreNew,
    },
    anyhow::Result,
    axum::{
        async_trait,
        extract::{
            FromRequestParts,
            Query,
        },
        http::{
            request::Parts,
            StatusCode,
        },
        response::{
            IntoResponse,
            Response,
        },
        routing::get,
        Json,
        Router,
    },
    axum_extra::{
        headers::{
            authorization::Bearer,
            Authorization,
        },
        TypedHeader,
    },
    clap::crate_version,
    live_auction_api_types::{
        auction::{
            AuctionSnapshot,
            AuctionStatus,
            LastVote,
        },
        ws::{
            ClientMessage,
            ServerResultMessage,
        },
        ErrorBodyResponse,
        Route,
    },
    serde::Deserialize,
    std::sync::{
        atomic::Ordering,
        Arc,
    },
    tower_http::cors::CorsLayer,
    utoipa::OpenApi,
    utoipa_redoc::{
        Redoc,
        Servable,
    },
};

pub mod ws;

async fn root() -> String {
    format!("Live Auction Server API {}", crate_version!())
}

#[derive(Debug, Clone, PartialEq)]
pub enum RestError {
    /// The request contained invalid parameters
    BadParameters(String),
    /// The access token is missing or unknown
    Unauthorized,
    /// The user is not allowed to access the resource
    Forbidden,
    /// The auction was not found
    AuctionNotFound,
    /// The requester has too many open websocket connections
    TooManyOpenWebsocketConnections,
    /// Internal error occurred during processing the request
    TemporarilyUnavailable,
}

impl RestError {
    pub fn to_status_and_message(&self) -> (StatusCode, String) {
        match self {
            RestError::BadParameters(msg) => {
                (StatusCode::BAD_REQUEST, format!("Bad parameters: {}", msg))
            }
            RestError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Invalid or missing access token".to_string(),
            ),
            RestError::Forbidden => (
                StatusCode::FORBIDDEN,
                "You are not a participant of this auction".to_string(),
            ),
            RestError::AuctionNotFound => (
                StatusCode::NOT_FOUND,
                "Auction with the specified id was not found".to_string(),
            ),
            RestError::TooManyOpenWebsocketConnections => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many open websocket connections".to_string(),
            ),
            RestError::TemporarilyUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "This service is temporarily unavailable".to_string(),
            ),
        }
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let (status, msg) = self.to_status_and_message();
        (status, Json(ErrorBodyResponse { error: msg })).into_response()
    }
}

pub async fn live() -> Response {
    (StatusCode::OK, "OK").into_response()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Auth {
    Authorized(AccessToken, UserId),
    Unauthorized,
}

#[derive(Deserialize)]
struct TokenQueryParams {
    token: Option<AccessToken>,
}

/// Browsers cannot set headers on websocket handshakes, so the token is also read from the
/// `token` query parameter.
fn token_from_query(parts: &Parts) -> Option<AccessToken> {
    Query::<TokenQueryParams>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(params)| params.token)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<StoreNew>> for Auth {
    type Rejection = RestError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<StoreNew>,
    ) -> Result<Self, Self::Rejection> {
        let token = match TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
        {
            Ok(TypedHeader(Authorization(bearer))) => Some(bearer.token().to_string()),
            Err(_) => token_from_query(parts),
        };
        match token {
            Some(token) => match state.store.get_user_by_token(&token).await? {
                Some(user_id) => Ok(Auth::Authorized(token, user_id)),
                None => Err(RestError::Unauthorized),
            },
            None => Ok(Auth::Unauthorized),
        }
    }
}

pub async fn start_api(run_options: RunOptions, store: Arc<StoreNew>) -> Result<()> {
    // Make sure functions included in the paths section have distinct names, otherwise some api generators will fail
    #[derive(OpenApi)]
    #[openapi(
    paths(
    auction::api::get_auction,
    ),
    components(
    schemas(
    AuctionSnapshot,
    AuctionStatus,
    LastVote,
    ErrorBodyResponse,
    ClientMessage,
    ServerResultMessage,
    ),
    responses(
    ErrorBodyResponse,
    AuctionSnapshot,
    ),
    ),
    tags(
    (name = "Live Auction Server", description = "Live Auction Server runs timed auctions. Participants \
    follow an auction and place bids over a websocket while the server starts and ends auctions on schedule.")
    )
    )]
    struct ApiDoc;

    let v1_routes = Router::new().nest(Route::V1.as_ref(), auction::api::get_routes());

    let app: Router<()> = Router::new()
        .merge(Redoc::with_url(Route::Docs.as_ref().to_string(), ApiDoc::openapi()))
        .route(
            Route::OpenApi.as_ref(),
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(v1_routes)
        .route(Route::Root.as_ref(), get(root))
        .route(Route::Liveness.as_ref(), get(live))
        .layer(CorsLayer::permissive())
        .with_state(store);

    let listener = tokio::net::TcpListener::bind(&run_options.server.listen_addr).await?;
    tracing::info!(addr = %run_options.server.listen_addr, "Starting API server...");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            while !SHOULD_EXIT.load(Ordering::Acquire) {
                tokio::time::sleep(EXIT_CHECK_INTERVAL).await;
            }
            tracing::info!("Shutting down API server...");
        })
        .await?;
    Ok(())
}
