use {
    super::{
        entities,
        service::get_auction_snapshot::GetAuctionSnapshotInput,
    },
    crate::{
        api::{
            ws,
            Auth,
            RestError,
        },
        kernel::entities::UserId,
        state::StoreNew,
    },
    axum::{
        extract::{
            Path,
            State,
        },
        routing::get,
        Json,
        Router,
    },
    live_auction_api_types::{
        auction::{
            AuctionSnapshot,
            AuctionStatus,
            LastVote,
        },
        ErrorBodyResponse,
        Route,
    },
    std::sync::Arc,
};

/// Get the current state of an auction.
///
/// Only participants of the auction can read it. The response has the same shape as the
/// updates pushed over the auction websocket.
#[utoipa::path(get, path = "/v1/auctions/{auction_id}",
    params(("auction_id" = i64, description = "Auction id to query for")),
    responses(
    (status = 200, body = AuctionSnapshot),
    (status = 401, description = "Missing or invalid access token", body = ErrorBodyResponse),
    (status = 403, description = "The user is not a participant of the auction", body = ErrorBodyResponse),
    (status = 404, description = "Auction was not found", body = ErrorBodyResponse),
),)]
pub async fn get_auction(
    auth: Auth,
    State(store): State<Arc<StoreNew>>,
    Path(auction_id): Path<entities::AuctionId>,
) -> Result<Json<AuctionSnapshot>, RestError> {
    let snapshot = store
        .auction_service
        .get_auction_snapshot(GetAuctionSnapshotInput { auction_id })
        .await?;
    authorize_participant(&auth, &snapshot.auction)?;
    Ok(Json(snapshot.into()))
}

/// Resolves the user of an authenticated request and checks they take part in the auction.
pub fn authorize_participant(auth: &Auth, auction: &entities::Auction) -> Result<UserId, RestError> {
    match auth {
        Auth::Authorized(_, user_id) if auction.is_participant(*user_id) => Ok(*user_id),
        Auth::Authorized(_, _) => Err(RestError::Forbidden),
        Auth::Unauthorized => Err(RestError::Unauthorized),
    }
}

pub fn get_routes() -> Router<Arc<StoreNew>> {
    Router::new()
        .route(Route::Auction.as_ref(), get(get_auction))
        .route(Route::AuctionWs.as_ref(), get(ws::ws_route_handler))
}

impl From<entities::AuctionStatus> for AuctionStatus {
    fn from(status: entities::AuctionStatus) -> Self {
        match status {
            entities::AuctionStatus::Scheduled => AuctionStatus::Scheduled,
            entities::AuctionStatus::Started => AuctionStatus::Started,
            entities::AuctionStatus::Ended => AuctionStatus::Ended,
        }
    }
}

impl From<entities::Bid> for LastVote {
    fn from(bid: entities::Bid) -> Self {
        LastVote {
            user:  bid.bidder_id,
            price: entities::format_price(&bid.price),
        }
    }
}

impl From<entities::AuctionSnapshot> for AuctionSnapshot {
    fn from(snapshot: entities::AuctionSnapshot) -> Self {
        let entities::AuctionSnapshot { auction, last_bid } = snapshot;
        AuctionSnapshot {
            title:          auction.title,
            description:    auction.description,
            image:          auction.image,
            starting_price: entities::format_price(&auction.starting_price),
            status:         auction.status.into(),
            last_vote:      last_bid.map(LastVote::from),
        }
    }
}
