use {
    serde::{
        Deserialize,
        Serialize,
    },
    strum::AsRefStr,
    utoipa::{
        ToResponse,
        ToSchema,
    },
};

pub mod auction;
pub mod ws;

pub type AuctionId = i64;
pub type UserId = i64;

#[derive(ToResponse, ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[response(description = "An error occurred processing the request")]
pub struct ErrorBodyResponse {
    pub error: String,
}

#[derive(AsRefStr, Clone, Copy, Debug)]
#[strum(prefix = "/")]
pub enum Route {
    #[strum(serialize = "v1")]
    V1,
    #[strum(serialize = "auctions/:auction_id")]
    Auction,
    #[strum(serialize = "auctions/:auction_id/ws")]
    AuctionWs,
    #[strum(serialize = "")]
    Root,
    #[strum(serialize = "live")]
    Liveness,
    #[strum(serialize = "docs")]
    Docs,
    #[strum(serialize = "docs/openapi.json")]
    OpenApi,
}

impl Route {
    /// Path of the route as mounted on the server, including the version prefix when needed.
    pub fn full_path(&self) -> String {
        match self {
            Route::Auction | Route::AuctionWs => {
                format!("{}{}", Route::V1.as_ref(), self.as_ref())
            }
            _ => self.as_ref().to_string(),
        }
    }
}
