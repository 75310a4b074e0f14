use {
    crate::UserId,
    serde::{
        Deserialize,
        Serialize,
    },
    utoipa::{
        ToResponse,
        ToSchema,
    },
};

#[derive(Serialize, Deserialize, ToSchema, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Scheduled,
    Started,
    Ended,
}

/// The most recent accepted bid of an auction.
#[derive(Serialize, Deserialize, ToSchema, Clone, Debug, PartialEq)]
pub struct LastVote {
    /// The id of the user who placed the bid.
    #[schema(example = 42)]
    pub user:  UserId,
    /// The price of the bid as a decimal string.
    #[schema(example = "150.00")]
    pub price: String,
}

/// The state of an auction as pushed to every connected participant.
#[derive(Serialize, Deserialize, ToSchema, ToResponse, Clone, Debug, PartialEq)]
pub struct AuctionSnapshot {
    #[schema(example = "Vintage watch")]
    pub title:          String,
    #[schema(example = "A 1960s automatic watch in working condition.")]
    pub description:    String,
    #[schema(example = "https://cdn.example.com/auction_items/watch.png")]
    pub image:          Option<String>,
    /// The starting price of the auction as a decimal string.
    #[schema(example = "100.00")]
    pub starting_price: String,
    pub status:         AuctionStatus,
    pub last_vote:      Option<LastVote>,
}
