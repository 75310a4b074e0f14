use {
    super::Repository,
    crate::auction::entities,
};

impl Repository {
    pub async fn set_auction_winner(
        &self,
        auction_id: entities::AuctionId,
        bid_id: entities::BidId,
    ) -> anyhow::Result<bool> {
        self.db.set_auction_winner(auction_id, bid_id).await
    }
}
