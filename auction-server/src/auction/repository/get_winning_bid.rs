use {
    super::Repository,
    crate::auction::entities,
};

impl Repository {
    /// Highest price wins. Ties go to the earliest bid.
    pub async fn get_winning_bid(
        &self,
        auction_id: entities::AuctionId,
    ) -> anyhow::Result<Option<entities::Bid>> {
        self.db.get_winning_bid(auction_id).await
    }
}
