use {
    super::Repository,
    crate::auction::entities,
};

impl Repository {
    /// Stores the bid if the auction is still open and the price is still the highest.
    /// Returns None when either condition failed at commit time.
    #[tracing::instrument(skip_all, fields(auction_id, bid_id))]
    pub async fn add_bid(
        &self,
        bid: entities::BidCreate,
    ) -> anyhow::Result<Option<entities::Bid>> {
        tracing::Span::current().record("auction_id", bid.auction_id);
        let bid = self.db.add_bid(&bid).await?;
        if let Some(bid) = &bid {
            tracing::Span::current().record("bid_id", bid.id);
            self.cache_high_bid(bid.clone()).await;
        }
        Ok(bid)
    }
}
