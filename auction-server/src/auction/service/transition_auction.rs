use {
    super::Service,
    crate::auction::entities,
};

impl Service {
    /// Moves the auction to the given status and publishes the new snapshot. Holds the
    /// auction lock so no bid is admitted or published in between. Returns false if the
    /// auction had already moved.
    #[tracing::instrument(skip_all, fields(auction_id = auction.id, status = ?status))]
    pub async fn transition_auction(
        &self,
        auction: entities::Auction,
        status: entities::AuctionStatus,
    ) -> anyhow::Result<bool> {
        let auction_id = auction.id;
        let auction_lock = self
            .repo
            .get_or_create_in_memory_auction_lock(auction_id)
            .await;
        let result = {
            let _guard = auction_lock.lock().await;
            self.transition_auction_locked(auction, status).await
        };
        drop(auction_lock);
        self.repo.remove_in_memory_auction_lock(auction_id).await;
        result
    }

    async fn transition_auction_locked(
        &self,
        auction: entities::Auction,
        status: entities::AuctionStatus,
    ) -> anyhow::Result<bool> {
        let last_bid = self.repo.get_high_bid(auction.id).await?;
        if !self.repo.update_auction_status(&auction, status).await? {
            tracing::debug!("Auction status was already updated");
            return Ok(false);
        }
        tracing::info!("Auction status updated");
        self.publish_snapshot(entities::AuctionSnapshot {
            auction: entities::Auction { status, ..auction },
            last_bid,
        });
        Ok(true)
    }
}
