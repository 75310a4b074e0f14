use {
    super::Repository,
    crate::auction::entities,
};

impl Repository {
    /// Moves the auction one step forward. Returns false if another writer already did.
    #[tracing::instrument(skip_all, fields(auction_id, status))]
    pub async fn update_auction_status(
        &self,
        auction: &entities::Auction,
        status: entities::AuctionStatus,
    ) -> anyhow::Result<bool> {
        tracing::Span::current().record("auction_id", auction.id);
        tracing::Span::current().record("status", format!("{:?}", status));
        if !auction.status.can_transition_to(status) {
            return Err(anyhow::anyhow!(
                "Auction {} cannot move from {:?} to {:?}",
                auction.id,
                auction.status,
                status
            ));
        }
        let updated = self
            .db
            .update_auction_status(auction.id, auction.status, status)
            .await?;
        if updated && status == entities::AuctionStatus::Ended {
            self.remove_in_memory_auction(auction.id).await;
        }
        Ok(updated)
    }
}
