use {
    super::Repository,
    crate::auction::entities,
};

impl Repository {
    /// Drops the cached high bid of an auction that no longer accepts bids.
    pub async fn remove_in_memory_auction(&self, auction_id: entities::AuctionId) {
        self.in_memory_store
            .high_bids
            .write()
            .await
            .remove(&auction_id);
    }
}
