use {
    super::Repository,
    crate::auction::entities,
    std::collections::hash_map::Entry,
};

impl Repository {
    /// Reads the highest bid from memory and falls back to the database.
    pub async fn get_high_bid(
        &self,
        auction_id: entities::AuctionId,
    ) -> anyhow::Result<Option<entities::Bid>> {
        if let Some(bid) = self
            .in_memory_store
            .high_bids
            .read()
            .await
            .get(&auction_id)
        {
            return Ok(Some(bid.clone()));
        }
        self.refresh_high_bid(auction_id).await
    }

    /// Reads the highest bid from the database, bypassing the cached value.
    pub async fn refresh_high_bid(
        &self,
        auction_id: entities::AuctionId,
    ) -> anyhow::Result<Option<entities::Bid>> {
        let bid = self.db.get_high_bid(auction_id).await?;
        if let Some(bid) = &bid {
            self.cache_high_bid(bid.clone()).await;
        }
        Ok(bid)
    }

    /// Keeps the higher of the cached and the given bid. Prices only ever increase, so a
    /// stale read never replaces a newer bid.
    pub(super) async fn cache_high_bid(&self, bid: entities::Bid) {
        match self
            .in_memory_store
            .high_bids
            .write()
            .await
            .entry(bid.auction_id)
        {
            Entry::Occupied(mut entry) => {
                if entry.get().price < bid.price {
                    entry.insert(bid);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(bid);
            }
        }
    }
}
