use {
    super::Repository,
    crate::auction::entities,
    std::sync::Arc,
};

impl Repository {
    pub async fn remove_in_memory_auction_lock(&self, auction_id: entities::AuctionId) {
        let mut mutex_guard = self.in_memory_store.auction_lock.lock().await;
        if let Some(auction_lock) = mutex_guard.get(&auction_id) {
            // Only the map holds the lock, nobody is waiting on it.
            if Arc::strong_count(auction_lock) == 1 {
                mutex_guard.remove(&auction_id);
            }
        }
    }
}
