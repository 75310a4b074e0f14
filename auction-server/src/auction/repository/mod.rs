use {
    super::entities,
    axum_prometheus::metrics,
    std::collections::HashMap,
    tokio::sync::{
        Mutex,
        RwLock,
    },
};

mod add_bid;
mod add_notification_record;
mod get_auction;
mod get_auctions;
mod get_high_bid;
mod get_notified_users;
mod get_or_create_in_memory_auction_lock;
mod get_winning_bid;
#[cfg(test)]
mod in_memory_db;
mod models;
mod remove_in_memory_auction;
mod remove_in_memory_auction_lock;
mod set_auction_winner;
mod update_auction_status;

#[cfg(test)]
pub use in_memory_db::InMemoryDatabase;
pub use models::*;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    pub auction_lock: Mutex<HashMap<entities::AuctionId, entities::AuctionLock>>,
    /// Highest accepted bid per open auction. Never ahead of the database.
    pub high_bids:    RwLock<HashMap<entities::AuctionId, entities::Bid>>,
}

#[derive(Debug)]
pub struct Repository {
    pub in_memory_store: InMemoryStore,
    pub db:              Box<dyn Database>,
}

impl Repository {
    pub fn new(db: impl Database) -> Self {
        Self {
            in_memory_store: InMemoryStore::default(),
            db:              Box::new(db),
        }
    }

    pub(super) async fn update_metrics(&self) {
        let store = &self.in_memory_store;
        metrics::gauge!("in_memory_auction_locks").set(store.auction_lock.lock().await.len() as f64);
        metrics::gauge!("in_memory_high_bids").set(store.high_bids.read().await.len() as f64);
    }
}
