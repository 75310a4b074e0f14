use {
    super::{
        AuctionTimeRange,
        Database,
    },
    crate::{
        auction::entities,
        kernel::entities::UserId,
    },
    axum::async_trait,
    std::{
        collections::BTreeMap,
        sync::{
            Arc,
            Mutex,
        },
    },
};

#[derive(Debug, Default)]
struct State {
    auctions:    BTreeMap<entities::AuctionId, entities::Auction>,
    bids:        Vec<entities::Bid>,
    records:     Vec<entities::NotificationRecord>,
    next_bid_id: entities::BidId,
}

/// A database kept in memory with the same conditional write semantics as the Postgres one.
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    state: Mutex<State>,
}

impl InMemoryDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_auction(&self, auction: entities::Auction) {
        self.state
            .lock()
            .unwrap()
            .auctions
            .insert(auction.id, auction);
    }

    pub fn insert_bid(&self, bid: entities::BidCreate) -> entities::Bid {
        let mut state = self.state.lock().unwrap();
        state.next_bid_id += 1;
        let bid = entities::Bid {
            id:            state.next_bid_id,
            auction_id:    bid.auction_id,
            bidder_id:     bid.bidder_id,
            price:         bid.price,
            creation_time: bid.creation_time,
        };
        state.bids.push(bid.clone());
        bid
    }

    pub fn auction(&self, auction_id: entities::AuctionId) -> Option<entities::Auction> {
        self.state
            .lock()
            .unwrap()
            .auctions
            .get(&auction_id)
            .cloned()
    }

    pub fn bids(&self, auction_id: entities::AuctionId) -> Vec<entities::Bid> {
        self.state
            .lock()
            .unwrap()
            .bids
            .iter()
            .filter(|bid| bid.auction_id == auction_id)
            .cloned()
            .collect()
    }

    pub fn records(&self) -> Vec<entities::NotificationRecord> {
        self.state.lock().unwrap().records.clone()
    }
}

fn high_bid(state: &State, auction_id: entities::AuctionId) -> Option<&entities::Bid> {
    state
        .bids
        .iter()
        .filter(|bid| bid.auction_id == auction_id)
        .max_by(|a, b| a.price.cmp(&b.price).then(a.id.cmp(&b.id)))
}

#[async_trait]
impl Database for Arc<InMemoryDatabase> {
    async fn get_auction(
        &self,
        auction_id: entities::AuctionId,
    ) -> anyhow::Result<Option<entities::Auction>> {
        Ok(self.auction(auction_id))
    }

    async fn get_auctions(
        &self,
        range: AuctionTimeRange,
    ) -> anyhow::Result<Vec<entities::Auction>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .auctions
            .values()
            .filter(|auction| range.contains(auction))
            .cloned()
            .collect())
    }

    async fn get_high_bid(
        &self,
        auction_id: entities::AuctionId,
    ) -> anyhow::Result<Option<entities::Bid>> {
        Ok(high_bid(&self.state.lock().unwrap(), auction_id).cloned())
    }

    async fn add_bid(&self, bid: &entities::BidCreate) -> anyhow::Result<Option<entities::Bid>> {
        let mut state = self.state.lock().unwrap();
        let Some(auction) = state.auctions.get(&bid.auction_id) else {
            return Ok(None);
        };
        if auction.status != entities::AuctionStatus::Started {
            return Ok(None);
        }
        let minimum = auction
            .minimum_bid_price(high_bid(&state, bid.auction_id))
            .clone();
        if bid.price <= minimum {
            return Ok(None);
        }
        state.next_bid_id += 1;
        let bid = entities::Bid {
            id:            state.next_bid_id,
            auction_id:    bid.auction_id,
            bidder_id:     bid.bidder_id,
            price:         bid.price.clone(),
            creation_time: bid.creation_time,
        };
        state.bids.push(bid.clone());
        Ok(Some(bid))
    }

    async fn update_auction_status(
        &self,
        auction_id: entities::AuctionId,
        from: entities::AuctionStatus,
        to: entities::AuctionStatus,
    ) -> anyhow::Result<bool> {
        let mut state = self.state.lock().unwrap();
        match state.auctions.get_mut(&auction_id) {
            Some(auction) if auction.status == from => {
                auction.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_winning_bid(
        &self,
        auction_id: entities::AuctionId,
    ) -> anyhow::Result<Option<entities::Bid>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .bids
            .iter()
            .filter(|bid| bid.auction_id == auction_id)
            .min_by(|a, b| {
                b.price
                    .cmp(&a.price)
                    .then(a.creation_time.cmp(&b.creation_time))
                    .then(a.id.cmp(&b.id))
            })
            .cloned())
    }

    async fn set_auction_winner(
        &self,
        auction_id: entities::AuctionId,
        bid_id: entities::BidId,
    ) -> anyhow::Result<bool> {
        let mut state = self.state.lock().unwrap();
        match state.auctions.get_mut(&auction_id) {
            Some(auction) if auction.winner_bid_id.is_none() => {
                auction.winner_bid_id = Some(bid_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn add_notification_record(
        &self,
        record: &entities::NotificationRecord,
    ) -> anyhow::Result<bool> {
        if !record.kind.is_deduplicated() {
            return Err(anyhow::anyhow!("{:?} is not a ledger kind", record.kind));
        }
        let mut state = self.state.lock().unwrap();
        let exists = state.records.iter().any(|existing| {
            existing.auction_id == record.auction_id
                && existing.user_id == record.user_id
                && existing.kind == record.kind
        });
        if exists {
            return Ok(false);
        }
        state.records.push(record.clone());
        Ok(true)
    }

    async fn get_notified_users(
        &self,
        auction_id: entities::AuctionId,
        kind: entities::NotificationKind,
    ) -> anyhow::Result<Vec<UserId>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|record| record.auction_id == auction_id && record.kind == kind)
            .map(|record| record.user_id)
            .collect())
    }
}
