use {
    super::bid::{
        Bid,
        BidId,
    },
    crate::kernel::entities::UserId,
    sqlx::types::BigDecimal,
    std::{
        collections::HashSet,
        sync::Arc,
    },
    time::OffsetDateTime,
    tokio::sync::Mutex,
};

pub type AuctionId = i64;
pub type AuctionLock = Arc<Mutex<()>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuctionStatus {
    Scheduled,
    Started,
    Ended,
}

impl AuctionStatus {
    /// The only status an auction in this status may move to.
    pub fn next(&self) -> Option<AuctionStatus> {
        match self {
            AuctionStatus::Scheduled => Some(AuctionStatus::Started),
            AuctionStatus::Started => Some(AuctionStatus::Ended),
            AuctionStatus::Ended => None,
        }
    }

    pub fn can_transition_to(&self, status: AuctionStatus) -> bool {
        self.next() == Some(status)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Auction {
    pub id:             AuctionId,
    pub title:          String,
    pub description:    String,
    pub image:          Option<String>,
    pub starting_price: BigDecimal,
    pub start_time:     OffsetDateTime,
    pub end_time:       OffsetDateTime,
    pub status:         AuctionStatus,
    pub participants:   HashSet<UserId>,
    pub winner_bid_id:  Option<i64>,
}

impl Auction {
    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }

    /// The price a new bid has to exceed.
    pub fn minimum_bid_price<'a>(&'a self, high_bid: Option<&'a Bid>) -> &'a BigDecimal {
        match high_bid {
            Some(bid) if bid.price > self.starting_price => &bid.price,
            _ => &self.starting_price,
        }
    }
}

/// The state broadcast to the sessions of an auction after every change.
#[derive(Clone, Debug, PartialEq)]
pub struct AuctionSnapshot {
    pub auction:  Auction,
    pub last_bid: Option<Bid>,
}

impl AuctionSnapshot {
    /// Snapshots of one auction never go back in version: statuses only move forward and a
    /// new high bid always gets a larger id.
    pub fn version(&self) -> (AuctionStatus, Option<BidId>) {
        (self.auction.status, self.last_bid.as_ref().map(|bid| bid.id))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::str::FromStr,
    };

    #[test]
    fn test_status_only_moves_forward_one_step() {
        assert!(AuctionStatus::Scheduled.can_transition_to(AuctionStatus::Started));
        assert!(AuctionStatus::Started.can_transition_to(AuctionStatus::Ended));
        assert!(!AuctionStatus::Scheduled.can_transition_to(AuctionStatus::Ended));
        assert!(!AuctionStatus::Ended.can_transition_to(AuctionStatus::Started));
        assert!(!AuctionStatus::Started.can_transition_to(AuctionStatus::Scheduled));
        assert_eq!(AuctionStatus::Ended.next(), None);
    }

    #[test]
    fn test_snapshot_version_grows_with_status_and_bids() {
        let now = OffsetDateTime::now_utc();
        let auction = Auction {
            id:             1,
            title:          "Watch".to_string(),
            description:    String::new(),
            image:          None,
            starting_price: BigDecimal::from_str("100.00").unwrap(),
            start_time:     now,
            end_time:       now,
            status:         AuctionStatus::Started,
            participants:   HashSet::new(),
            winner_bid_id:  None,
        };
        let bid = |id| Bid {
            id,
            auction_id: 1,
            bidder_id: 1,
            price: BigDecimal::from_str("150.00").unwrap(),
            creation_time: now,
        };
        let empty = AuctionSnapshot {
            auction:  auction.clone(),
            last_bid: None,
        };
        let first = AuctionSnapshot {
            auction:  auction.clone(),
            last_bid: Some(bid(1)),
        };
        let second = AuctionSnapshot {
            auction:  auction.clone(),
            last_bid: Some(bid(2)),
        };
        let ended = AuctionSnapshot {
            auction:  Auction {
                status: AuctionStatus::Ended,
                ..auction
            },
            last_bid: Some(bid(2)),
        };
        assert!(empty.version() < first.version());
        assert!(first.version() < second.version());
        assert!(second.version() < ended.version());
    }

    #[test]
    fn test_minimum_bid_price() {
        let now = OffsetDateTime::now_utc();
        let auction = Auction {
            id:             1,
            title:          "Watch".to_string(),
            description:    String::new(),
            image:          None,
            starting_price: BigDecimal::from_str("100.00").unwrap(),
            start_time:     now,
            end_time:       now,
            status:         AuctionStatus::Started,
            participants:   HashSet::new(),
            winner_bid_id:  None,
        };
        assert_eq!(
            auction.minimum_bid_price(None),
            &BigDecimal::from_str("100").unwrap()
        );
        let bid = Bid {
            id:            1,
            auction_id:    1,
            bidder_id:     1,
            price:         BigDecimal::from_str("150.00").unwrap(),
            creation_time: now,
        };
        assert_eq!(
            auction.minimum_bid_price(Some(&bid)),
            &BigDecimal::from_str("150").unwrap()
        );
    }
}
