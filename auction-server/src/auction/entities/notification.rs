use {
    super::auction::{
        Auction,
        AuctionId,
    },
    crate::kernel::entities::UserId,
    sqlx::types::BigDecimal,
    time::OffsetDateTime,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NotificationKind {
    StartSoon,
    Started,
    EndsSoon,
    Ended,
    Winner,
    Outbid,
}

impl NotificationKind {
    /// Deduplicated kinds are delivered at most once per auction and user. Outbid
    /// notifications are sent for every displaced bidder and never recorded.
    pub fn is_deduplicated(&self) -> bool {
        !matches!(self, NotificationKind::Outbid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::StartSoon => "start_soon",
            NotificationKind::Started => "started",
            NotificationKind::EndsSoon => "ends_soon",
            NotificationKind::Ended => "ended",
            NotificationKind::Winner => "winner",
            NotificationKind::Outbid => "outbid",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NotificationRecord {
    pub auction_id: AuctionId,
    pub user_id:    UserId,
    pub kind:       NotificationKind,
    pub sent_at:    OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NotificationContext {
    None,
    Outbid {
        previous_price: BigDecimal,
        new_price:      BigDecimal,
    },
    Winner {
        price: BigDecimal,
    },
}

/// A message handed to the notification dispatcher.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub auction_id:    AuctionId,
    pub auction_title: String,
    pub start_time:    OffsetDateTime,
    pub end_time:      OffsetDateTime,
    pub user_id:       UserId,
    pub kind:          NotificationKind,
    pub context:       NotificationContext,
}

impl Notification {
    pub fn new(
        auction: &Auction,
        user_id: UserId,
        kind: NotificationKind,
        context: NotificationContext,
    ) -> Self {
        Self {
            auction_id: auction.id,
            auction_title: auction.title.clone(),
            start_time: auction.start_time,
            end_time: auction.end_time,
            user_id,
            kind,
            context,
        }
    }

    pub fn record(&self, sent_at: OffsetDateTime) -> NotificationRecord {
        NotificationRecord {
            auction_id: self.auction_id,
            user_id: self.user_id,
            kind: self.kind,
            sent_at,
        }
    }
}
