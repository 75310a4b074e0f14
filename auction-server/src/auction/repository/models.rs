#[cfg(test)]
use mockall::automock;
use {
    super::entities,
    crate::kernel::{
        db::DB,
        entities::UserId,
    },
    axum::async_trait,
    sqlx::{
        types::BigDecimal,
        FromRow,
    },
    std::fmt::Debug,
    time::{
        OffsetDateTime,
        PrimitiveDateTime,
        UtcOffset,
    },
    tracing::instrument,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "auction_status", rename_all = "lowercase")]
pub enum AuctionStatus {
    Scheduled,
    Started,
    Ended,
}

impl From<AuctionStatus> for entities::AuctionStatus {
    fn from(status: AuctionStatus) -> Self {
        match status {
            AuctionStatus::Scheduled => entities::AuctionStatus::Scheduled,
            AuctionStatus::Started => entities::AuctionStatus::Started,
            AuctionStatus::Ended => entities::AuctionStatus::Ended,
        }
    }
}

impl From<entities::AuctionStatus> for AuctionStatus {
    fn from(status: entities::AuctionStatus) -> Self {
        match status {
            entities::AuctionStatus::Scheduled => AuctionStatus::Scheduled,
            entities::AuctionStatus::Started => AuctionStatus::Started,
            entities::AuctionStatus::Ended => AuctionStatus::Ended,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
pub enum NotificationKind {
    StartSoon,
    Started,
    EndsSoon,
    Ended,
    Winner,
}

impl TryFrom<entities::NotificationKind> for NotificationKind {
    type Error = anyhow::Error;

    fn try_from(kind: entities::NotificationKind) -> Result<Self, Self::Error> {
        match kind {
            entities::NotificationKind::StartSoon => Ok(NotificationKind::StartSoon),
            entities::NotificationKind::Started => Ok(NotificationKind::Started),
            entities::NotificationKind::EndsSoon => Ok(NotificationKind::EndsSoon),
            entities::NotificationKind::Ended => Ok(NotificationKind::Ended),
            entities::NotificationKind::Winner => Ok(NotificationKind::Winner),
            entities::NotificationKind::Outbid => Err(anyhow::anyhow!(
                "Outbid notifications are not recorded in the notification ledger"
            )),
        }
    }
}

#[derive(Clone, FromRow, Debug)]
pub struct Auction {
    pub id:             entities::AuctionId,
    pub title:          String,
    pub description:    String,
    pub image:          Option<String>,
    pub status:         AuctionStatus,
    pub start_time:     PrimitiveDateTime,
    pub end_time:       PrimitiveDateTime,
    pub starting_price: BigDecimal,
    pub winner_bid_id:  Option<entities::BidId>,
    pub participants:   Vec<UserId>,
}

impl From<Auction> for entities::Auction {
    fn from(auction: Auction) -> Self {
        Self {
            id:             auction.id,
            title:          auction.title,
            description:    auction.description,
            image:          auction.image,
            starting_price: auction.starting_price,
            start_time:     auction.start_time.assume_offset(UtcOffset::UTC),
            end_time:       auction.end_time.assume_offset(UtcOffset::UTC),
            status:         auction.status.into(),
            participants:   auction.participants.into_iter().collect(),
            winner_bid_id:  auction.winner_bid_id,
        }
    }
}

#[derive(Clone, FromRow, Debug)]
pub struct Bid {
    pub id:            entities::BidId,
    pub auction_id:    entities::AuctionId,
    pub user_id:       UserId,
    pub price:         BigDecimal,
    pub creation_time: PrimitiveDateTime,
}

impl From<Bid> for entities::Bid {
    fn from(bid: Bid) -> Self {
        Self {
            id:            bid.id,
            auction_id:    bid.auction_id,
            bidder_id:     bid.user_id,
            price:         bid.price,
            creation_time: bid.creation_time.assume_offset(UtcOffset::UTC),
        }
    }
}

/// Timestamps are stored as UTC without an offset.
pub fn to_primitive(time: OffsetDateTime) -> PrimitiveDateTime {
    let time = time.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(time.date(), time.time())
}

const AUCTION_SELECT: &str = "SELECT a.id, a.title, a.description, a.image, a.status, \
     a.start_time, a.end_time, a.starting_price, a.winner_bid_id, \
     COALESCE(ARRAY_AGG(p.user_id) FILTER (WHERE p.user_id IS NOT NULL), '{}'::BIGINT[]) AS participants \
     FROM auction a LEFT JOIN auction_participant p ON p.auction_id = a.id";

/// Which timestamp of an auction a time range applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuctionTime {
    Start,
    End,
}

impl AuctionTime {
    fn column(&self) -> &'static str {
        match self {
            AuctionTime::Start => "a.start_time",
            AuctionTime::End => "a.end_time",
        }
    }
}

/// Selects auctions in a status whose start or end time lies in `(from, to]`.
/// Without a lower bound every auction at or before `to` matches.
#[derive(Clone, Debug, PartialEq)]
pub struct AuctionTimeRange {
    pub status: entities::AuctionStatus,
    pub time:   AuctionTime,
    pub from:   Option<OffsetDateTime>,
    pub to:     OffsetDateTime,
}

impl AuctionTimeRange {
    pub fn contains(&self, auction: &entities::Auction) -> bool {
        let time = match self.time {
            AuctionTime::Start => auction.start_time,
            AuctionTime::End => auction.end_time,
        };
        auction.status == self.status
            && time <= self.to
            && self.from.map_or(true, |from| time > from)
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Database: Debug + Send + Sync + 'static {
    async fn get_auction(
        &self,
        auction_id: entities::AuctionId,
    ) -> anyhow::Result<Option<entities::Auction>>;
    async fn get_auctions(&self, range: AuctionTimeRange)
        -> anyhow::Result<Vec<entities::Auction>>;
    /// Highest accepted bid of the auction, which is also the most recent one.
    async fn get_high_bid(
        &self,
        auction_id: entities::AuctionId,
    ) -> anyhow::Result<Option<entities::Bid>>;
    /// Inserts the bid only if the auction is started and the price beats both the starting
    /// price and every stored bid. Returns None when the condition does not hold.
    async fn add_bid(&self, bid: &entities::BidCreate) -> anyhow::Result<Option<entities::Bid>>;
    /// Moves the auction from one status to another. Returns false if the auction was not in
    /// the expected status.
    async fn update_auction_status(
        &self,
        auction_id: entities::AuctionId,
        from: entities::AuctionStatus,
        to: entities::AuctionStatus,
    ) -> anyhow::Result<bool>;
    async fn get_winning_bid(
        &self,
        auction_id: entities::AuctionId,
    ) -> anyhow::Result<Option<entities::Bid>>;
    /// Returns false if a winner was already recorded.
    async fn set_auction_winner(
        &self,
        auction_id: entities::AuctionId,
        bid_id: entities::BidId,
    ) -> anyhow::Result<bool>;
    /// Returns false if a record with the same auction, user and kind already exists.
    async fn add_notification_record(
        &self,
        record: &entities::NotificationRecord,
    ) -> anyhow::Result<bool>;
    async fn get_notified_users(
        &self,
        auction_id: entities::AuctionId,
        kind: entities::NotificationKind,
    ) -> anyhow::Result<Vec<UserId>>;
}

#[async_trait]
impl Database for DB {
    #[instrument(
        target = "metrics",
        name = "db_get_auction",
        fields(
            category = "db_queries",
            result = "success",
            name = "get_auction"
        ),
        skip_all
    )]
    async fn get_auction(
        &self,
        auction_id: entities::AuctionId,
    ) -> anyhow::Result<Option<entities::Auction>> {
        let auction: Option<Auction> =
            sqlx::query_as(&format!("{} WHERE a.id = $1 GROUP BY a.id", AUCTION_SELECT))
                .bind(auction_id)
                .fetch_optional(self)
                .await
                .inspect_err(|_| {
                    tracing::Span::current().record("result", "error");
                })?;
        Ok(auction.map(Into::into))
    }

    #[instrument(
        target = "metrics",
        name = "db_get_auctions",
        fields(
            category = "db_queries",
            result = "success",
            name = "get_auctions"
        ),
        skip_all
    )]
    async fn get_auctions(
        &self,
        range: AuctionTimeRange,
    ) -> anyhow::Result<Vec<entities::Auction>> {
        let column = range.time.column();
        let query = format!(
            "{} WHERE a.status = $1 AND {column} <= $2 AND ($3::TIMESTAMP IS NULL OR {column} > $3) \
             GROUP BY a.id ORDER BY {column} ASC",
            AUCTION_SELECT
        );
        let auctions: Vec<Auction> = sqlx::query_as(&query)
            .bind(AuctionStatus::from(range.status))
            .bind(to_primitive(range.to))
            .bind(range.from.map(to_primitive))
            .fetch_all(self)
            .await
            .inspect_err(|_| {
                tracing::Span::current().record("result", "error");
            })?;
        Ok(auctions.into_iter().map(Into::into).collect())
    }

    #[instrument(
        target = "metrics",
        name = "db_get_high_bid",
        fields(
            category = "db_queries",
            result = "success",
            name = "get_high_bid"
        ),
        skip_all
    )]
    async fn get_high_bid(
        &self,
        auction_id: entities::AuctionId,
    ) -> anyhow::Result<Option<entities::Bid>> {
        let bid: Option<Bid> = sqlx::query_as(
            "SELECT * FROM bid WHERE auction_id = $1 ORDER BY price DESC, id DESC LIMIT 1",
        )
        .bind(auction_id)
        .fetch_optional(self)
        .await
        .inspect_err(|_| {
            tracing::Span::current().record("result", "error");
        })?;
        Ok(bid.map(Into::into))
    }

    #[instrument(
        target = "metrics",
        name = "db_add_bid",
        fields(
            category = "db_queries",
            result = "success",
            name = "add_bid"
        ),
        skip_all
    )]
    async fn add_bid(&self, bid: &entities::BidCreate) -> anyhow::Result<Option<entities::Bid>> {
        let result: anyhow::Result<Option<entities::Bid>> = async {
            let mut tx = self.begin().await?;
            // The row lock serializes this insert against status transitions of the auction.
            let auction: Option<(AuctionStatus, BigDecimal)> = sqlx::query_as(
                "SELECT status, starting_price FROM auction WHERE id = $1 FOR UPDATE",
            )
            .bind(bid.auction_id)
            .fetch_optional(&mut *tx)
            .await?;
            let Some((status, starting_price)) = auction else {
                return Ok(None);
            };
            if status != AuctionStatus::Started {
                return Ok(None);
            }
            let high_price: Option<BigDecimal> =
                sqlx::query_scalar("SELECT MAX(price) FROM bid WHERE auction_id = $1")
                    .bind(bid.auction_id)
                    .fetch_one(&mut *tx)
                    .await?;
            let minimum = match high_price {
                Some(high_price) if high_price > starting_price => high_price,
                _ => starting_price,
            };
            if bid.price <= minimum {
                return Ok(None);
            }
            let row: Bid = sqlx::query_as(
                "INSERT INTO bid (auction_id, user_id, price, creation_time) VALUES ($1, $2, $3, $4) RETURNING *",
            )
            .bind(bid.auction_id)
            .bind(bid.bidder_id)
            .bind(&bid.price)
            .bind(to_primitive(bid.creation_time))
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(Some(row.into()))
        }
        .await;
        result.inspect_err(|_| {
            tracing::Span::current().record("result", "error");
        })
    }

    #[instrument(
        target = "metrics",
        name = "db_update_auction_status",
        fields(
            category = "db_queries",
            result = "success",
            name = "update_auction_status"
        ),
        skip_all
    )]
    async fn update_auction_status(
        &self,
        auction_id: entities::AuctionId,
        from: entities::AuctionStatus,
        to: entities::AuctionStatus,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE auction SET status = $1 WHERE id = $2 AND status = $3")
            .bind(AuctionStatus::from(to))
            .bind(auction_id)
            .bind(AuctionStatus::from(from))
            .execute(self)
            .await
            .inspect_err(|_| {
                tracing::Span::current().record("result", "error");
            })?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(
        target = "metrics",
        name = "db_get_winning_bid",
        fields(
            category = "db_queries",
            result = "success",
            name = "get_winning_bid"
        ),
        skip_all
    )]
    async fn get_winning_bid(
        &self,
        auction_id: entities::AuctionId,
    ) -> anyhow::Result<Option<entities::Bid>> {
        let bid: Option<Bid> = sqlx::query_as(
            "SELECT * FROM bid WHERE auction_id = $1 ORDER BY price DESC, creation_time ASC, id ASC LIMIT 1",
        )
        .bind(auction_id)
        .fetch_optional(self)
        .await
        .inspect_err(|_| {
            tracing::Span::current().record("result", "error");
        })?;
        Ok(bid.map(Into::into))
    }

    #[instrument(
        target = "metrics",
        name = "db_set_auction_winner",
        fields(
            category = "db_queries",
            result = "success",
            name = "set_auction_winner"
        ),
        skip_all
    )]
    async fn set_auction_winner(
        &self,
        auction_id: entities::AuctionId,
        bid_id: entities::BidId,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE auction SET winner_bid_id = $1 WHERE id = $2 AND winner_bid_id IS NULL",
        )
        .bind(bid_id)
        .bind(auction_id)
        .execute(self)
        .await
        .inspect_err(|_| {
            tracing::Span::current().record("result", "error");
        })?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(
        target = "metrics",
        name = "db_add_notification_record",
        fields(
            category = "db_queries",
            result = "success",
            name = "add_notification_record"
        ),
        skip_all
    )]
    async fn add_notification_record(
        &self,
        record: &entities::NotificationRecord,
    ) -> anyhow::Result<bool> {
        let kind = NotificationKind::try_from(record.kind)?;
        let result = sqlx::query(
            "INSERT INTO notification_record (auction_id, user_id, kind, sent_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (auction_id, user_id, kind) DO NOTHING",
        )
        .bind(record.auction_id)
        .bind(record.user_id)
        .bind(kind)
        .bind(to_primitive(record.sent_at))
        .execute(self)
        .await
        .inspect_err(|_| {
            tracing::Span::current().record("result", "error");
        })?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(
        target = "metrics",
        name = "db_get_notified_users",
        fields(
            category = "db_queries",
            result = "success",
            name = "get_notified_users"
        ),
        skip_all
    )]
    async fn get_notified_users(
        &self,
        auction_id: entities::AuctionId,
        kind: entities::NotificationKind,
    ) -> anyhow::Result<Vec<UserId>> {
        let kind = NotificationKind::try_from(kind)?;
        let users = sqlx::query_scalar(
            "SELECT user_id FROM notification_record WHERE auction_id = $1 AND kind = $2",
        )
        .bind(auction_id)
        .bind(kind)
        .fetch_all(self)
        .await
        .inspect_err(|_| {
            tracing::Span::current().record("result", "error");
        })?;
        Ok(users)
    }
}
