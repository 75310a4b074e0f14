use {
    super::{
        notify::NotifyInput,
        Service,
    },
    crate::{
        auction::entities,
        kernel::entities::UserId,
    },
    axum_prometheus::metrics,
    sqlx::types::BigDecimal,
    time::OffsetDateTime,
};

pub struct SubmitBidInput {
    pub auction_id: entities::AuctionId,
    pub bidder_id:  UserId,
    /// The price exactly as the client sent it.
    pub price:      String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AcceptedBid {
    pub bid:      entities::Bid,
    pub snapshot: entities::AuctionSnapshot,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum BidRejection {
    #[error("Auction not found.")]
    NotFound,
    #[error("Auction is not open for bidding.")]
    NotOpen,
    #[error("You are not a participant of this auction.")]
    NotParticipant,
    #[error("Invalid price format.")]
    InvalidPrice,
    #[error("Bid must be higher than {}.", entities::format_price(.minimum))]
    PriceTooLow { minimum: BigDecimal },
    #[error("This service is temporarily unavailable.")]
    TemporarilyUnavailable,
}

impl BidRejection {
    fn as_label(&self) -> &'static str {
        match self {
            BidRejection::NotFound => "not_found",
            BidRejection::NotOpen => "not_open",
            BidRejection::NotParticipant => "not_participant",
            BidRejection::InvalidPrice => "invalid_price",
            BidRejection::PriceTooLow { .. } => "price_too_low",
            BidRejection::TemporarilyUnavailable => "temporarily_unavailable",
        }
    }
}

fn unavailable(auction_id: entities::AuctionId) -> impl FnOnce(anyhow::Error) -> BidRejection {
    move |err| {
        tracing::error!(error = ?err, auction_id, "Failed to access auction storage");
        BidRejection::TemporarilyUnavailable
    }
}

impl Service {
    /// Admits a bid if it strictly improves the auction's price. Bids of one auction are
    /// admitted one at a time, and the new snapshot is published before the next admission
    /// starts so every session sees prices in commit order.
    #[tracing::instrument(skip_all, fields(auction_id = input.auction_id, bidder_id = input.bidder_id, result))]
    pub async fn submit_bid(&self, input: SubmitBidInput) -> Result<AcceptedBid, BidRejection> {
        let auction_lock = self
            .repo
            .get_or_create_in_memory_auction_lock(input.auction_id)
            .await;
        let result = {
            let _guard = auction_lock.lock().await;
            self.admit_bid(&input).await
        };
        drop(auction_lock);
        self.repo
            .remove_in_memory_auction_lock(input.auction_id)
            .await;

        let label = match &result {
            Ok(_) => "accepted",
            Err(rejection) => rejection.as_label(),
        };
        tracing::Span::current().record("result", label);
        metrics::counter!("bids_total", &[("result", label)]).increment(1);

        let (accepted, displaced) = result?;
        if let Some(displaced) = displaced {
            if displaced.bidder_id != accepted.bid.bidder_id {
                self.task_tracker.spawn({
                    let service = self.clone();
                    let input = NotifyInput {
                        auction: accepted.snapshot.auction.clone(),
                        user_id: displaced.bidder_id,
                        kind:    entities::NotificationKind::Outbid,
                        context: entities::NotificationContext::Outbid {
                            previous_price: displaced.price,
                            new_price:      accepted.bid.price.clone(),
                        },
                    };
                    async move {
                        if let Err(err) = service.notify(input).await {
                            tracing::error!(error = ?err, "Failed to notify outbid bidder");
                        }
                    }
                });
            }
        }
        Ok(accepted)
    }

    /// Must be called while holding the auction lock. Returns the accepted bid and the bid
    /// it displaced.
    async fn admit_bid(
        &self,
        input: &SubmitBidInput,
    ) -> Result<(AcceptedBid, Option<entities::Bid>), BidRejection> {
        let auction_id = input.auction_id;
        let auction = self
            .repo
            .get_auction(auction_id)
            .await
            .map_err(unavailable(auction_id))?
            .ok_or(BidRejection::NotFound)?;
        if auction.status != entities::AuctionStatus::Started {
            return Err(BidRejection::NotOpen);
        }
        if !auction.is_participant(input.bidder_id) {
            return Err(BidRejection::NotParticipant);
        }
        let price = entities::parse_price(&input.price).ok_or(BidRejection::InvalidPrice)?;
        let high_bid = self
            .repo
            .get_high_bid(auction_id)
            .await
            .map_err(unavailable(auction_id))?;
        let minimum = auction.minimum_bid_price(high_bid.as_ref());
        if &price <= minimum {
            return Err(BidRejection::PriceTooLow {
                minimum: minimum.clone(),
            });
        }

        let bid = self
            .repo
            .add_bid(entities::BidCreate {
                auction_id,
                bidder_id: input.bidder_id,
                price,
                creation_time: OffsetDateTime::now_utc(),
            })
            .await
            .map_err(unavailable(auction_id))?;
        let Some(bid) = bid else {
            return Err(self.explain_rejected_write(auction_id).await);
        };

        let snapshot = entities::AuctionSnapshot {
            auction,
            last_bid: Some(bid.clone()),
        };
        self.publish_snapshot(snapshot.clone());
        Ok((AcceptedBid { bid, snapshot }, high_bid))
    }

    /// The store refused the write, so the auction changed since it was read.
    async fn explain_rejected_write(&self, auction_id: entities::AuctionId) -> BidRejection {
        let auction = match self.repo.get_auction(auction_id).await {
            Ok(Some(auction)) => auction,
            Ok(None) => return BidRejection::NotFound,
            Err(err) => return unavailable(auction_id)(err),
        };
        if auction.status != entities::AuctionStatus::Started {
            return BidRejection::NotOpen;
        }
        match self.repo.refresh_high_bid(auction_id).await {
            Ok(high_bid) => BidRejection::PriceTooLow {
                minimum: auction.minimum_bid_price(high_bid.as_ref()).clone(),
            },
            Err(err) => unavailable(auction_id)(err),
        }
    }
}
