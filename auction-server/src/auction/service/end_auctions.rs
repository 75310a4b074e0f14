use {
    super::Service,
    crate::auction::{
        entities,
        repository::{
            AuctionTime,
            AuctionTimeRange,
        },
    },
    std::collections::HashSet,
    time::OffsetDateTime,
};

impl Service {
    /// Ends every started auction whose end time has passed and settles it: the winner is
    /// stored once and `ended` and `winner` notifications are sent to whoever did not get
    /// them yet. Auctions ended by an earlier sweep within the catch-up window are settled
    /// again to retry failed deliveries.
    #[tracing::instrument(skip_all)]
    pub async fn end_auctions(&self, now: OffsetDateTime) -> anyhow::Result<()> {
        let due = self
            .repo
            .get_auctions(AuctionTimeRange {
                status: entities::AuctionStatus::Started,
                time:   AuctionTime::End,
                from:   None,
                to:     now,
            })
            .await?;
        let mut ended = Vec::with_capacity(due.len());
        for auction in due {
            let auction_id = auction.id;
            match self
                .transition_auction(auction.clone(), entities::AuctionStatus::Ended)
                .await
            {
                Ok(true) => ended.push(entities::Auction {
                    status: entities::AuctionStatus::Ended,
                    ..auction
                }),
                Ok(false) => {}
                Err(err) => tracing::error!(error = ?err, auction_id, "Failed to end auction"),
            }
        }

        // Read after the status flips are durable, so no bid can be admitted anymore.
        let recent = self
            .repo
            .get_auctions(AuctionTimeRange {
                status: entities::AuctionStatus::Ended,
                time:   AuctionTime::End,
                from:   Some(now - self.config.lifecycle.catch_up_window),
                to:     now,
            })
            .await?;
        let ended_ids: HashSet<_> = ended.iter().map(|auction| auction.id).collect();
        let recent = recent
            .into_iter()
            .filter(|auction| !ended_ids.contains(&auction.id));
        for auction in ended.into_iter().chain(recent) {
            if let Err(err) = self.settle_auction(&auction).await {
                tracing::error!(error = ?err, auction_id = auction.id, "Failed to settle ended auction");
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(auction_id = auction.id, winner_bid_id))]
    async fn settle_auction(&self, auction: &entities::Auction) -> anyhow::Result<()> {
        self.notify_participants(auction, entities::NotificationKind::Ended)
            .await?;

        let Some(winning_bid) = self.repo.get_winning_bid(auction.id).await? else {
            return Ok(());
        };
        tracing::Span::current().record("winner_bid_id", winning_bid.id);
        match auction.winner_bid_id {
            None => {
                if self
                    .repo
                    .set_auction_winner(auction.id, winning_bid.id)
                    .await?
                {
                    tracing::info!(
                        winner = winning_bid.bidder_id,
                        price = %entities::format_price(&winning_bid.price),
                        "Auction winner recorded"
                    );
                }
            }
            Some(winner_bid_id) if winner_bid_id != winning_bid.id => {
                tracing::warn!(winner_bid_id, "Recorded winner differs from the highest bid");
            }
            Some(_) => {}
        }

        self.notify_users(
            auction,
            [winning_bid.bidder_id],
            entities::NotificationKind::Winner,
            entities::NotificationContext::Winner {
                price: winning_bid.price,
            },
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            auction::service::{
                submit_bid::{
                    BidRejection,
                    SubmitBidInput,
                },
                tests::{
                    auction,
                    price,
                },
            },
            kernel::notifier::MockNotificationDispatcher,
        },
        std::sync::{
            Arc,
            Mutex,
        },
        time::Duration,
    };

    fn recording_notifier() -> (
        MockNotificationDispatcher,
        Arc<Mutex<Vec<entities::Notification>>>,
    ) {
        let notified = Arc::new(Mutex::new(vec![]));
        let mut notifier = MockNotificationDispatcher::new();
        notifier.expect_dispatch().returning({
            let notified = notified.clone();
            move |notification| {
                notified.lock().unwrap().push(notification);
                Ok(())
            }
        });
        (notifier, notified)
    }

    #[tokio::test]
    async fn test_end_sweep_records_winner_once() {
        let (notifier, notified) = recording_notifier();
        let (service, db) = Service::new_in_memory(notifier);
        let now = OffsetDateTime::now_utc();
        let mut ending = auction(
            1,
            entities::AuctionStatus::Started,
            now - Duration::hours(1),
            now - Duration::seconds(1),
            &[1, 2, 3],
        );
        ending.starting_price = price("50");
        db.insert_auction(ending);
        for (bidder_id, bid_price) in [(1, "100"), (2, "150"), (3, "300")] {
            db.insert_bid(entities::BidCreate {
                auction_id:    1,
                bidder_id,
                price:         price(bid_price),
                creation_time: now - Duration::minutes(30),
            });
        }

        service.end_auctions(now).await.unwrap();

        let ended = db.auction(1).unwrap();
        assert_eq!(ended.status, entities::AuctionStatus::Ended);
        let winning_bid = db
            .bids(1)
            .into_iter()
            .find(|bid| bid.bidder_id == 3)
            .unwrap();
        assert_eq!(ended.winner_bid_id, Some(winning_bid.id));
        {
            let notified = notified.lock().unwrap();
            assert_eq!(notified.len(), 4);
            let winners: Vec<_> = notified
                .iter()
                .filter(|notification| notification.kind == entities::NotificationKind::Winner)
                .collect();
            assert_eq!(winners.len(), 1);
            assert_eq!(winners[0].user_id, 3);
            assert_eq!(
                winners[0].context,
                entities::NotificationContext::Winner {
                    price: price("300"),
                }
            );
        }

        service.end_auctions(now).await.unwrap();
        service
            .end_auctions(now + Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(db.auction(1).unwrap().winner_bid_id, Some(winning_bid.id));
        assert_eq!(notified.lock().unwrap().len(), 4);
        assert_eq!(db.records().len(), 4);
    }

    #[tokio::test]
    async fn test_late_end_sweep_still_settles() {
        let (notifier, notified) = recording_notifier();
        let (service, db) = Service::new_in_memory(notifier);
        let now = OffsetDateTime::now_utc();
        db.insert_auction(auction(
            1,
            entities::AuctionStatus::Started,
            now - Duration::hours(2),
            now - Duration::minutes(20),
            &[1, 2],
        ));
        let bid = db.insert_bid(entities::BidCreate {
            auction_id:    1,
            bidder_id:     2,
            price:         price("300"),
            creation_time: now - Duration::minutes(30),
        });

        service.end_auctions(now).await.unwrap();

        let ended = db.auction(1).unwrap();
        assert_eq!(ended.status, entities::AuctionStatus::Ended);
        assert_eq!(ended.winner_bid_id, Some(bid.id));
        let mut kinds: Vec<_> = notified
            .lock()
            .unwrap()
            .iter()
            .map(|notification| (notification.user_id, notification.kind))
            .collect();
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                (1, entities::NotificationKind::Ended),
                (2, entities::NotificationKind::Ended),
                (2, entities::NotificationKind::Winner),
            ]
        );
        assert_eq!(db.records().len(), 3);
    }

    #[tokio::test]
    async fn test_bid_after_end_is_not_open() {
        let (notifier, _) = recording_notifier();
        let (service, db) = Service::new_in_memory(notifier);
        let now = OffsetDateTime::now_utc();
        db.insert_auction(auction(
            1,
            entities::AuctionStatus::Started,
            now - Duration::hours(1),
            now - Duration::seconds(1),
            &[1],
        ));
        service.end_auctions(now).await.unwrap();
        assert_eq!(
            service
                .submit_bid(SubmitBidInput {
                    auction_id: 1,
                    bidder_id:  1,
                    price:      "1000".to_string(),
                })
                .await,
            Err(BidRejection::NotOpen)
        );
    }

    #[tokio::test]
    async fn test_auction_without_bids_has_no_winner() {
        let (notifier, notified) = recording_notifier();
        let (service, db) = Service::new_in_memory(notifier);
        let now = OffsetDateTime::now_utc();
        db.insert_auction(auction(
            1,
            entities::AuctionStatus::Started,
            now - Duration::hours(1),
            now - Duration::seconds(1),
            &[1, 2],
        ));
        service.end_auctions(now).await.unwrap();
        assert_eq!(db.auction(1).unwrap().winner_bid_id, None);
        assert!(notified
            .lock()
            .unwrap()
            .iter()
            .all(|notification| notification.kind == entities::NotificationKind::Ended));
        assert_eq!(notified.lock().unwrap().len(), 2);
    }
}
