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
    /// Starts every scheduled auction whose start time has passed and sends the `started`
    /// notification to its participants. Auctions started by an earlier sweep within the
    /// catch-up window are notified again, reaching only participants not yet recorded.
    #[tracing::instrument(skip_all)]
    pub async fn start_auctions(&self, now: OffsetDateTime) -> anyhow::Result<()> {
        let due = self
            .repo
            .get_auctions(AuctionTimeRange {
                status: entities::AuctionStatus::Scheduled,
                time:   AuctionTime::Start,
                from:   None,
                to:     now,
            })
            .await?;
        let mut started = Vec::with_capacity(due.len());
        for auction in due {
            let auction_id = auction.id;
            match self
                .transition_auction(auction.clone(), entities::AuctionStatus::Started)
                .await
            {
                Ok(true) => started.push(entities::Auction {
                    status: entities::AuctionStatus::Started,
                    ..auction
                }),
                Ok(false) => {}
                Err(err) => tracing::error!(error = ?err, auction_id, "Failed to start auction"),
            }
        }

        let recent = self
            .repo
            .get_auctions(AuctionTimeRange {
                status: entities::AuctionStatus::Started,
                time:   AuctionTime::Start,
                from:   Some(now - self.config.lifecycle.catch_up_window),
                to:     now,
            })
            .await?;
        let started_ids: HashSet<_> = started.iter().map(|auction| auction.id).collect();
        let recent = recent
            .into_iter()
            .filter(|auction| !started_ids.contains(&auction.id));
        for auction in started.into_iter().chain(recent) {
            if let Err(err) = self
                .notify_participants(&auction, entities::NotificationKind::Started)
                .await
            {
                tracing::error!(
                    error = ?err,
                    auction_id = auction.id,
                    "Failed to notify participants of started auction"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            api::ws::UpdateEvent,
            auction::{
                repository::MockDatabase,
                service::tests::auction,
            },
            kernel::notifier::MockNotificationDispatcher,
        },
        std::sync::{
            Arc,
            Mutex,
        },
        time::Duration,
    };

    #[tokio::test]
    async fn test_start_sweep_is_idempotent() {
        let notified = Arc::new(Mutex::new(vec![]));
        let mut notifier = MockNotificationDispatcher::new();
        notifier.expect_dispatch().returning({
            let notified = notified.clone();
            move |notification| {
                notified
                    .lock()
                    .unwrap()
                    .push((notification.user_id, notification.kind));
                Ok(())
            }
        });
        let (service, db) = Service::new_in_memory(notifier);
        let now = OffsetDateTime::now_utc();
        db.insert_auction(auction(
            1,
            entities::AuctionStatus::Scheduled,
            now - Duration::seconds(1),
            now + Duration::hours(1),
            &[10, 20],
        ));
        let mut updates = service.subscribe(1, 1);

        service.start_auctions(now).await.unwrap();
        service.start_auctions(now).await.unwrap();

        assert_eq!(
            db.auction(1).unwrap().status,
            entities::AuctionStatus::Started
        );
        let mut notified = notified.lock().unwrap().clone();
        notified.sort();
        assert_eq!(
            notified,
            vec![
                (10, entities::NotificationKind::Started),
                (20, entities::NotificationKind::Started),
            ]
        );
        let UpdateEvent::AuctionUpdate(snapshot) = updates.recv().await.unwrap();
        assert_eq!(snapshot.auction.status, entities::AuctionStatus::Started);
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_late_start_sweep_still_notifies() {
        let mut notifier = MockNotificationDispatcher::new();
        notifier
            .expect_dispatch()
            .withf(|notification| {
                notification.user_id == 10
                    && notification.kind == entities::NotificationKind::Started
            })
            .times(1)
            .returning(|_| Ok(()));
        let (service, db) = Service::new_in_memory(notifier);
        let now = OffsetDateTime::now_utc();
        db.insert_auction(auction(
            1,
            entities::AuctionStatus::Scheduled,
            now - Duration::minutes(20),
            now + Duration::hours(1),
            &[10],
        ));

        service.start_auctions(now).await.unwrap();
        service.start_auctions(now).await.unwrap();

        assert_eq!(
            db.auction(1).unwrap().status,
            entities::AuctionStatus::Started
        );
        assert_eq!(db.records().len(), 1);
    }

    #[tokio::test]
    async fn test_future_auctions_are_not_started() {
        let (service, db) = Service::new_in_memory(MockNotificationDispatcher::new());
        let now = OffsetDateTime::now_utc();
        db.insert_auction(auction(
            1,
            entities::AuctionStatus::Scheduled,
            now + Duration::seconds(5),
            now + Duration::hours(1),
            &[10],
        ));
        service.start_auctions(now).await.unwrap();
        assert_eq!(
            db.auction(1).unwrap().status,
            entities::AuctionStatus::Scheduled
        );
    }

    #[tokio::test]
    async fn test_started_notification_is_retried_on_next_sweep() {
        let mut notifier = MockNotificationDispatcher::new();
        notifier.expect_dispatch().times(1).returning(|_| Ok(()));
        let (service, db) = Service::new_in_memory(notifier);
        let now = OffsetDateTime::now_utc();
        // Started by an earlier sweep that failed before recording notifications.
        db.insert_auction(auction(
            1,
            entities::AuctionStatus::Started,
            now - Duration::minutes(3),
            now + Duration::hours(1),
            &[10],
        ));
        // Outside the catch-up window.
        db.insert_auction(auction(
            2,
            entities::AuctionStatus::Started,
            now - Duration::hours(3),
            now + Duration::hours(1),
            &[10],
        ));
        service.start_auctions(now).await.unwrap();
        assert_eq!(db.records().len(), 1);
        assert_eq!(db.records()[0].auction_id, 1);
    }

    #[tokio::test]
    async fn test_selection_failure_aborts_sweep() {
        let mut db = MockDatabase::default();
        db.expect_get_auctions()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("connection refused")));
        let service = Service::new_with_mocks(db, MockNotificationDispatcher::new());
        assert!(service
            .start_auctions(OffsetDateTime::now_utc())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_failure_on_one_auction_does_not_stop_others() {
        let now = OffsetDateTime::now_utc();
        let mut db = MockDatabase::default();
        db.expect_get_auctions().returning(move |range| {
            if range.status != entities::AuctionStatus::Scheduled {
                return Ok(vec![]);
            }
            Ok(vec![
                auction(
                    1,
                    entities::AuctionStatus::Scheduled,
                    now - Duration::seconds(1),
                    now + Duration::hours(1),
                    &[],
                ),
                auction(
                    2,
                    entities::AuctionStatus::Scheduled,
                    now - Duration::seconds(1),
                    now + Duration::hours(1),
                    &[],
                ),
            ])
        });
        db.expect_get_high_bid().returning(|_| Ok(None));
        db.expect_get_notified_users()
            .times(1)
            .returning(|auction_id, _| {
                assert_eq!(auction_id, 2);
                Ok(vec![])
            });
        db.expect_update_auction_status()
            .times(2)
            .returning(|auction_id, _, _| {
                if auction_id == 1 {
                    Err(anyhow::anyhow!("deadlock detected"))
                } else {
                    Ok(true)
                }
            });
        let service = Service::new_with_mocks(db, MockNotificationDispatcher::new());
        let mut updates = service.subscribe(2, 1);
        service.start_auctions(now).await.unwrap();
        let UpdateEvent::AuctionUpdate(snapshot) = updates.recv().await.unwrap();
        assert_eq!(snapshot.auction.id, 2);
    }
}
