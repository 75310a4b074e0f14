use {
    super::Service,
    crate::auction::{
        entities,
        repository::{
            AuctionTime,
            AuctionTimeRange,
        },
    },
    std::time::Duration,
    time::OffsetDateTime,
};

impl Service {
    /// Sends `start_soon` to participants of scheduled auctions starting around the
    /// configured lead time from now.
    #[tracing::instrument(skip_all)]
    pub async fn notify_starting_soon(&self, now: OffsetDateTime) -> anyhow::Result<()> {
        self.notify_upcoming(
            now,
            entities::AuctionStatus::Scheduled,
            AuctionTime::Start,
            self.config.lifecycle.start_soon_lead,
            entities::NotificationKind::StartSoon,
        )
        .await
    }

    /// Sends `ends_soon` to participants of started auctions ending around the configured
    /// lead time from now.
    #[tracing::instrument(skip_all)]
    pub async fn notify_ending_soon(&self, now: OffsetDateTime) -> anyhow::Result<()> {
        self.notify_upcoming(
            now,
            entities::AuctionStatus::Started,
            AuctionTime::End,
            self.config.lifecycle.ends_soon_lead,
            entities::NotificationKind::EndsSoon,
        )
        .await
    }

    async fn notify_upcoming(
        &self,
        now: OffsetDateTime,
        status: entities::AuctionStatus,
        time: AuctionTime,
        lead: Duration,
        kind: entities::NotificationKind,
    ) -> anyhow::Result<()> {
        let tolerance = self.config.lifecycle.soon_tolerance;
        let auctions = self
            .repo
            .get_auctions(AuctionTimeRange {
                status,
                time,
                from: Some(now + lead.saturating_sub(tolerance)),
                to: now + lead + tolerance,
            })
            .await?;
        for auction in auctions {
            if let Err(err) = self.notify_participants(&auction, kind).await {
                tracing::error!(
                    error = ?err,
                    auction_id = auction.id,
                    kind = kind.as_str(),
                    "Failed to notify participants"
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
            auction::service::tests::auction,
            kernel::notifier::MockNotificationDispatcher,
        },
        time::Duration,
    };

    #[tokio::test]
    async fn test_start_soon_window() {
        let mut notifier = MockNotificationDispatcher::new();
        notifier
            .expect_dispatch()
            .times(2)
            .returning(|notification| {
                assert_eq!(notification.kind, entities::NotificationKind::StartSoon);
                assert_eq!(notification.auction_id, 1);
                Ok(())
            });
        let (service, db) = Service::new_in_memory(notifier);
        let now = OffsetDateTime::now_utc();
        for (auction_id, starts_in) in [(1, 30), (2, 45), (3, 5)] {
            db.insert_auction(auction(
                auction_id,
                entities::AuctionStatus::Scheduled,
                now + Duration::minutes(starts_in),
                now + Duration::minutes(starts_in + 60),
                &[1, 2],
            ));
        }

        service.notify_starting_soon(now).await.unwrap();
        service
            .notify_starting_soon(now + Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(db.records().len(), 2);
    }

    #[tokio::test]
    async fn test_ends_soon_only_for_started_auctions() {
        let mut notifier = MockNotificationDispatcher::new();
        notifier
            .expect_dispatch()
            .times(1)
            .returning(|notification| {
                assert_eq!(notification.kind, entities::NotificationKind::EndsSoon);
                assert_eq!(notification.auction_id, 1);
                Ok(())
            });
        let (service, db) = Service::new_in_memory(notifier);
        let now = OffsetDateTime::now_utc();
        db.insert_auction(auction(
            1,
            entities::AuctionStatus::Started,
            now - Duration::hours(1),
            now + Duration::minutes(10),
            &[7],
        ));
        db.insert_auction(auction(
            2,
            entities::AuctionStatus::Scheduled,
            now - Duration::hours(1),
            now + Duration::minutes(10),
            &[7],
        ));

        service.notify_ending_soon(now).await.unwrap();
    }
}
