use {
    super::{
        record_and_send::LedgerOutcome,
        Service,
    },
    crate::{
        auction::entities,
        kernel::entities::UserId,
    },
    std::collections::BTreeSet,
    time::OffsetDateTime,
};

pub struct NotifyInput {
    pub auction: entities::Auction,
    pub user_id: UserId,
    pub kind:    entities::NotificationKind,
    pub context: entities::NotificationContext,
}

impl Service {
    /// Sends a notification through the dispatcher. Deduplicated kinds go through the ledger.
    pub async fn notify(&self, input: NotifyInput) -> anyhow::Result<LedgerOutcome> {
        let notification =
            entities::Notification::new(&input.auction, input.user_id, input.kind, input.context);
        if !input.kind.is_deduplicated() {
            return Ok(match self.notifier.dispatch(notification).await {
                Ok(()) => LedgerOutcome::Sent,
                Err(err) => {
                    tracing::warn!(
                        error = ?err,
                        auction_id = input.auction.id,
                        user_id = input.user_id,
                        kind = input.kind.as_str(),
                        "Failed to send notification"
                    );
                    LedgerOutcome::SendFailed
                }
            });
        }

        let record = notification.record(OffsetDateTime::now_utc());
        let notifier = self.notifier.clone();
        self.record_and_send(record, move || async move {
            notifier.dispatch(notification).await
        })
        .await
    }

    /// Notifies every given user that has no record of this kind for the auction yet.
    /// Failures are isolated per user. Returns the number of notifications sent.
    pub async fn notify_users(
        &self,
        auction: &entities::Auction,
        users: impl IntoIterator<Item = UserId>,
        kind: entities::NotificationKind,
        context: entities::NotificationContext,
    ) -> anyhow::Result<usize> {
        let notified = self.repo.get_notified_users(auction.id, kind).await?;
        let pending: BTreeSet<UserId> = users
            .into_iter()
            .filter(|user_id| !notified.contains(user_id))
            .collect();

        let mut sent = 0;
        for user_id in pending {
            let result = self
                .notify(NotifyInput {
                    auction: auction.clone(),
                    user_id,
                    kind,
                    context: context.clone(),
                })
                .await;
            match result {
                Ok(LedgerOutcome::Sent) => sent += 1,
                Ok(_) => {}
                Err(err) => tracing::error!(
                    error = ?err,
                    auction_id = auction.id,
                    user_id,
                    kind = kind.as_str(),
                    "Failed to record notification"
                ),
            }
        }
        Ok(sent)
    }

    pub async fn notify_participants(
        &self,
        auction: &entities::Auction,
        kind: entities::NotificationKind,
    ) -> anyhow::Result<usize> {
        self.notify_users(
            auction,
            auction.participants.iter().copied(),
            kind,
            entities::NotificationContext::None,
        )
        .await
    }
}
