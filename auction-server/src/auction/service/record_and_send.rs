use {
    super::Service,
    crate::auction::entities,
    axum_prometheus::metrics,
    std::future::Future,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerOutcome {
    Sent,
    AlreadySent,
    /// Recorded but not delivered. Never retried.
    SendFailed,
}

impl LedgerOutcome {
    fn as_label(&self) -> &'static str {
        match self {
            LedgerOutcome::Sent => "sent",
            LedgerOutcome::AlreadySent => "already_sent",
            LedgerOutcome::SendFailed => "send_failed",
        }
    }
}

impl Service {
    /// Runs the side effect only if the record was not stored before. The record is written
    /// first, so a crash in between loses the notification instead of sending it twice.
    /// An error means nothing was recorded and the caller may try again.
    #[tracing::instrument(skip_all, fields(auction_id = record.auction_id, user_id = record.user_id, kind = record.kind.as_str(), outcome))]
    pub async fn record_and_send<F, Fut>(
        &self,
        record: entities::NotificationRecord,
        side_effect: F,
    ) -> anyhow::Result<LedgerOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let outcome = if self.repo.add_notification_record(&record).await? {
            match side_effect().await {
                Ok(()) => LedgerOutcome::Sent,
                Err(err) => {
                    tracing::error!(error = ?err, "Failed to send recorded notification");
                    LedgerOutcome::SendFailed
                }
            }
        } else {
            LedgerOutcome::AlreadySent
        };
        tracing::Span::current().record("outcome", outcome.as_label());
        metrics::counter!(
            "notification_ledger_total",
            &[("kind", record.kind.as_str()), ("outcome", outcome.as_label())]
        )
        .increment(1);
        Ok(outcome)
    }
}
