use {
    super::Repository,
    crate::auction::entities,
};

impl Repository {
    /// Returns true if the record was inserted, false if it already existed.
    pub async fn add_notification_record(
        &self,
        record: &entities::NotificationRecord,
    ) -> anyhow::Result<bool> {
        self.db.add_notification_record(record).await
    }
}
