use {
    super::Repository,
    crate::{
        auction::entities,
        kernel::entities::UserId,
    },
    std::collections::HashSet,
};

impl Repository {
    pub async fn get_notified_users(
        &self,
        auction_id: entities::AuctionId,
        kind: entities::NotificationKind,
    ) -> anyhow::Result<HashSet<UserId>> {
        Ok(self
            .db
            .get_notified_users(auction_id, kind)
            .await?
            .into_iter()
            .collect())
    }
}
