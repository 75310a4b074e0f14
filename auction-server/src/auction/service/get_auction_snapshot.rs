use {
    super::Service,
    crate::{
        api::RestError,
        auction::entities,
    },
};

pub struct GetAuctionSnapshotInput {
    pub auction_id: entities::AuctionId,
}

impl Service {
    pub async fn get_auction_snapshot(
        &self,
        input: GetAuctionSnapshotInput,
    ) -> Result<entities::AuctionSnapshot, RestError> {
        let auction = self
            .repo
            .get_auction(input.auction_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, auction_id = input.auction_id, "Failed to get auction");
                RestError::TemporarilyUnavailable
            })?
            .ok_or(RestError::AuctionNotFound)?;
        let last_bid = self
            .repo
            .get_high_bid(input.auction_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, auction_id = input.auction_id, "Failed to get high bid");
                RestError::TemporarilyUnavailable
            })?;
        Ok(entities::AuctionSnapshot { auction, last_bid })
    }
}
