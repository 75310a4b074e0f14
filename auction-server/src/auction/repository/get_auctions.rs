use {
    super::{
        AuctionTimeRange,
        Repository,
    },
    crate::auction::entities,
};

impl Repository {
    pub async fn get_auctions(
        &self,
        range: AuctionTimeRange,
    ) -> anyhow::Result<Vec<entities::Auction>> {
        self.db.get_auctions(range).await
    }
}
