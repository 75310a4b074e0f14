use {
    super::Service,
    crate::{
        api::ws::UpdateEvent,
        auction::entities,
        kernel::fanout::SessionId,
    },
    tokio::sync::mpsc,
};

impl Service {
    /// Registers a session for the updates of an auction.
    pub fn subscribe(
        &self,
        auction_id: entities::AuctionId,
        session_id: SessionId,
    ) -> mpsc::Receiver<UpdateEvent> {
        self.fanout.subscribe(auction_id, session_id)
    }

    pub fn unsubscribe(&self, auction_id: entities::AuctionId, session_id: SessionId) {
        self.fanout.unsubscribe(&auction_id, session_id);
    }
}
