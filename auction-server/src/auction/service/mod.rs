use {
    super::{
        entities,
        repository::{
            Database,
            Repository,
        },
    },
    crate::{
        api::ws::UpdateEvent,
        kernel::{
            fanout::Fanout,
            notifier::NotificationDispatcher,
        },
    },
    std::{
        sync::Arc,
        time::Duration,
    },
    tokio_util::task::TaskTracker,
};

pub mod end_auctions;
pub mod get_auction_snapshot;
pub mod notify;
pub mod notify_upcoming;
pub mod record_and_send;
pub mod start_auctions;
pub mod submit_bid;
pub mod subscribe;
pub mod transition_auction;
pub mod workers;

#[derive(Clone, Debug, PartialEq)]
pub struct LifecycleConfig {
    /// Time between two sweeps.
    pub interval:        Duration,
    /// How far back started and ended auctions are re-checked for missing notifications.
    pub catch_up_window: Duration,
    pub start_soon_lead: Duration,
    pub ends_soon_lead:  Duration,
    /// Half width of the window around a lead time.
    pub soon_tolerance:  Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            interval:        Duration::from_secs(60),
            catch_up_window: Duration::from_secs(10 * 60),
            start_soon_lead: Duration::from_secs(30 * 60),
            ends_soon_lead:  Duration::from_secs(10 * 60),
            soon_tolerance:  Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub lifecycle: LifecycleConfig,
}

pub struct ServiceInner {
    config:       Config,
    repo:         Arc<Repository>,
    notifier:     Arc<dyn NotificationDispatcher>,
    fanout:       Fanout<entities::AuctionId, UpdateEvent>,
    task_tracker: TaskTracker,
}

#[derive(Clone)]
pub struct Service(Arc<ServiceInner>);
impl std::ops::Deref for Service {
    type Target = ServiceInner;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Service {
    pub fn new(
        db: impl Database,
        config: Config,
        notifier: Arc<dyn NotificationDispatcher>,
        session_buffer: usize,
        task_tracker: TaskTracker,
    ) -> Self {
        Self(Arc::new(ServiceInner {
            config,
            repo: Arc::new(Repository::new(db)),
            notifier,
            fanout: Fanout::new(session_buffer),
            task_tracker,
        }))
    }

    pub async fn update_metrics(&self) {
        self.repo.update_metrics().await;
        self.fanout.update_metrics();
    }

    fn publish_snapshot(&self, snapshot: entities::AuctionSnapshot) -> usize {
        let auction_id = snapshot.auction.id;
        self.fanout
            .publish(&auction_id, UpdateEvent::AuctionUpdate(snapshot))
    }
}
