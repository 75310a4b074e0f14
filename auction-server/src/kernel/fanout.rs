use {
    axum_prometheus::metrics,
    dashmap::DashMap,
    std::{
        collections::HashMap,
        fmt::Debug,
        hash::Hash,
    },
    tokio::sync::mpsc::{
        self,
        error::TrySendError,
    },
};

pub type SessionId = usize;

/// Registry of live sessions per key (an auction) with non-blocking delivery.
///
/// Every session owns a bounded queue. Publishing never waits on a session: a session whose
/// queue is full or whose receiver is gone is dropped from the registry, which closes its
/// queue and lets the session shut itself down. Events for one session are delivered in
/// publish order.
#[derive(Debug)]
pub struct Fanout<K, E>
where
    K: Eq + Hash,
{
    sessions:       DashMap<K, HashMap<SessionId, mpsc::Sender<E>>>,
    session_buffer: usize,
}

impl<K, E> Fanout<K, E>
where
    K: Eq + Hash + Clone + Debug,
    E: Clone,
{
    pub fn new(session_buffer: usize) -> Self {
        Self {
            sessions:       DashMap::new(),
            session_buffer: session_buffer.max(1),
        }
    }

    /// Registers the session for the key and returns the receiving end of its queue.
    /// Subscribing again with the same session id replaces the previous queue.
    pub fn subscribe(&self, key: K, session_id: SessionId) -> mpsc::Receiver<E> {
        let (sender, receiver) = mpsc::channel(self.session_buffer);
        self.sessions
            .entry(key)
            .or_default()
            .insert(session_id, sender);
        receiver
    }

    /// Returns false if the session was not subscribed to the key.
    pub fn unsubscribe(&self, key: &K, session_id: SessionId) -> bool {
        let removed = match self.sessions.get_mut(key) {
            Some(mut sessions) => sessions.remove(&session_id).is_some(),
            None => false,
        };
        self.sessions.remove_if(key, |_, sessions| sessions.is_empty());
        removed
    }

    /// Delivers the event to every session subscribed to the key and returns the number of
    /// sessions that received it.
    pub fn publish(&self, key: &K, event: E) -> usize {
        let mut delivered = 0;
        if let Some(mut sessions) = self.sessions.get_mut(key) {
            sessions.retain(|session_id, sender| match sender.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        key = ?key,
                        session_id,
                        "Session is not keeping up with updates. Dropping it."
                    );
                    metrics::counter!("fanout_dropped_sessions_total").increment(1);
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            });
        }
        self.sessions.remove_if(key, |_, sessions| sessions.is_empty());
        delivered
    }

    pub fn subscriber_count(&self, key: &K) -> usize {
        self.sessions
            .get(key)
            .map(|sessions| sessions.len())
            .unwrap_or(0)
    }

    pub fn update_metrics(&self) {
        let sessions: usize = self.sessions.iter().map(|entry| entry.len()).sum();
        metrics::gauge!("fanout_keys").set(self.sessions.len() as f64);
        metrics::gauge!("fanout_sessions").set(sessions as f64);
    }
}
