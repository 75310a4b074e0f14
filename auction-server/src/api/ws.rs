use {
    crate::{
        api::{
            Auth,
            RestError,
        },
        auction::{
            api::authorize_participant,
            entities::{
                self,
                AuctionId,
            },
            service::{
                get_auction_snapshot::GetAuctionSnapshotInput,
                submit_bid::{
                    AcceptedBid,
                    BidRejection,
                    SubmitBidInput,
                },
                Service,
            },
        },
        kernel::{
            entities::UserId,
            fanout::SessionId,
        },
        server::{
            EXIT_CHECK_INTERVAL,
            SHOULD_EXIT,
        },
        state::StoreNew,
    },
    anyhow::{
        anyhow,
        Result,
    },
    axum::{
        extract::{
            ws::{
                Message,
                WebSocket,
            },
            Path,
            State,
            WebSocketUpgrade,
        },
        http::HeaderMap,
        response::Response,
    },
    futures::{
        stream::{
            SplitSink,
            SplitStream,
        },
        SinkExt,
        StreamExt,
    },
    live_auction_api_types::{
        auction::AuctionSnapshot,
        ws::{
            ClientMessage,
            ServerResultMessage,
        },
    },
    std::{
        collections::{
            HashMap,
            HashSet,
        },
        net::IpAddr,
        sync::{
            atomic::{
                AtomicUsize,
                Ordering,
            },
            Arc,
        },
        time::Duration,
    },
    tokio::sync::{
        mpsc,
        RwLock,
    },
    tracing::{
        instrument,
        Instrument,
    },
};

pub struct WsState {
    pub requester_ip_header_name: String,
    subscriber_counter:           AtomicUsize,
    subscriber_per_ip:            RwLock<HashMap<IpAddr, HashSet<SubscriberId>>>,
}

const MAXIMUM_SUBSCRIBERS_PER_IP: usize = 10;

impl WsState {
    pub fn new(requester_ip_header_name: String) -> Self {
        Self {
            requester_ip_header_name,
            subscriber_counter: AtomicUsize::new(0),
            subscriber_per_ip: RwLock::new(HashMap::new()),
        }
    }

    /// If the specified IP address has too many open websocket connections, this function will
    /// return none. Otherwise, it will return the new subscriber id.
    pub async fn get_new_subscriber_id(&self, ip: Option<IpAddr>) -> Option<SubscriberId> {
        let id = self.subscriber_counter.fetch_add(1, Ordering::SeqCst);
        if let Some(ip) = ip {
            let mut write_guard = self.subscriber_per_ip.write().await;
            let ids = write_guard.entry(ip).or_insert_with(HashSet::new);
            if ids.len() >= MAXIMUM_SUBSCRIBERS_PER_IP {
                return None;
            }
            ids.insert(id);
        }
        Some(id)
    }

    pub async fn remove_subscriber(&self, id: SubscriberId, ip: Option<IpAddr>) {
        if let Some(ip) = ip {
            let mut write_guard = self.subscriber_per_ip.write().await;
            if let Some(ids) = write_guard.get_mut(&ip) {
                ids.remove(&id);
                if ids.is_empty() {
                    write_guard.remove(&ip);
                }
            }
        }
    }

    fn requester_ip(&self, headers: &HeaderMap) -> Option<IpAddr> {
        headers
            .get(self.requester_ip_header_name.as_str())
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next()) // Only take the first ip if there are multiple
            .and_then(|value| value.trim().parse().ok())
    }
}

/// Opens a live session on an auction.
///
/// The connection is only upgraded for an authenticated participant of an existing auction,
/// so every rejection is a plain http error.
pub async fn ws_route_handler(
    auth: Auth,
    ws: WebSocketUpgrade,
    Path(auction_id): Path<AuctionId>,
    State(store): State<Arc<StoreNew>>,
    headers: HeaderMap,
) -> Result<Response, RestError> {
    if auth == Auth::Unauthorized {
        return Err(RestError::Unauthorized);
    }
    let snapshot = store
        .auction_service
        .get_auction_snapshot(GetAuctionSnapshotInput { auction_id })
        .await?;
    let user_id = authorize_participant(&auth, &snapshot.auction)?;

    let ws_state = &store.store.ws;
    let requester_ip = ws_state.requester_ip(&headers);
    if requester_ip.is_none() {
        tracing::warn!("Failed to get requester IP address");
    }

    match ws_state.get_new_subscriber_id(requester_ip).await {
        Some(subscriber_id) => Ok(ws.on_upgrade(move |socket| {
            websocket_handler(
                socket,
                store,
                subscriber_id,
                SessionTarget {
                    auction_id,
                    user_id,
                },
                requester_ip,
            )
        })),
        None => Err(RestError::TooManyOpenWebsocketConnections),
    }
}

async fn websocket_handler(
    stream: WebSocket,
    state: Arc<StoreNew>,
    subscriber_id: SubscriberId,
    target: SessionTarget,
    requester_ip: Option<IpAddr>,
) {
    let (sender, receiver) = stream.split();
    let update_receiver = state
        .auction_service
        .subscribe(target.auction_id, subscriber_id);
    let mut subscriber = Subscriber::new(
        subscriber_id,
        target,
        state.clone(),
        update_receiver,
        receiver,
        sender,
    );
    subscriber.run().await;
    state
        .auction_service
        .unsubscribe(target.auction_id, subscriber_id);
    state
        .store
        .ws
        .remove_subscriber(subscriber_id, requester_ip)
        .await;
}

#[derive(Clone, PartialEq, Debug)]
pub enum UpdateEvent {
    AuctionUpdate(entities::AuctionSnapshot),
}

pub type SubscriberId = SessionId;

/// The auction and the participant a session was opened for.
#[derive(Clone, Copy, Debug)]
struct SessionTarget {
    auction_id: AuctionId,
    user_id:    UserId,
}

/// Subscriber is an actor that handles a single websocket connection.
/// It listens to the updates of its auction and sends them to the client.
pub struct Subscriber {
    id:                  SubscriberId,
    closed:              bool,
    target:              SessionTarget,
    store:               Arc<StoreNew>,
    update_receiver:     mpsc::Receiver<UpdateEvent>,
    receiver:            SplitStream<WebSocket>,
    sender:              SplitSink<WebSocket, Message>,
    ping_interval:       tokio::time::Interval,
    exit_check_interval: tokio::time::Interval,
    responded_to_ping:   bool,
    last_sent_version:   Option<SnapshotVersion>,
    bid_sender:          mpsc::Sender<String>,
    response_sender:     mpsc::Sender<ServerResultMessage>,
    response_receiver:   mpsc::Receiver<ServerResultMessage>,
}

const PING_INTERVAL_DURATION: Duration = Duration::from_secs(30);
const MAX_QUEUED_BIDS: usize = 50;

impl Subscriber {
    fn new(
        id: SubscriberId,
        target: SessionTarget,
        store: Arc<StoreNew>,
        update_receiver: mpsc::Receiver<UpdateEvent>,
        receiver: SplitStream<WebSocket>,
        sender: SplitSink<WebSocket, Message>,
    ) -> Self {
        let (response_sender, response_receiver) = mpsc::channel(MAX_QUEUED_BIDS);
        let (bid_sender, bid_receiver) = mpsc::channel(MAX_QUEUED_BIDS);
        store.task_tracker.spawn(
            run_bid_worker(
                store.auction_service.clone(),
                target,
                bid_receiver,
                response_sender.clone(),
            )
            .in_current_span(),
        );
        Self {
            id,
            closed: false,
            target,
            store,
            update_receiver,
            receiver,
            sender,
            ping_interval: tokio::time::interval(PING_INTERVAL_DURATION),
            exit_check_interval: tokio::time::interval(EXIT_CHECK_INTERVAL),
            responded_to_ping: true, // We start with true so we don't close the connection immediately
            last_sent_version: None,
            bid_sender,
            response_sender,
            response_receiver,
        }
    }

    pub async fn run(&mut self) {
        if let Err(e) = self.send_current_snapshot().await {
            tracing::debug!(subscriber = self.id, error = ?e, "Failed to send the initial snapshot.");
            return;
        }
        while !self.closed {
            if let Err(e) = self.handle_next().await {
                tracing::debug!(subscriber = self.id, error = ?e, "Error Handling Subscriber Message.");
                break;
            }
        }
    }

    async fn handle_next(&mut self) -> Result<()> {
        tokio::select! {
            maybe_update_event = self.update_receiver.recv() => {
                match maybe_update_event {
                    Some(event) => self.handle_update(event).await,
                    None => Err(anyhow!("Session was dropped from the auction updates")),
                }
            },
            maybe_message_or_err = self.receiver.next() => {
                self.handle_client_message(
                    maybe_message_or_err.ok_or(anyhow!("Client channel is closed"))??
                ).await
            },
            Some(response) = self.response_receiver.recv() => {
                self.sender.send(serde_json::to_string(&response)?.into()).await?;
                Ok(())
            },
            _  = self.ping_interval.tick() => {
                if !self.responded_to_ping {
                    return Err(anyhow!("Subscriber did not respond to ping. Closing connection."));
                }
                self.responded_to_ping = false;
                self.sender.send(Message::Ping(vec![])).await?;
                Ok(())
            },
            _ = self.exit_check_interval.tick() => {
                if SHOULD_EXIT.load(Ordering::Acquire) {
                    self.sender.close().await?;
                    self.closed = true;
                    return Err(anyhow!("Application is shutting down. Closing connection."));
                }
                Ok(())
            }
        }
    }

    /// Pushes the auction as it is now. The session is already subscribed at this point, so
    /// nothing published later can be missed.
    async fn send_current_snapshot(&mut self) -> Result<()> {
        let snapshot = self
            .store
            .auction_service
            .get_auction_snapshot(GetAuctionSnapshotInput {
                auction_id: self.target.auction_id,
            })
            .await
            .map_err(|e| anyhow!("Failed to get auction snapshot: {:?}", e))?;
        self.send_snapshot(snapshot).await
    }

    async fn send_snapshot(&mut self, snapshot: entities::AuctionSnapshot) -> Result<()> {
        let version = snapshot.version();
        if !is_newer_version(self.last_sent_version, version) {
            // Already sent, or covered by a newer snapshot
            return Ok(());
        }
        self.last_sent_version = Some(version);
        let message = serde_json::to_string(&AuctionSnapshot::from(snapshot))?;
        self.sender.send(message.into()).await?;
        Ok(())
    }

    #[instrument(
        target = "metrics",
        fields(category = "ws_update", result = "success", name),
        skip_all
    )]
    async fn handle_update(&mut self, event: UpdateEvent) -> Result<()> {
        let result = match event {
            UpdateEvent::AuctionUpdate(snapshot) => {
                tracing::Span::current().record("name", "auction_update");
                self.send_snapshot(snapshot).await
            }
        };
        if result.is_err() {
            tracing::Span::current().record("result", "error");
        }
        result
    }

    async fn queue_bid(&mut self, price: String) -> Result<()> {
        self.bid_sender
            .send(price)
            .await
            .map_err(|_| anyhow!("Bid worker of the session has stopped"))
    }

    #[instrument(
        target = "metrics",
        fields(category = "ws_client_message", result = "success", name),
        skip_all
    )]
    async fn handle_client_message(&mut self, message: Message) -> Result<()> {
        let maybe_client_message = match message {
            Message::Close(_) => {
                // Send the close message to gracefully shut down the connection
                // Otherwise the client might get an abnormal Websocket closure
                // error.
                tracing::Span::current().record("name", "close");
                if let Err(e) = self.sender.close().await {
                    tracing::Span::current().record("result", "error");
                    return Err(e.into());
                }
                self.closed = true;
                return Ok(());
            }
            Message::Text(text) => serde_json::from_str::<ClientMessage>(&text),
            Message::Binary(data) => serde_json::from_slice::<ClientMessage>(&data),
            Message::Ping(_) => {
                // Axum will send Pong automatically
                tracing::Span::current().record("name", "ping");
                return Ok(());
            }
            Message::Pong(_) => {
                tracing::Span::current().record("name", "pong");
                self.responded_to_ping = true;
                return Ok(());
            }
        };

        let name = match &maybe_client_message {
            Err(_) => "invalid",
            Ok(ClientMessage::PlaceBid { .. }) => "place_bid",
        };
        tracing::Span::current().record("name", name);
        match ClientRequest::from(maybe_client_message) {
            ClientRequest::PlaceBid(price) => self.queue_bid(price).await,
            ClientRequest::Reply(response) => {
                send_response(&self.response_sender, response);
                Ok(())
            }
        }
    }
}

type SnapshotVersion = (entities::AuctionStatus, Option<entities::BidId>);

/// Equal versions carry the same snapshot.
fn is_newer_version(last_sent: Option<SnapshotVersion>, version: SnapshotVersion) -> bool {
    last_sent.map_or(true, |last_sent| version > last_sent)
}

/// What a session does with a message from its client.
#[derive(Debug, PartialEq)]
enum ClientRequest {
    /// Queue a bid with the price exactly as sent.
    PlaceBid(String),
    /// Answer right away without touching the auction.
    Reply(ServerResultMessage),
}

impl From<serde_json::Result<ClientMessage>> for ClientRequest {
    fn from(message: serde_json::Result<ClientMessage>) -> Self {
        match message {
            Err(e) => ClientRequest::Reply(ServerResultMessage::error(format!(
                "Invalid message: {}",
                e
            ))),
            Ok(ClientMessage::PlaceBid { price: None }) => ClientRequest::Reply(
                ServerResultMessage::error(BidRejection::InvalidPrice.to_string()),
            ),
            Ok(ClientMessage::PlaceBid { price: Some(price) }) => {
                ClientRequest::PlaceBid(price.into_string())
            }
        }
    }
}

fn bid_result_message(result: Result<AcceptedBid, BidRejection>) -> ServerResultMessage {
    match result {
        Ok(accepted) => ServerResultMessage::success(format!(
            "Bid of {} placed successfully.",
            entities::format_price(&accepted.bid.price)
        )),
        Err(rejection) => ServerResultMessage::error(rejection.to_string()),
    }
}

fn send_response(
    response_sender: &mpsc::Sender<ServerResultMessage>,
    response: ServerResultMessage,
) {
    if matches!(response, ServerResultMessage::Error { .. }) {
        tracing::Span::current().record("result", "error");
    }
    if let Err(e) = response_sender.try_send(response) {
        tracing::warn!(error = ?e, "Error sending response to subscriber");
    }
}

/// Places the bids of one session one at a time, in the order they were sent. Runs on the
/// task tracker, so bids already queued are still placed after the connection closes.
async fn run_bid_worker(
    service: Service,
    target: SessionTarget,
    mut requests: mpsc::Receiver<String>,
    responses: mpsc::Sender<ServerResultMessage>,
) {
    while let Some(price) = requests.recv().await {
        let result = service
            .submit_bid(SubmitBidInput {
                auction_id: target.auction_id,
                bidder_id: target.user_id,
                price,
            })
            .await;
        send_response(&responses, bid_result_message(result));
    }
}
