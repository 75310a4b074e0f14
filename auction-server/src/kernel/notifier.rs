#[cfg(test)]
use mockall::automock;
use {
    crate::auction::entities::{
        format_price,
        Notification,
        NotificationContext,
    },
    axum::async_trait,
    axum_prometheus::metrics,
    serde::Serialize,
    std::{
        fmt::Debug,
        time::{
            Duration,
            Instant,
        },
    },
    url::Url,
};

/// Delivers notifications to users. Delivery is best effort: an error means the
/// notification was not delivered and will not be retried by the dispatcher.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationDispatcher: Debug + Send + Sync + 'static {
    async fn dispatch(&self, notification: Notification) -> anyhow::Result<()>;
}

#[derive(Serialize, Debug, PartialEq)]
struct WebhookPayload {
    user_id:        i64,
    kind:           &'static str,
    auction_id:     i64,
    auction_title:  String,
    start_time:     i64,
    end_time:       i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_price:      Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price:          Option<String>,
}

impl From<&Notification> for WebhookPayload {
    fn from(notification: &Notification) -> Self {
        let (previous_price, new_price, price) = match &notification.context {
            NotificationContext::None => (None, None, None),
            NotificationContext::Outbid {
                previous_price,
                new_price,
            } => (
                Some(format_price(previous_price)),
                Some(format_price(new_price)),
                None,
            ),
            NotificationContext::Winner { price } => (None, None, Some(format_price(price))),
        };
        Self {
            user_id: notification.user_id,
            kind: notification.kind.as_str(),
            auction_id: notification.auction_id,
            auction_title: notification.auction_title.clone(),
            start_time: notification.start_time.unix_timestamp(),
            end_time: notification.end_time.unix_timestamp(),
            previous_price,
            new_price,
            price,
        }
    }
}

/// Posts every notification as a JSON document to a webhook.
#[derive(Debug)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url:    Url,
}

impl WebhookDispatcher {
    pub fn new(url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn dispatch(&self, notification: Notification) -> anyhow::Result<()> {
        let start = Instant::now();
        let result = self
            .client
            .post(self.url.clone())
            .json(&WebhookPayload::from(&notification))
            .send()
            .await
            .and_then(|response| response.error_for_status());

        let labels = [
            ("kind", notification.kind.as_str().to_string()),
            (
                "result",
                if result.is_ok() { "success" } else { "error" }.to_string(),
            ),
        ];
        metrics::counter!("notifications_dispatched_total", &labels).increment(1);
        metrics::histogram!("notifications_dispatch_duration_seconds", &labels)
            .record(start.elapsed().as_secs_f64());
        result?;
        Ok(())
    }
}

/// Writes notifications to the log. Used when no webhook is configured.
#[derive(Debug, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(&self, notification: Notification) -> anyhow::Result<()> {
        tracing::info!(
            user_id = notification.user_id,
            auction_id = notification.auction_id,
            kind = notification.kind.as_str(),
            context = ?notification.context,
            "Notification"
        );
        metrics::counter!(
            "notifications_dispatched_total",
            &[("kind", notification.kind.as_str()), ("result", "logged")]
        )
        .increment(1);
        Ok(())
    }
}
