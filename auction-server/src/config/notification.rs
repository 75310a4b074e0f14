use {
    clap::Args,
    humantime_serde::re::humantime,
    std::time::Duration,
    url::Url,
};

const DEFAULT_WEBHOOK_TIMEOUT: &str = "5s";

#[derive(Args, Clone, Debug)]
#[command(next_help_heading = "Notification Options")]
#[group(id = "Notification")]
pub struct Options {
    /// Endpoint receiving the participant notifications. Notifications are only logged without it.
    #[arg(long = "notification-webhook-url")]
    #[arg(env = "NOTIFICATION_WEBHOOK_URL")]
    pub webhook_url:     Option<Url>,
    /// Timeout of a single webhook request.
    #[arg(long = "notification-webhook-timeout")]
    #[arg(default_value = DEFAULT_WEBHOOK_TIMEOUT)]
    #[arg(env = "NOTIFICATION_WEBHOOK_TIMEOUT")]
    #[arg(value_parser = humantime::parse_duration)]
    pub webhook_timeout: Duration,
}
