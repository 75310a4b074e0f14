use {
    crate::{
        per_metrics::{
            is_metrics,
            MetricsLayer,
        },
        server::{
            run_migrations,
            start_server,
        },
    },
    anyhow::Result,
    clap::Parser,
    std::io::IsTerminal,
    tracing_subscriber::{
        filter::{
            self,
            LevelFilter,
        },
        layer::SubscriberExt,
        EnvFilter,
        Layer,
    },
};

mod api;
mod auction;
mod config;
mod kernel;
mod per_metrics;
mod server;
mod state;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize a Tracing Subscriber
    let fmt_builder = tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    // Spans with the metrics target only feed the metrics layer and are kept out of the logs.
    let log_filter = filter::filter_fn(|metadata| !is_metrics(metadata));
    let metrics_filter = filter::filter_fn(|metadata| is_metrics(metadata));
    let registry =
        tracing_subscriber::registry().with(MetricsLayer.with_filter(metrics_filter));

    // Use the compact formatter if we're in a terminal, otherwise use the JSON formatter.
    if std::io::stderr().is_terminal() {
        tracing::subscriber::set_global_default(
            registry.with(
                fmt_builder
                    .compact()
                    .with_filter(env_filter)
                    .with_filter(log_filter),
            ),
        )?;
    } else {
        tracing::subscriber::set_global_default(
            registry.with(
                fmt_builder
                    .json()
                    .with_filter(env_filter)
                    .with_filter(log_filter),
            ),
        )?;
    }

    // Parse the command line arguments with StructOpt, will exit automatically on `--help` or
    // with invalid arguments.
    match config::Options::parse() {
        config::Options::Run(opts) => start_server(opts).await,
        config::Options::Migrate(opts) => run_migrations(opts).await,
    }
}
