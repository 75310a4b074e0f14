use {
    crate::{
        api::{
            self,
            ws::WsState,
        },
        auction::service::{
            self as auction_service,
            Service,
        },
        config::{
            Config,
            MigrateOptions,
            RunOptions,
        },
        kernel::{
            db::DB,
            notifier::{
                LogDispatcher,
                NotificationDispatcher,
                WebhookDispatcher,
            },
        },
        per_metrics,
        state::{
            Store,
            StoreNew,
        },
    },
    anyhow::anyhow,
    axum_prometheus::metrics_exporter_prometheus::{
        Matcher,
        PrometheusBuilder,
    },
    futures::{
        future::join_all,
        Future,
    },
    sqlx::postgres::PgPoolOptions,
    std::{
        sync::{
            atomic::{
                AtomicBool,
                Ordering,
            },
            Arc,
        },
        time::Duration,
    },
    tokio::time::sleep,
    tokio_util::task::TaskTracker,
};

const METRICS_UPDATE_INTERVAL: Duration = Duration::from_secs(15);
const DURATION_BUCKETS: &[f64; 12] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

async fn connect_db(database_url: &str, max_connections: u32) -> anyhow::Result<DB> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|err| anyhow!("Failed to connect to database: {:?}", err))
}

async fn migrate(pool: &DB) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|err| anyhow!("Failed to run migrations: {:?}", err))?;
    tracing::info!("Migrations applied");
    Ok(())
}

pub async fn run_migrations(migrate_options: MigrateOptions) -> anyhow::Result<()> {
    let pool = connect_db(&migrate_options.database_url, 1).await?;
    migrate(&pool).await
}

fn build_notifier(run_options: &RunOptions) -> anyhow::Result<Arc<dyn NotificationDispatcher>> {
    Ok(match &run_options.notification.webhook_url {
        Some(url) => {
            tracing::info!(url = %url, "Sending notifications to webhook");
            Arc::new(WebhookDispatcher::new(
                url.clone(),
                run_options.notification.webhook_timeout,
            )?)
        }
        None => {
            tracing::warn!("No notification webhook configured, notifications are only logged");
            Arc::new(LogDispatcher)
        }
    })
}

/// A failing task shuts the whole server down.
async fn run_until_exit(
    name: &'static str,
    task: impl Future<Output = anyhow::Result<()>>,
) {
    if let Err(err) = task.await {
        tracing::error!(error = ?err, task = name, "Task failed, shutting down...");
        SHOULD_EXIT.store(true, Ordering::Release);
    }
}

async fn run_metrics_update_loop(store: Arc<StoreNew>) -> anyhow::Result<()> {
    while !SHOULD_EXIT.load(Ordering::Acquire) {
        store.auction_service.update_metrics().await;
        sleep(METRICS_UPDATE_INTERVAL).await;
    }
    Ok(())
}

pub async fn start_server(run_options: RunOptions) -> anyhow::Result<()> {
    tokio::spawn(async move {
        tracing::info!("Registered shutdown signal handler...");
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?err, "Failed to listen for the shutdown signal");
        }
        tracing::info!("Shut down signal received, waiting for tasks...");
        SHOULD_EXIT.store(true, Ordering::Release);
    });

    let config = match &run_options.config.config {
        Some(path) => Config::load(path).map_err(|err| {
            anyhow!(
                "Failed to load config from file({path}): {:?}",
                err,
                path = path
            )
        })?,
        None => Config::default(),
    };
    let lifecycle = config.lifecycle_config(&run_options.lifecycle);
    tracing::info!(lifecycle = ?lifecycle, "Loaded lifecycle config");

    let pool = connect_db(
        &run_options.server.database_url,
        run_options.server.database_max_connections,
    )
    .await?;
    migrate(&pool).await?;

    let metrics_recorder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            DURATION_BUCKETS,
        )?
        .install_recorder()
        .map_err(|err| anyhow!("Failed to install metrics recorder: {:?}", err))?;

    let task_tracker = TaskTracker::new();
    let auction_service = Service::new(
        pool.clone(),
        auction_service::Config { lifecycle },
        build_notifier(&run_options)?,
        run_options.server.session_buffer,
        task_tracker.clone(),
    );

    let store = Arc::new(Store {
        db: pool,
        ws: WsState::new(run_options.server.requester_ip_header_name.clone()),
        access_tokens: Default::default(),
        metrics_recorder,
    });
    let store_new = Arc::new(StoreNew {
        store:           store.clone(),
        auction_service: auction_service.clone(),
        task_tracker:    task_tracker.clone(),
    });

    let lifecycle_loop = tokio::spawn(run_until_exit("lifecycle", {
        let service = auction_service.clone();
        async move { service.run_lifecycle_loop().await }
    }));
    let metrics_update_loop = tokio::spawn(run_until_exit(
        "metrics_update",
        run_metrics_update_loop(store_new.clone()),
    ));
    let server_loop = tokio::spawn(run_until_exit(
        "api",
        api::start_api(run_options.clone(), store_new.clone()),
    ));
    let metrics_loop = tokio::spawn(run_until_exit(
        "metrics",
        per_metrics::start_metrics(run_options.clone(), store),
    ));
    join_all(vec![
        lifecycle_loop,
        metrics_update_loop,
        server_loop,
        metrics_loop,
    ])
    .await;

    // In-flight bids and notifications finish before the process exits.
    task_tracker.close();
    task_tracker.wait().await;
    Ok(())
}

// A static exit flag to indicate to running threads that we're shutting down. This is used to
// gracefully shutdown the application.
//
// NOTE: A more idiomatic approach would be to use a tokio::sync::broadcast channel, and to send a
// shutdown signal to all running tasks. However, this is a bit more complicated to implement and
// we don't rely on global state for anything else.
pub(crate) static SHOULD_EXIT: AtomicBool = AtomicBool::new(false);
pub const EXIT_CHECK_INTERVAL: Duration = Duration::from_secs(1);
