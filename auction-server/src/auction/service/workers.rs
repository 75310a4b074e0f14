use {
    super::Service,
    crate::server::{
        EXIT_CHECK_INTERVAL,
        SHOULD_EXIT,
    },
    axum_prometheus::metrics,
    std::{
        sync::atomic::Ordering,
        time::Instant,
    },
    time::OffsetDateTime,
    tokio::time::MissedTickBehavior,
};

impl Service {
    pub async fn run_lifecycle_loop(&self) -> anyhow::Result<()> {
        let interval = self.config.lifecycle.interval;
        tracing::info!(interval = ?interval, "Starting lifecycle scheduler...");
        let mut exit_check_interval = tokio::time::interval(EXIT_CHECK_INTERVAL);
        let mut sweep_interval = tokio::time::interval(interval);
        sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !SHOULD_EXIT.load(Ordering::Acquire) {
            tokio::select! {
                _ = sweep_interval.tick() => {
                    let start = Instant::now();
                    self.run_lifecycle_sweep(OffsetDateTime::now_utc()).await;
                    let elapsed = start.elapsed();
                    metrics::histogram!("lifecycle_sweep_duration_seconds").record(elapsed.as_secs_f64());
                    if elapsed > interval {
                        tracing::warn!(elapsed = ?elapsed, interval = ?interval, "Lifecycle sweep took longer than the interval");
                    }
                }
                _ = exit_check_interval.tick() => {}
            }
        }
        tracing::info!("Shutting down lifecycle scheduler...");
        Ok(())
    }

    /// Runs every lifecycle sweep once. A failing sweep is logged and retried on the next
    /// tick without affecting the others.
    pub async fn run_lifecycle_sweep(&self, now: OffsetDateTime) {
        if let Err(err) = self.start_auctions(now).await {
            tracing::error!(error = ?err, "Start sweep failed");
        }
        if let Err(err) = self.end_auctions(now).await {
            tracing::error!(error = ?err, "End sweep failed");
        }
        if let Err(err) = self.notify_starting_soon(now).await {
            tracing::error!(error = ?err, "Starting soon sweep failed");
        }
        if let Err(err) = self.notify_ending_soon(now).await {
            tracing::error!(error = ?err, "Ending soon sweep failed");
        }
    }
}
