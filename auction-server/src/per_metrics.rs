use {
    crate::{
        config::RunOptions,
        server::{
            EXIT_CHECK_INTERVAL,
            SHOULD_EXIT,
        },
        state::Store,
    },
    anyhow::Result,
    axum::{
        routing::get,
        Router,
    },
    axum_prometheus::metrics,
    std::{
        fmt::Debug,
        sync::{
            atomic::Ordering,
            Arc,
        },
        time::Instant,
    },
    tracing::{
        field::{
            Field,
            Visit,
        },
        span::{
            Attributes,
            Record,
        },
        Id,
        Metadata,
        Subscriber,
    },
    tracing_subscriber::{
        layer::Context,
        registry::LookupSpan,
        Layer,
    },
};

/// Target of the spans that are turned into metrics.
pub const METRICS_TARGET: &str = "metrics";

pub fn is_metrics(metadata: &Metadata) -> bool {
    metadata.target() == METRICS_TARGET
}

/// Labels of a metrics span, read from its `category`, `name` and `result` fields.
#[derive(Debug)]
struct SpanMetrics {
    category:  String,
    name:      String,
    result:    String,
    opened_at: Instant,
}

impl SpanMetrics {
    fn new(span_name: &str) -> Self {
        Self {
            category:  "unknown".to_string(),
            name:      span_name.to_string(),
            result:    "unknown".to_string(),
            opened_at: Instant::now(),
        }
    }

    fn set(&mut self, field: &str, value: String) {
        match field {
            "category" => self.category = value,
            "name" => self.name = value,
            "result" => self.result = value,
            _ => {}
        }
    }

    fn emit(&self) {
        let labels = [("name", self.name.clone()), ("result", self.result.clone())];
        metrics::histogram!(format!("{}_duration_seconds", self.category), &labels)
            .record(self.opened_at.elapsed().as_secs_f64());
        metrics::counter!(format!("{}_total", self.category), &labels).increment(1);
    }
}

impl Visit for SpanMetrics {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.set(field.name(), format!("{:?}", value));
    }
}

/// Turns every closed span with the metrics target into a `{category}_duration_seconds`
/// histogram and a `{category}_total` counter, labelled with the span's name and result.
/// The result can be changed while the span is open with `Span::record`.
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut span_metrics = SpanMetrics::new(span.name());
        attrs.record(&mut span_metrics);
        span.extensions_mut().replace(span_metrics);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(span_metrics) = span.extensions_mut().get_mut::<SpanMetrics>() {
                values.record(span_metrics);
            }
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(&id) {
            if let Some(span_metrics) = span.extensions().get::<SpanMetrics>() {
                span_metrics.emit();
            }
        }
    }
}

pub async fn start_metrics(run_options: RunOptions, store: Arc<Store>) -> Result<()> {
    tracing::info!(addr = %run_options.server.metrics_addr, "Starting Metrics Server...");

    let app = Router::new().route(
        "/metrics",
        get(move || {
            let store = store.clone();
            async move { store.metrics_recorder.render() }
        }),
    );
    let listener = tokio::net::TcpListener::bind(&run_options.server.metrics_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            while !SHOULD_EXIT.load(Ordering::Acquire) {
                tokio::time::sleep(EXIT_CHECK_INTERVAL).await;
            }
            tracing::info!("Shutting down metrics server...");
        })
        .await?;
    Ok(())
}
