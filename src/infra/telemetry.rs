use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

pub(crate) const METRIC_CACHE_HIT: &str = "gadfly_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "gadfly_cache_miss_total";
pub(crate) const METRIC_CACHE_DEDUP: &str = "gadfly_cache_dedup_total";
pub(crate) const METRIC_CACHE_IDLE: &str = "gadfly_cache_idle_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "gadfly_cache_evict_total";
pub(crate) const METRIC_CACHE_INVALIDATED: &str = "gadfly_cache_invalidated_total";
pub(crate) const METRIC_CACHE_DROPPED: &str = "gadfly_cache_dropped_response_total";
pub(crate) const METRIC_FETCH_MS: &str = "gadfly_fetch_ms";
pub(crate) const METRIC_MUTATION_MS: &str = "gadfly_mutation_ms";

enum MetricKind {
    Counter,
    Histogram,
}

struct MetricDescription {
    name: &'static str,
    kind: MetricKind,
    help: &'static str,
}

/// Every metric emitted by the crate.
const METRICS: [MetricDescription; 9] = [
    MetricDescription {
        name: METRIC_CACHE_HIT,
        kind: MetricKind::Counter,
        help: "Resolves served from a fresh or failed entry without a request.",
    },
    MetricDescription {
        name: METRIC_CACHE_MISS,
        kind: MetricKind::Counter,
        help: "Resolves that dispatched a new fetch.",
    },
    MetricDescription {
        name: METRIC_CACHE_DEDUP,
        kind: MetricKind::Counter,
        help: "Resolves that joined a fetch already in flight.",
    },
    MetricDescription {
        name: METRIC_CACHE_IDLE,
        kind: MetricKind::Counter,
        help: "Resolves of idle keys answered without a request.",
    },
    MetricDescription {
        name: METRIC_CACHE_EVICT,
        kind: MetricKind::Counter,
        help: "Cache entries evicted due to capacity.",
    },
    MetricDescription {
        name: METRIC_CACHE_INVALIDATED,
        kind: MetricKind::Counter,
        help: "Cache entries marked stale by invalidation.",
    },
    MetricDescription {
        name: METRIC_CACHE_DROPPED,
        kind: MetricKind::Counter,
        help: "Responses discarded because a newer dispatch superseded them.",
    },
    MetricDescription {
        name: METRIC_FETCH_MS,
        kind: MetricKind::Histogram,
        help: "Fetch latency in milliseconds, per endpoint.",
    },
    MetricDescription {
        name: METRIC_MUTATION_MS,
        kind: MetricKind::Histogram,
        help: "Mutation request latency in milliseconds.",
    },
];

/// Install a global tracing subscriber using the provided logging settings.
///
/// Output goes to stderr; stdout is reserved for command results.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        for metric in &METRICS {
            match metric.kind {
                MetricKind::Counter => {
                    describe_counter!(metric.name, Unit::Count, metric.help);
                }
                MetricKind::Histogram => {
                    describe_histogram!(metric.name, Unit::Milliseconds, metric.help);
                }
            }
        }
    });
}
