//! Tracing and metrics bootstrap.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};
use serde::Deserialize;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::error::CacheError;
use crate::metrics::{
    METRIC_ENTRIES, METRIC_EVICT_CAPACITY_TOTAL, METRIC_EVICT_EXPLICIT_TOTAL, METRIC_HIT_TOTAL,
    METRIC_MISS_TOTAL, METRIC_SIZE_BYTES, METRIC_SKIP_OVERSIZE_TOTAL,
};

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Default env-filter directive, overridable via `RUST_LOG`.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Install a global tracing subscriber and register metric descriptions.
pub fn init(settings: &TelemetrySettings) -> Result<(), CacheError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(
            settings
                .filter
                .parse()
                .map_err(|err| CacheError::telemetry(format!("invalid filter directive: {err}")))?,
        )
        .from_env_lossy();

    let fmt_layer = match settings.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| CacheError::telemetry(format!("failed to install tracing subscriber: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_HIT_TOTAL,
            Unit::Count,
            "Total number of response-cache hits."
        );
        describe_counter!(
            METRIC_MISS_TOTAL,
            Unit::Count,
            "Total number of response-cache misses."
        );
        describe_counter!(
            METRIC_EVICT_CAPACITY_TOTAL,
            Unit::Count,
            "Total entries evicted to stay within the byte budget."
        );
        describe_counter!(
            METRIC_EVICT_EXPLICIT_TOTAL,
            Unit::Count,
            "Total entries removed by explicit key or tag eviction."
        );
        describe_counter!(
            METRIC_SKIP_OVERSIZE_TOTAL,
            Unit::Count,
            "Responses skipped because they exceed the cache budget."
        );
        describe_gauge!(
            METRIC_SIZE_BYTES,
            Unit::Bytes,
            "Current total size of stored payloads."
        );
        describe_gauge!(
            METRIC_ENTRIES,
            Unit::Count,
            "Current number of stored entries."
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let settings = TelemetrySettings::default();
        assert_eq!(settings.filter, "info");
        assert_eq!(settings.format, LogFormat::Compact);
    }

    #[test]
    fn invalid_filter_is_reported() {
        let settings = TelemetrySettings {
            filter: "not a directive!!".to_string(),
            ..Default::default()
        };
        assert!(init(&settings).is_err());
    }
}
