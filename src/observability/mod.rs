use anyhow::Result;
use opentelemetry::global;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use tracing::info;

/// Installs the process-wide meter provider. Only the binary does this; library
/// code records through [`metrics::metrics`], which falls back to the no-op
/// global meter when nothing is installed.
#[derive(Clone)]
pub struct AppObservability {
    provider: SdkMeterProvider,
}

impl AppObservability {
    pub fn new(service_name: &'static str) -> Result<Self> {
        let provider = SdkMeterProvider::builder().build();
        global::set_meter_provider(provider.clone());

        // No exporter is installed; instruments are readable in-process only
        info!("OpenTelemetry configured for {}: local metrics only", service_name);

        Ok(Self { provider })
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.provider.shutdown() {
            tracing::warn!("Meter provider shutdown failed: {}", e);
        }
    }
}

pub mod metrics {
    use opentelemetry::global;
    use opentelemetry::metrics::{Counter, Histogram, Meter};
    use std::sync::OnceLock;

    /// Instruments for the rewrite engine, prober and token cache
    pub struct EngineMetrics {
        pub manifests_rewritten: Counter<u64>,
        pub segments_removed: Counter<u64>,
        pub rewrite_duration: Histogram<f64>,
        pub unterminated_ad_blocks: Counter<u64>,
        pub probe_attempts: Counter<u64>,
        pub probe_clean_sources: Counter<u64>,
        pub token_cache_lookups: Counter<u64>,
        pub passthrough_fallbacks: Counter<u64>,
    }

    impl EngineMetrics {
        fn new() -> Self {
            let meter: Meter = global::meter("stream-cleaner");
            Self {
                manifests_rewritten: meter
                    .u64_counter("manifests_rewritten_total")
                    .with_description("Manifests passed through the rewriter")
                    .build(),
                segments_removed: meter
                    .u64_counter("segments_removed_total")
                    .with_description("Segments removed as advertising")
                    .build(),
                rewrite_duration: meter
                    .f64_histogram("rewrite_duration_seconds")
                    .with_description("Time spent rewriting one manifest")
                    .build(),
                unterminated_ad_blocks: meter
                    .u64_counter("unterminated_ad_blocks_total")
                    .with_description("Manifests that ended inside an ad block")
                    .build(),
                probe_attempts: meter
                    .u64_counter("probe_attempts_total")
                    .with_description("Alternate-source candidates tried")
                    .build(),
                probe_clean_sources: meter
                    .u64_counter("probe_clean_sources_total")
                    .with_description("Alternate-source probes that found a clean manifest")
                    .build(),
                token_cache_lookups: meter
                    .u64_counter("token_cache_lookups_total")
                    .with_description("Token cache lookups by outcome")
                    .build(),
                passthrough_fallbacks: meter
                    .u64_counter("passthrough_fallbacks_total")
                    .with_description("Intercepted bodies forwarded unmodified after a failure")
                    .build(),
            }
        }
    }

    static METRICS: OnceLock<EngineMetrics> = OnceLock::new();

    pub fn metrics() -> &'static EngineMetrics {
        METRICS.get_or_init(EngineMetrics::new)
    }

    pub use opentelemetry::KeyValue as MetricsKeyValue;
}
