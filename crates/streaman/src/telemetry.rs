//! Logging and OpenTelemetry initialization.
//!
//! Logs always go to stderr through `tracing-subscriber`. When an OTLP
//! endpoint is configured, spans and log records are exported over gRPC as
//! well.

use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use streamconf::TelemetryConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Timeout for OTLP exports - prevents blocking on unavailable endpoints
const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Providers that need flushing before exit. Empty when export is off.
pub struct Telemetry {
    providers: Option<(SdkTracerProvider, SdkLoggerProvider)>,
}

impl Telemetry {
    /// Flush and stop exporters.
    pub fn shutdown(self) {
        let Some((tracer_provider, logger_provider)) = self.providers else {
            return;
        };
        tracing::info!("Flushing OpenTelemetry exporters");
        if let Err(e) = tracer_provider.shutdown() {
            eprintln!("tracer provider shutdown failed: {:?}", e);
        }
        if let Err(e) = logger_provider.shutdown() {
            eprintln!("logger provider shutdown failed: {:?}", e);
        }
    }
}

/// Install the global subscriber.
pub fn init(settings: &TelemetryConfig) -> Result<Telemetry> {
    let env_filter = EnvFilter::try_new(&settings.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer());

    let Some(otlp_endpoint) = settings.otlp_endpoint.as_deref() else {
        registry
            .try_init()
            .context("Failed to install tracing subscriber")?;
        return Ok(Telemetry { providers: None });
    };

    let resource = Resource::builder_empty()
        .with_service_name("streaman")
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let endpoint = otlp_url(otlp_endpoint);

    let trace_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP span exporter")?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_span_processor(
            opentelemetry_sdk::trace::BatchSpanProcessor::builder(trace_exporter).build(),
        )
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource.clone())
        .build();

    let tracer = tracer_provider.tracer("streaman");
    global::set_tracer_provider(tracer_provider.clone());

    let log_exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP log exporter")?;

    let logger_provider = SdkLoggerProvider::builder()
        .with_log_processor(
            opentelemetry_sdk::logs::BatchLogProcessor::builder(log_exporter).build(),
        )
        .with_resource(resource)
        .build();

    let log_bridge =
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&logger_provider);

    registry
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(log_bridge)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(otlp.endpoint = %otlp_endpoint, "OpenTelemetry export enabled");

    Ok(Telemetry {
        providers: Some((tracer_provider, logger_provider)),
    })
}

/// Accept both `host:port` and full URLs.
fn otlp_url(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}
