//! Tracing setup for both binaries.
//!
//! Logging always goes to stdout through `tracing-subscriber`. If
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set, an OTLP span pipeline is layered
//! into the same subscriber so the gateway and the worker show up in one
//! trace view. A failed exporter setup degrades to stdout-only logging
//! rather than refusing to start.

use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Keep this alive for the whole process: dropping it flushes and shuts
/// down the span pipeline. Holds nothing when span export is disabled.
pub struct TracingGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Span pipeline shutdown incomplete, traces may be lost: {e:?}");
            }
        }
    }
}

/// Initialize the tracing subscriber, with span export when configured.
pub fn init_tracing(service_name: &str) -> TracingGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "printbay_backend=debug,tower_http=debug,sqlx::query=info".into());

    let provider = match std::env::var(OTLP_ENDPOINT_VAR) {
        Ok(endpoint) => match span_provider(&endpoint, service_name) {
            Ok(provider) => Some(provider),
            Err(e) => {
                eprintln!("Span export disabled, OTLP setup failed: {e}");
                None
            }
        },
        Err(_) => None,
    };

    let otel_layer = provider.as_ref().map(|provider| {
        let tracer = provider.tracer(service_name.to_owned());
        tracing_opentelemetry::layer().with_tracer(tracer)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .init();

    if provider.is_some() {
        tracing::info!(service_name, "Span export enabled");
    }

    TracingGuard { provider }
}

/// Build the OTLP span provider for this service.
fn span_provider(endpoint: &str, service_name: &str) -> Result<SdkTracerProvider, String> {
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| e.to_string())?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_owned())
        .with_attributes([KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION").to_owned(),
        )])
        .build();

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter)
        .build())
}
