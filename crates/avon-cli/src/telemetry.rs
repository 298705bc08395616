//! Tracing pipeline for the `avon` binary.
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL. When set, spans (including the dispatcher's `#[instrument]` span) are exported over HTTP. |
//! | `RUST_LOG` | Log filter.  Defaults to `debug` in verbose mode, `info` otherwise. |
//! | `AVON_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global subscriber.  Hold the returned guard until exit;
/// dropping it flushes pending spans.
pub fn init_tracing(service_name: &str, verbose: bool) -> TracerProviderGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    let use_json = std::env::var("AVON_LOG_FORMAT").as_deref() == Ok("json");

    let provider = otlp_endpoint(|key| std::env::var(key).ok())
        .and_then(|endpoint| build_provider(service_name, endpoint));
    let otel_layer = provider.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracer(service_name.to_string()))
    });

    let registry = tracing_subscriber::registry().with(env_filter).with(otel_layer);
    if use_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    }

    TracerProviderGuard(provider)
}

fn default_filter(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// Shuts down the OTel [`SdkTracerProvider`] on drop.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[avon] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

/// Collector URL from `OTEL_EXPORTER_OTLP_ENDPOINT`; blank counts as unset.
fn otlp_endpoint(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|url| !url.trim().is_empty())
}

/// `None` when the exporter cannot be built.
fn build_provider(service_name: &str, endpoint: String) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[avon] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    // Simple exporter: the HTTP transport's runtime is private, so there is
    // no ambient tokio runtime for a batch exporter to spawn on.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exporter_is_off_without_endpoint() {
        assert_eq!(otlp_endpoint(|_| None), None);
        assert_eq!(otlp_endpoint(|_| Some("  ".to_string())), None);
        assert_eq!(
            otlp_endpoint(|key| {
                (key == "OTEL_EXPORTER_OTLP_ENDPOINT").then(|| "http://collector:4318".to_string())
            }),
            Some("http://collector:4318".to_string())
        );
    }

    #[test]
    fn verbose_lowers_default_level() {
        assert_eq!(default_filter(true), "debug");
        assert_eq!(default_filter(false), "info");
    }

    #[test]
    fn tracer_provider_guard_drop_with_none_is_safe() {
        drop(TracerProviderGuard(None));
    }
}
