use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

const SERVICE_NAME: &str = "maintdesk";

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `debug` picks the default level.
/// `LOG_FORMAT=json` switches to JSON lines. Spans are exported over OTLP
/// when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
pub fn init(debug: bool) -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", SERVICE_NAME),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter(debug).into()),
        ))
        .with(telemetry_layer)
        .try_init()?;

    Ok(())
}

fn default_filter(debug: bool) -> &'static str {
    if debug {
        "maintdesk=debug,tower_http=debug"
    } else {
        "maintdesk=info,tower_http=info"
    }
}
