use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Configuration for the telemetry subsystem.
#[derive(Debug)]
pub struct TelemetryConfig {
    service_name: String,
    otlp_endpoint: Option<String>,
    log_level: String,
    stdout: bool,
}

impl TelemetryConfig {
    /// Creates a new configuration builder with default settings.
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn otlp_endpoint(&self) -> Option<&str> {
        self.otlp_endpoint.as_deref()
    }

    /// Installs the global subscriber.
    ///
    /// Spans are exported over OTLP/gRPC only when an endpoint is configured.
    pub fn init(self) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        let otel = match self.otlp_endpoint {
            Some(endpoint) => {
                opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

                let exporter = opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint);
                let tracer = opentelemetry_otlp::new_pipeline()
                    .tracing()
                    .with_exporter(exporter)
                    .with_trace_config(opentelemetry_sdk::trace::config().with_resource(
                        opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                            "service.name",
                            self.service_name,
                        )]),
                    ))
                    .install_batch(opentelemetry_sdk::runtime::Tokio)?;
                Some(tracing_opentelemetry::layer().with_tracer(tracer))
            }
            None => None,
        };

        let fmt = self
            .stdout
            .then(|| tracing_subscriber::fmt::layer().with_target(true));

        tracing_subscriber::registry()
            .with(otel)
            .with(tracing_subscriber::EnvFilter::new(self.log_level))
            .with(fmt)
            .try_init()?;

        Ok(())
    }
}

/// Builder for `TelemetryConfig`.
#[derive(Default)]
pub struct TelemetryConfigBuilder {
    service_name: Option<String>,
    otlp_endpoint: Option<String>,
    log_level: Option<String>,
    stdout: Option<bool>,
}

impl TelemetryConfigBuilder {
    /// Sets the service name reported with exported spans.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Sets the OTLP endpoint URL. Without one, nothing is exported.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the filter directive (default: "info").
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Toggles human-readable output on stdout (default: on).
    pub fn stdout(mut self, enabled: bool) -> Self {
        self.stdout = Some(enabled);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self
                .service_name
                .unwrap_or_else(|| "farcall-unknown".to_string()),
            otlp_endpoint: self.otlp_endpoint,
            log_level: self.log_level.unwrap_or_else(|| "info".to_string()),
            stdout: self.stdout.unwrap_or(true),
        }
    }
}

/// Shuts down the telemetry subsystem, flushing pending spans.
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}
