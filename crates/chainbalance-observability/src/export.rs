//! OTLP metrics export.

use std::time::Duration;

use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::{runtime, Resource};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Instrumentation scope for every ChainBalance instrument.
pub const METER_NAME: &str = "chainbalance";

/// OpenTelemetry export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint (e.g. "http://localhost:4317"). Unset keeps
    /// metrics in-process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,
    /// `service.name` resource attribute
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_export_interval_secs")]
    pub export_interval_secs: u64,
}

fn default_service_name() -> String {
    "chainbalance".into()
}

fn default_export_interval_secs() -> u64 {
    30
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: default_service_name(),
            export_interval_secs: default_export_interval_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("OTLP metrics exporter: {0}")]
    Exporter(String),

    #[error("meter provider shutdown: {0}")]
    Shutdown(String),
}

/// Owns the meter provider for the lifetime of the process.
pub struct MetricsExport {
    provider: Option<SdkMeterProvider>,
}

impl MetricsExport {
    /// Install an OTLP meter provider when an endpoint is configured.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn init(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let Some(endpoint) = config.otlp_endpoint.as_deref() else {
            debug!("no OTLP endpoint configured, metrics stay in-process");
            return Ok(Self { provider: None });
        };

        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| TelemetryError::Exporter(e.to_string()))?;
        let reader = PeriodicReader::builder(exporter, runtime::Tokio)
            .with_interval(Duration::from_secs(config.export_interval_secs.max(1)))
            .build();
        let provider = SdkMeterProvider::builder()
            .with_reader(reader)
            .with_resource(Resource::new([KeyValue::new(
                "service.name",
                config.service_name.clone(),
            )]))
            .build();
        global::set_meter_provider(provider.clone());

        info!(endpoint, service = %config.service_name, "OTLP metrics export enabled");
        Ok(Self {
            provider: Some(provider),
        })
    }

    pub fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }

    pub fn meter(&self) -> Meter {
        match &self.provider {
            Some(provider) => provider.meter(METER_NAME),
            None => global::meter(METER_NAME),
        }
    }

    /// Flush pending data points and stop the exporter.
    pub fn shutdown(self) -> Result<(), TelemetryError> {
        if let Some(provider) = self.provider {
            provider
                .shutdown()
                .map_err(|e| TelemetryError::Shutdown(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_metrics_local() {
        let config: TelemetryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.otlp_endpoint, None);
        assert_eq!(config.service_name, "chainbalance");
        assert_eq!(config.export_interval_secs, 30);
    }

    #[tokio::test]
    async fn init_without_endpoint_is_local() {
        let export = MetricsExport::init(&TelemetryConfig::default()).unwrap();
        assert!(!export.is_exporting());
        let counter = export.meter().u64_counter("chainbalance.test").build();
        counter.add(1, &[]);
        export.shutdown().unwrap();
    }
}
