//! Gateway synchronization
//!
//! MQTT leg of the instrument: assembles the per-cycle glare report and
//! publishes it to the gateway topic. The report is the one externally
//! meaningful contract of the system; its field names are fixed.

use chrono::Utc;
use glare_eval::GlareMetrics;
use rumqttc::{AsyncClient, Event, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Gateway sync error types
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Payload schema version stamped into every report
pub const REPORT_VERSION: u32 = 1;

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// MQTT broker host
    pub broker_host: String,
    /// MQTT port
    pub broker_port: u16,
    /// Topic the gateway ingests from
    pub topic: String,
    /// Client id; generated per session when unset
    pub client_id: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            topic: "gateway-data".to_string(),
            client_id: None,
        }
    }
}

/// Timestamp block appended to each report
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub version: u32,
    /// Epoch seconds at send time
    pub timestamp: f64,
    /// ISO-8601 send time with microseconds
    pub sent_time: String,
    pub device_id: String,
}

/// Per-cycle report published to the gateway
#[derive(Debug, Clone, Serialize)]
pub struct GlareReport {
    pub device: String,
    pub light_lux: f64,
    pub dgp: f64,
    pub dgi: f64,
    pub ugr: f64,
    pub vcp: f64,
    pub cgi: f64,
    #[serde(rename = "Lveil")]
    pub lveil: f64,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<ReportMeta>,
}

impl GlareReport {
    /// A report carrying only the illuminance reading; glare metrics stay
    /// zeroed until the pipeline fills them in.
    pub fn sensor_only(device: &str, light_lux: f64) -> Self {
        Self {
            device: device.to_string(),
            light_lux,
            dgp: 0.0,
            dgi: 0.0,
            ugr: 0.0,
            vcp: 0.0,
            cgi: 0.0,
            lveil: 0.0,
            meta: None,
        }
    }

    /// Fill in the glare metrics and the averaged illuminance
    pub fn with_metrics(mut self, light_lux: f64, metrics: GlareMetrics) -> Self {
        self.light_lux = light_lux;
        self.dgp = metrics.dgp;
        self.dgi = metrics.dgi;
        self.ugr = metrics.ugr;
        self.vcp = metrics.vcp;
        self.cgi = metrics.cgi;
        self.lveil = metrics.lveil;
        self
    }

    /// Stamp the meta block at send time
    pub fn stamp(&mut self, device_id: &str) {
        let now = Utc::now();
        self.meta = Some(ReportMeta {
            version: REPORT_VERSION,
            timestamp: now.timestamp_micros() as f64 / 1e6,
            sent_time: now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            device_id: device_id.to_string(),
        });
    }
}

/// Gateway sync manager
pub struct GatewaySync {
    config: GatewayConfig,
    client: Option<AsyncClient>,
}

impl GatewaySync {
    /// Create a new gateway sync manager
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    /// Connect to the MQTT broker
    pub async fn connect(&mut self) -> Result<(), SyncError> {
        let client_id = self
            .config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("station-{}", Uuid::new_v4()));
        let mut options = MqttOptions::new(
            client_id,
            &self.config.broker_host,
            self.config.broker_port,
        );
        options.set_keep_alive(std::time::Duration::from_secs(30));

        let (client, mut eventloop) = AsyncClient::new(options, 10);

        // Spawn event loop handler
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(incoming)) => {
                        debug!("MQTT incoming: {:?}", incoming);
                    }
                    Err(e) => {
                        error!("MQTT error: {}", e);
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                    _ => {}
                }
            }
        });

        self.client = Some(client);
        info!("Connected to MQTT broker: {}", self.config.broker_host);
        Ok(())
    }

    /// Publish a stamped report to the gateway topic
    pub async fn publish(&self, report: &GlareReport) -> Result<(), SyncError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| SyncError::Connection("Not connected".to_string()))?;

        let payload =
            serde_json::to_vec(report).map_err(|e| SyncError::Serialization(e.to_string()))?;
        let payload_len = payload.len();

        client
            .publish(&self.config.topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| SyncError::Publish(e.to_string()))?;

        debug!("published {} bytes to {}", payload_len, self.config.topic);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_only_report_zeroes_metrics() {
        let report = GlareReport::sensor_only("glare-station", 32.5);
        assert_eq!(report.light_lux, 32.5);
        assert_eq!(report.dgp, 0.0);
        assert_eq!(report.lveil, 0.0);
        assert!(report.meta.is_none());
    }

    #[test]
    fn test_with_metrics_fills_all_indices() {
        let metrics = GlareMetrics {
            dgp: 0.31,
            dgi: 19.0,
            ugr: 16.2,
            vcp: 80.0,
            cgi: 18.5,
            lveil: 5.1,
        };
        let report = GlareReport::sensor_only("glare-station", 900.0).with_metrics(850.0, metrics);
        assert_eq!(report.light_lux, 850.0);
        assert_eq!(report.dgp, 0.31);
        assert_eq!(report.cgi, 18.5);
        assert_eq!(report.lveil, 5.1);
    }

    #[test]
    fn test_payload_field_names() {
        let mut report = GlareReport::sensor_only("glare-station", 120.0);
        report.stamp("c098e5600000");
        let value = serde_json::to_value(&report).unwrap();
        let object = value.as_object().unwrap();

        for key in [
            "device", "light_lux", "dgp", "dgi", "ugr", "vcp", "cgi", "Lveil", "_meta",
        ] {
            assert!(object.contains_key(key), "missing {key}");
        }

        let meta = object["_meta"].as_object().unwrap();
        assert_eq!(meta["version"], REPORT_VERSION);
        assert_eq!(meta["device_id"], "c098e5600000");
        assert!(meta["timestamp"].as_f64().unwrap() > 0.0);
        assert!(meta["sent_time"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_unstamped_report_omits_meta() {
        let report = GlareReport::sensor_only("glare-station", 10.0);
        let value = serde_json::to_value(&report).unwrap();
        assert!(value.as_object().unwrap().get("_meta").is_none());
    }

    #[test]
    fn test_default_gateway_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.broker_port, 1883);
        assert_eq!(config.topic, "gateway-data");
    }

    #[tokio::test]
    async fn test_publish_before_connect_is_error() {
        let sync = GatewaySync::new(GatewayConfig::default());
        let report = GlareReport::sensor_only("glare-station", 0.0);
        assert!(matches!(
            sync.publish(&report).await,
            Err(SyncError::Connection(_))
        ));
    }
}
