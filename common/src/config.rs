use serde::{Deserialize, Serialize};

pub const MAX_STATUS_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub vref_volts: f32,
    pub resolution_bits: u8,
    pub offset_volts: f32,
    pub slope_volts_per_c: f32,
    pub reference_temp_c: f32,
}

/// Defaults describe the RP2040 on-die sensor: 0.706 V at 27 °C, falling
/// 1.721 mV per °C.
impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            vref_volts: 3.3,
            resolution_bits: 12,
            offset_volts: 0.706,
            slope_volts_per_c: 0.001_721,
            reference_temp_c: 27.0,
        }
    }
}

impl CalibrationConfig {
    /// TMP36 on an ESP32 ADC1 pin at 11 dB attenuation: 0.5 V at 0 °C,
    /// rising 10 mV per °C.
    pub fn tmp36() -> Self {
        Self {
            vref_volts: 3.1,
            resolution_bits: 12,
            offset_volts: 0.5,
            slope_volts_per_c: -0.010,
            reference_temp_c: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub http_port: u16,
    pub debounce_ms: u64,
    pub status_refresh_ms: u64,
    pub tick_ms: u64,
    pub event_log_capacity: usize,
    pub response_headroom: usize,
    pub page_refresh_secs: u32,
    pub button_active_low: bool,
    pub send_buffer_size: usize,
    pub calibration: CalibrationConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            http_port: 80,
            debounce_ms: 25,
            status_refresh_ms: 1_000,
            tick_ms: 10,
            event_log_capacity: 2_048,
            response_headroom: 1_024,
            page_refresh_secs: 2,
            button_active_low: true,
            send_buffer_size: 2_920,
            calibration: CalibrationConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn response_capacity(&self) -> usize {
        self.event_log_capacity + self.response_headroom
    }

    pub fn sanitize(&mut self) {
        self.debounce_ms = self.debounce_ms.clamp(1, 1_000);
        self.status_refresh_ms = self.status_refresh_ms.clamp(100, 60_000);
        self.tick_ms = self.tick_ms.clamp(1, 100);
        self.event_log_capacity = self.event_log_capacity.clamp(128, 16_384);
        self.response_headroom = self.response_headroom.max(1_024);
        self.page_refresh_secs = self.page_refresh_secs.clamp(1, 3_600);
        self.send_buffer_size = self.send_buffer_size.clamp(64, 65_535);

        let calibration = &mut self.calibration;
        if !(1..=16).contains(&calibration.resolution_bits) {
            calibration.resolution_bits = CalibrationConfig::default().resolution_bits;
        }
        if !calibration.slope_volts_per_c.is_normal() {
            calibration.slope_volts_per_c = CalibrationConfig::default().slope_volts_per_c;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
}

impl NetworkConfig {
    pub fn has_station_credentials(&self) -> bool {
        let ssid = self.wifi_ssid.trim();
        !ssid.is_empty() && ssid != "CHANGE_ME"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl RuntimeConfig {
    pub fn from_json_slice(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let mut runtime = serde_json::from_slice::<RuntimeConfig>(raw)?;
        runtime.monitor.sanitize();
        Ok(runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let runtime = RuntimeConfig::from_json_slice(b"{}").unwrap();

        assert_eq!(runtime.monitor.http_port, 80);
        assert_eq!(runtime.monitor.event_log_capacity, 2_048);
        assert_eq!(runtime.monitor.response_capacity(), 3_072);
        assert!(!runtime.network.has_station_credentials());
    }

    #[test]
    fn partial_document_keeps_remaining_defaults() {
        let runtime =
            RuntimeConfig::from_json_slice(br#"{"monitor":{"http_port":8080,"debounce_ms":50}}"#)
                .unwrap();

        assert_eq!(runtime.monitor.http_port, 8080);
        assert_eq!(runtime.monitor.debounce_ms, 50);
        assert_eq!(runtime.monitor.status_refresh_ms, 1_000);
        assert!(runtime.monitor.button_active_low);
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut config = MonitorConfig {
            debounce_ms: 0,
            tick_ms: 10_000,
            event_log_capacity: 4,
            send_buffer_size: 0,
            ..MonitorConfig::default()
        };
        config.calibration.resolution_bits = 40;
        config.calibration.slope_volts_per_c = 0.0;

        config.sanitize();

        assert_eq!(config.debounce_ms, 1);
        assert_eq!(config.tick_ms, 100);
        assert_eq!(config.event_log_capacity, 128);
        assert_eq!(config.send_buffer_size, 64);
        assert_eq!(config.calibration, CalibrationConfig::default());
    }

    #[test]
    fn placeholder_ssid_is_not_a_credential() {
        let network = NetworkConfig {
            wifi_ssid: "CHANGE_ME".to_string(),
            wifi_pass: String::new(),
        };
        assert!(!network.has_station_credentials());
    }
}
